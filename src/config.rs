//! Engine configuration, read once at process start.
//!
//! The loaded [`EngineConfig`] is turned into concrete backends by
//! [`EngineConfig::build_service`] and [`EngineConfig::evidence_store`]; nothing
//! else in the crate reads configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::evidence::{DEFAULT_MAX_UPLOAD_BYTES, FsEvidenceStore};
use crate::locks::Deadline;
use crate::notify::{LogNotifier, Notifier, OutboxNotifier};
use crate::service::{DEFAULT_MAX_CONFLICT_RETRIES, LoanService, ServiceOptions};
use crate::store::{LoanStore, SledStore};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Log the notice through tracing.
    Log,
    /// Spool one JSON line per recipient to `outbox_path`.
    Outbox,
}

/// Engine configuration (TOML). Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory of the sled database.
    pub db_path: PathBuf,

    /// Root directory for stored evidence files.
    pub evidence_dir: PathBuf,

    pub max_upload_bytes: u64,

    pub notifier: NotifierKind,

    pub outbox_path: PathBuf,

    /// Replays of a mutation after a revision conflict before giving up.
    pub max_conflict_retries: usize,

    /// Per-request deadline in milliseconds, 0 disables it.
    pub request_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("loan_engine.db"),
            evidence_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            notifier: NotifierKind::Log,
            outbox_path: PathBuf::from("outbox/notifications.jsonl"),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            request_timeout_ms: 5_000,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(anyhow!("db_path must not be empty"));
        }
        if self.evidence_dir.as_os_str().is_empty() {
            return Err(anyhow!("evidence_dir must not be empty"));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be > 0"));
        }
        if self.notifier == NotifierKind::Outbox && self.outbox_path.as_os_str().is_empty() {
            return Err(anyhow!("outbox_path is required when notifier = \"outbox\""));
        }
        Ok(())
    }

    pub fn deadline(&self) -> Deadline {
        match self.request_timeout_ms {
            0 => Deadline::none(),
            ms => Deadline::after(Duration::from_millis(ms)),
        }
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        match self.notifier {
            NotifierKind::Log => Arc::new(LogNotifier),
            NotifierKind::Outbox => Arc::new(OutboxNotifier::new(&self.outbox_path)),
        }
    }

    pub fn evidence_store(&self) -> FsEvidenceStore {
        FsEvidenceStore::new(&self.evidence_dir, self.max_upload_bytes)
    }

    pub fn open_store(&self) -> Result<Arc<SledStore>> {
        let store = SledStore::open(&self.db_path)
            .with_context(|| format!("open database {}", self.db_path.display()))?;
        Ok(Arc::new(store))
    }

    /// Wires the service from this configuration over an already opened store.
    pub fn build_service(&self, store: Arc<dyn LoanStore>) -> LoanService {
        let options = ServiceOptions {
            max_conflict_retries: self.max_conflict_retries,
        };
        LoanService::with_options(store, self.notifier(), options)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("engine.toml");
        fs::write(
            &path,
            "notifier = \"outbox\"\noutbox_path = \"spool/mail.jsonl\"\nmax_conflict_retries = 5\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.notifier, NotifierKind::Outbox);
        assert_eq!(cfg.outbox_path, PathBuf::from("spool/mail.jsonl"));
        assert_eq!(cfg.max_conflict_retries, 5);
        assert_eq!(cfg.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn rejects_invalid_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("engine.toml");
        fs::write(&path, "max_upload_bytes = 0\n").expect("write");
        assert!(load_config(&path).is_err());

        fs::write(&path, "notifier = \"carrier-pigeon\"\n").expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn zero_timeout_means_no_deadline() {
        let cfg = EngineConfig {
            request_timeout_ms: 0,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.deadline(), Deadline::none());
        assert!(EngineConfig::default().deadline().remaining().is_some());
    }
}
