//! Storage for staff-uploaded evidence files
//!
//! The lifecycle only ever sees the reference string returned from
//! [`EvidenceStore::store`]; file bytes stay behind this boundary.
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::EvidenceError;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceKind {
    ApprovalProof,
    SignedAgreement,
}

impl EvidenceKind {
    pub fn label(&self) -> &'static str {
        match self {
            EvidenceKind::ApprovalProof => "proof picture",
            EvidenceKind::SignedAgreement => "signed agreement",
        }
    }

    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            EvidenceKind::ApprovalProof => &[".jpg", ".jpeg", ".png"],
            EvidenceKind::SignedAgreement => &[".pdf", ".jpg", ".jpeg", ".png"],
        }
    }

    fn subdirectory(&self) -> &'static str {
        match self {
            EvidenceKind::ApprovalProof => "proof_pictures",
            EvidenceKind::SignedAgreement => "signed_agreements",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            EvidenceKind::ApprovalProof => "proof",
            EvidenceKind::SignedAgreement => "agreement",
        }
    }
}

pub trait EvidenceStore: Send + Sync {
    /// Validates and stores `source`, returning an opaque reference to it.
    fn store(&self, loan_id: &str, kind: EvidenceKind, source: &Path) -> Result<String, EvidenceError>;
}

/// Lower-cased extension including the dot, empty when there is none.
fn extension_of(name: &Path) -> String {
    name.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Checks size and extension against the limits for `kind`.
pub fn validate_upload(
    kind: EvidenceKind,
    file_name: &Path,
    size: u64,
    max_bytes: u64,
) -> Result<(), EvidenceError> {
    if size > max_bytes {
        return Err(EvidenceError::TooLarge {
            kind: kind.label(),
            max_bytes,
        });
    }

    let ext = extension_of(file_name);
    if !kind.allowed_extensions().iter().any(|allowed| *allowed == ext) {
        return Err(EvidenceError::Extension {
            kind: kind.label(),
            allowed: kind.allowed_extensions().join(", "),
        });
    }
    Ok(())
}

/// Copies evidence under `root/<kind dir>/`, named by loan and content hash.
#[derive(Debug, Clone)]
pub struct FsEvidenceStore {
    root: PathBuf,
    max_bytes: u64,
}

impl FsEvidenceStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl EvidenceStore for FsEvidenceStore {
    fn store(&self, loan_id: &str, kind: EvidenceKind, source: &Path) -> Result<String, EvidenceError> {
        let size = fs::metadata(source)?.len();
        validate_upload(kind, source, size, self.max_bytes)?;

        let contents = fs::read(source)?;
        let digest = sha256::digest(&contents);
        let file_name = format!(
            "{loan_id}_{}_{}{}",
            kind.prefix(),
            &digest[..16],
            extension_of(source)
        );

        let dir = self.root.join(kind.subdirectory());
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(&file_name), &contents)?;

        let reference = format!("{}/{}", kind.subdirectory(), file_name);
        debug!(loan_id, reference = %reference, bytes = size, "evidence stored");
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_extension_and_oversize() {
        let err = validate_upload(EvidenceKind::ApprovalProof, Path::new("proof.pdf"), 10, 100)
            .unwrap_err();
        assert!(err.to_string().contains(".jpg, .jpeg, .png"));

        assert!(validate_upload(EvidenceKind::SignedAgreement, Path::new("a.PDF"), 10, 100).is_ok());
        assert!(validate_upload(EvidenceKind::SignedAgreement, Path::new("noext"), 10, 100).is_err());
        assert!(matches!(
            validate_upload(EvidenceKind::ApprovalProof, Path::new("p.png"), 101, 100),
            Err(EvidenceError::TooLarge { max_bytes: 100, .. })
        ));
    }

    #[test]
    fn stores_content_addressed_copy() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Proof.PNG");
        fs::write(&source, b"not really a png").unwrap();
        let store = FsEvidenceStore::new(dir.path().join("uploads"), DEFAULT_MAX_UPLOAD_BYTES);

        let reference = store
            .store("loan_1abc", EvidenceKind::ApprovalProof, &source)
            .unwrap();

        assert!(reference.starts_with("proof_pictures/loan_1abc_proof_"));
        assert!(reference.ends_with(".png"));
        let stored = fs::read(store.root().join(&reference)).unwrap();
        assert_eq!(stored, b"not really a png");

        // same bytes, same reference
        let again = store
            .store("loan_1abc", EvidenceKind::ApprovalProof, &source)
            .unwrap();
        assert_eq!(reference, again);
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsEvidenceStore::new(dir.path(), DEFAULT_MAX_UPLOAD_BYTES);

        let err = store
            .store("loan_1abc", EvidenceKind::SignedAgreement, &dir.path().join("gone.pdf"))
            .unwrap_err();
        assert!(matches!(err, EvidenceError::Io(_)));
    }
}
