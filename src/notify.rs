//! Delivery of the "fully funded" notice to a loan's investors
//!
//! Notification is best effort. The service calls it after the funding
//! transaction has committed and only reports failures back to the caller.
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::error::NotifyError;
use crate::loan::Loan;
use crate::types::TimeStamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundedNotice {
    pub loan_id: String,
    pub borrower_id: String,
    pub principal: Decimal,
    pub agreement_link: String,
    pub investor_emails: Vec<String>,
}

impl FundedNotice {
    pub fn new(loan: &Loan, investor_emails: Vec<String>) -> Self {
        Self {
            loan_id: loan.id().to_string(),
            borrower_id: loan.borrower_id().to_string(),
            principal: loan.principal(),
            agreement_link: loan.agreement_link().to_string(),
            investor_emails,
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "Loan {} is Fully Invested - Agreement Letter Available",
            self.loan_id
        )
    }

    pub fn body(&self) -> String {
        format!(
            "The loan you invested in has been fully funded and is ready for disbursement.\n\
             \n\
             Loan ID: {}\n\
             Borrower ID: {}\n\
             Principal Amount: {}\n\
             \n\
             Agreement Letter: {}\n",
            self.loan_id,
            self.borrower_id,
            self.principal.normalize(),
            self.agreement_link
        )
    }
}

pub trait Notifier: Send + Sync {
    fn notify_fully_funded(&self, notice: &FundedNotice) -> Result<(), NotifyError>;
}

/// Writes the notice to the log instead of delivering it.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_fully_funded(&self, notice: &FundedNotice) -> Result<(), NotifyError> {
        info!(
            loan_id = %notice.loan_id,
            borrower_id = %notice.borrower_id,
            principal = %notice.principal,
            agreement_link = %notice.agreement_link,
            recipients = ?notice.investor_emails,
            "loan fully invested notice"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct OutboxMessage<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
    loan_id: &'a str,
    queued_at: TimeStamp,
}

/// Spools one JSON line per recipient for a mail relay to pick up.
#[derive(Debug)]
pub struct OutboxNotifier {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

impl Notifier for OutboxNotifier {
    fn notify_fully_funded(&self, notice: &FundedNotice) -> Result<(), NotifyError> {
        let subject = notice.subject();
        let body = notice.body();
        let queued_at = TimeStamp::new();

        let mut lines = String::new();
        for recipient in &notice.investor_emails {
            let message = OutboxMessage {
                to: recipient,
                subject: &subject,
                body: &body,
                loan_id: &notice.loan_id,
                queued_at,
            };
            let line = serde_json::to_string(&message).map_err(|err| NotifyError::Delivery {
                recipient: recipient.clone(),
                reason: err.to_string(),
            })?;
            lines.push_str(&line);
            lines.push('\n');
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(lines.as_bytes())?;

        info!(
            loan_id = %notice.loan_id,
            recipients = notice.investor_emails.len(),
            outbox = %self.path.display(),
            "queued fully funded notice"
        );
        Ok(())
    }
}

/// Keeps every notice in memory. `failing()` builds one that rejects every notice.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<FundedNotice>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            failing: true,
        }
    }

    pub fn sent(&self) -> Vec<FundedNotice> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_fully_funded(&self, notice: &FundedNotice) -> Result<(), NotifyError> {
        if self.failing {
            return Err(NotifyError::Delivery {
                recipient: notice.investor_emails.join(", "),
                reason: "delivery disabled".into(),
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notice.clone());
        Ok(())
    }
}
