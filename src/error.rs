use rust_decimal::Decimal;

use crate::loan::LoanState;

#[derive(thiserror::Error, Debug)]
pub enum LoanError {
    #[error("Loan {0} not found")]
    NotFound(String),
    #[error("Cannot {action} a loan in {from} state")]
    InvalidTransition { from: LoanState, action: &'static str },
    #[error("Invalid evidence: {0}")]
    InvalidEvidence(String),
    #[error("Loan in {0} state cannot receive investments")]
    InvalidState(LoanState),
    #[error("Investment amount must be greater than zero")]
    NonPositiveAmount,
    #[error("Investment exceeds remaining loan amount: remaining {remaining}")]
    OverfundingRejected { remaining: Decimal },
    #[error("Loan {0} was modified concurrently, retries exhausted")]
    ConcurrencyConflict(String),
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Request deadline exceeded before commit")]
    DeadlineExceeded,
    #[error("Failed to generate identifier: {0}")]
    Identifier(String),
    #[error("Notification failed: {0}")]
    NotificationFailure(#[from] NotifyError),
    #[error(transparent)]
    Persistence(#[from] StoreError),
    #[error(transparent)]
    Evidence(#[from] EvidenceError),
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Record {0} not found")]
    NotFound(String),
    #[error("Record {0} already exists")]
    Duplicate(String),
    #[error("Loan {id} revision changed: expected {expected}, found {found}")]
    Conflict { id: String, expected: u64, found: u64 },
    #[error("Storage error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Failed to encode record: {0}")]
    Encode(String),
    #[error("Failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("Failed to deliver notice to {recipient}: {reason}")]
    Delivery { recipient: String, reason: String },
    #[error("Notification outbox error: {0}")]
    Outbox(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum EvidenceError {
    #[error("{kind} file size must not exceed {max_bytes} bytes")]
    TooLarge { kind: &'static str, max_bytes: u64 },
    #[error("{kind} must be one of the following file types: {allowed}")]
    Extension { kind: &'static str, allowed: String },
    #[error("Evidence file error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoanError {
    /// Maps a store-level conflict or missing record onto the domain taxonomy.
    pub fn from_store(id: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => LoanError::NotFound(id.to_string()),
            StoreError::Conflict { .. } => LoanError::ConcurrencyConflict(id.to_string()),
            other => LoanError::Persistence(other),
        }
    }

    /// Business-rule and input errors are the caller's fault and never retried.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            LoanError::InvalidTransition { .. }
                | LoanError::InvalidEvidence(_)
                | LoanError::InvalidState(_)
                | LoanError::NonPositiveAmount
                | LoanError::OverfundingRejected { .. }
                | LoanError::InvalidParams(_)
                | LoanError::Evidence(_)
        )
    }
}
