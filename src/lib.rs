pub mod config;
pub mod error;
pub mod evidence;
pub mod exit_codes;
pub mod investment;
pub mod ledger;
pub mod lifecycle;
pub mod loan;
pub mod locks;
pub mod logging;
pub mod notify;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

pub use error::{EvidenceError, LoanError, NotifyError, StoreError};
pub use investment::{InvestParams, Investment};
pub use ledger::LoanSummary;
pub use loan::{ApprovalEvidence, CreateLoanParams, DisbursementEvidence, Loan, LoanState};
pub use locks::Deadline;
pub use service::{InvestOutcome, LoanService, ServiceOptions};
pub use store::{LoanFilter, LoanStore, MemoryStore, SledStore};
