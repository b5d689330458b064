//! The loan aggregate and its creation parameters
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::LoanError;
use crate::types::{Amount, MAX_AMOUNT_SCALE, Percent, TimeStamp, max_principal, within_amount_scale};

/// Lifecycle stages, ordered so that `a < b` means `a` comes first.
#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LoanState {
    #[n(0)]
    Proposed,
    #[n(1)]
    Approved,
    #[n(2)]
    Invested,
    #[n(3)]
    Disbursed,
}

impl LoanState {
    pub const ALL: [LoanState; 4] = [
        LoanState::Proposed,
        LoanState::Approved,
        LoanState::Invested,
        LoanState::Disbursed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanState::Proposed => "proposed",
            LoanState::Approved => "approved",
            LoanState::Invested => "invested",
            LoanState::Disbursed => "disbursed",
        }
    }
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        LoanState::ALL
            .into_iter()
            .find(|state| state.as_str() == name)
            .ok_or_else(|| format!("unknown loan state '{s}'"))
    }
}

/// Staff evidence recorded when a loan is approved.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalEvidence {
    #[n(0)]
    pub proof_ref: String, // reference returned by the evidence store
    #[n(1)]
    pub staff_id: String,
    #[n(2)]
    pub approved_at: TimeStamp,
}

/// Staff evidence recorded when a loan is disbursed.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisbursementEvidence {
    #[n(0)]
    pub agreement_ref: String, // signed agreement, as stored
    #[n(1)]
    pub staff_id: String,
    #[n(2)]
    pub disbursed_at: TimeStamp,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Loan {
    #[n(0)]
    pub(crate) id: String, // bech32 encoded uuid7, `loan_` prefix
    #[n(1)]
    pub(crate) borrower_id: String,
    #[n(2)]
    pub(crate) principal: Amount,
    #[n(3)]
    pub(crate) rate: Percent,
    #[n(4)]
    pub(crate) roi: Percent,
    #[n(5)]
    pub(crate) agreement_link: String,
    #[n(6)]
    pub(crate) state: LoanState,
    #[n(7)]
    pub(crate) approval: Option<ApprovalEvidence>,
    #[n(8)]
    pub(crate) disbursement: Option<DisbursementEvidence>,
    #[n(9)]
    pub(crate) created_at: TimeStamp,
    #[n(10)]
    pub(crate) updated_at: TimeStamp,
    #[n(11)]
    pub(crate) revision: u64,
}

/// Validated input for a new loan.
#[derive(Debug, Clone)]
pub struct CreateLoanParams {
    pub borrower_id: String,
    pub principal: Decimal,
    pub rate: Decimal,
    pub roi: Decimal,
    pub agreement_link: String,
}

impl CreateLoanParams {
    pub fn validate(&self) -> Result<(), LoanError> {
        let hundred = Decimal::ONE_HUNDRED;

        if self.borrower_id.trim().is_empty() {
            return Err(LoanError::InvalidParams("borrower id is required".into()));
        }
        if self.principal <= Decimal::ZERO {
            return Err(LoanError::InvalidParams(
                "principal amount must be greater than zero".into(),
            ));
        }
        if self.principal > max_principal() {
            return Err(LoanError::InvalidParams(format!(
                "principal amount must not exceed {}",
                max_principal()
            )));
        }
        if !within_amount_scale(self.principal) {
            return Err(LoanError::InvalidParams(format!(
                "principal amount may have at most {MAX_AMOUNT_SCALE} decimal places"
            )));
        }
        if self.rate <= Decimal::ZERO || self.rate > hundred {
            return Err(LoanError::InvalidParams(
                "rate must be greater than zero and at most 100".into(),
            ));
        }
        if self.roi <= Decimal::ZERO || self.roi > hundred {
            return Err(LoanError::InvalidParams(
                "roi must be greater than zero and at most 100".into(),
            ));
        }
        if !self.agreement_link.starts_with("http") {
            return Err(LoanError::InvalidParams(
                "agreement letter link must be a valid URL".into(),
            ));
        }
        Ok(())
    }
}

impl Loan {
    /// A fresh loan in `proposed` with no evidence. Callers validate `params` first.
    pub fn new(id: String, params: CreateLoanParams, now: TimeStamp) -> Self {
        Self {
            id,
            borrower_id: params.borrower_id.trim().to_string(),
            principal: params.principal.into(),
            rate: params.rate.into(),
            roi: params.roi.into(),
            agreement_link: params.agreement_link,
            state: LoanState::Proposed,
            approval: None,
            disbursement: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn borrower_id(&self) -> &str {
        &self.borrower_id
    }
    pub fn principal(&self) -> Decimal {
        self.principal.value()
    }
    pub fn rate(&self) -> Decimal {
        self.rate.value()
    }
    pub fn roi(&self) -> Decimal {
        self.roi.value()
    }
    pub fn agreement_link(&self) -> &str {
        &self.agreement_link
    }
    pub fn state(&self) -> LoanState {
        self.state
    }
    pub fn approval(&self) -> Option<&ApprovalEvidence> {
        self.approval.as_ref()
    }
    pub fn disbursement(&self) -> Option<&DisbursementEvidence> {
        self.disbursement.as_ref()
    }
    pub fn created_at(&self) -> TimeStamp {
        self.created_at
    }
    pub fn updated_at(&self) -> TimeStamp {
        self.updated_at
    }
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Marks a committed mutation: new revision, refreshed update time.
    pub(crate) fn touch(&mut self, now: TimeStamp) {
        self.revision += 1;
        self.updated_at = now;
    }

    /// Checks that evidence is present exactly for the stages already reached.
    pub fn check_invariants(&self) -> Result<(), &'static str> {
        if self.principal.value() <= Decimal::ZERO {
            return Err("principal must be positive");
        }
        let approved = self.state >= LoanState::Approved;
        if approved != self.approval.is_some() {
            return Err("approval evidence must be present iff approved or later");
        }
        let disbursed = self.state == LoanState::Disbursed;
        if disbursed != self.disbursement.is_some() {
            return Err("disbursement evidence must be present iff disbursed");
        }
        if self.updated_at < self.created_at {
            return Err("update time precedes creation time");
        }
        Ok(())
    }
}
