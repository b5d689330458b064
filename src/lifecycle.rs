//! Lifecycle transitions for a loan
//!
//! The only legal walk is `proposed -> approved -> invested -> disbursed`.
//! Staff drive `approve` and `disburse`; `invested` is reached only through
//! [`promote_if_fully_funded`] after an investment is admitted. Every check
//! here is pure over its inputs, the caller decides when to persist.
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::LoanError;
use crate::loan::{ApprovalEvidence, DisbursementEvidence, Loan, LoanState};
use crate::types::TimeStamp;

pub const MIN_STAFF_ID_LEN: usize = 3;

pub fn validate_staff_id(staff_id: &str) -> Result<(), LoanError> {
    if staff_id.trim().chars().count() < MIN_STAFF_ID_LEN {
        return Err(LoanError::InvalidEvidence(format!(
            "employee ID must be at least {MIN_STAFF_ID_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_reference(reference: &str, what: &str) -> Result<(), LoanError> {
    if reference.trim().is_empty() {
        return Err(LoanError::InvalidEvidence(format!("{what} is required")));
    }
    Ok(())
}

/// Fails with `InvalidTransition` unless the loan is `proposed`.
pub fn ensure_can_approve(loan: &Loan) -> Result<(), LoanError> {
    if loan.state != LoanState::Proposed {
        return Err(LoanError::InvalidTransition {
            from: loan.state,
            action: "approve",
        });
    }
    Ok(())
}

/// Fails with `InvalidTransition` unless the loan is `invested`.
pub fn ensure_can_disburse(loan: &Loan) -> Result<(), LoanError> {
    if loan.state != LoanState::Invested {
        return Err(LoanError::InvalidTransition {
            from: loan.state,
            action: "disburse",
        });
    }
    Ok(())
}

/// Moves a `proposed` loan to `approved`, recording the staff evidence.
pub fn approve(loan: &mut Loan, evidence: ApprovalEvidence, now: TimeStamp) -> Result<(), LoanError> {
    ensure_can_approve(loan)?;
    validate_reference(&evidence.proof_ref, "proof of approval")?;
    validate_staff_id(&evidence.staff_id)?;

    debug!(loan_id = %loan.id, staff_id = %evidence.staff_id, "loan approved");
    loan.state = LoanState::Approved;
    loan.approval = Some(evidence);
    loan.updated_at = now;
    Ok(())
}

/// Moves an `invested` loan to `disbursed`, recording the signed agreement.
pub fn disburse(
    loan: &mut Loan,
    evidence: DisbursementEvidence,
    now: TimeStamp,
) -> Result<(), LoanError> {
    ensure_can_disburse(loan)?;
    validate_reference(&evidence.agreement_ref, "signed agreement")?;
    validate_staff_id(&evidence.staff_id)?;

    debug!(loan_id = %loan.id, staff_id = %evidence.staff_id, "loan disbursed");
    loan.state = LoanState::Disbursed;
    loan.disbursement = Some(evidence);
    loan.updated_at = now;
    Ok(())
}

/// Promotes `approved` to `invested` when the total matches principal exactly.
///
/// Returns whether the promotion happened. Anything else is a no-op.
pub fn promote_if_fully_funded(loan: &mut Loan, total_invested: Decimal, now: TimeStamp) -> bool {
    if loan.state != LoanState::Approved || total_invested != loan.principal.value() {
        return false;
    }

    debug!(loan_id = %loan.id, total = %total_invested, "loan fully funded");
    loan.state = LoanState::Invested;
    loan.updated_at = now;
    true
}
