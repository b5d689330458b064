//! Funding arithmetic: whether an investment fits under a loan's principal
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::LoanError;
use crate::investment::Investment;
use crate::loan::{Loan, LoanState};
use crate::types::{MAX_AMOUNT_SCALE, within_amount_scale};

/// Result of admitting an investment against the current total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub new_total: Decimal,
    pub fully_funded: bool,
}

/// Decides whether `proposed` may be added to a loan already funded to `current_total`.
///
/// Must be evaluated against a total read inside the loan's critical section.
pub fn admit(loan: &Loan, current_total: Decimal, proposed: Decimal) -> Result<Admission, LoanError> {
    if !matches!(loan.state(), LoanState::Approved | LoanState::Invested) {
        return Err(LoanError::InvalidState(loan.state()));
    }
    if proposed <= Decimal::ZERO {
        return Err(LoanError::NonPositiveAmount);
    }
    if !within_amount_scale(proposed) {
        return Err(LoanError::InvalidParams(format!(
            "investment amount may have at most {MAX_AMOUNT_SCALE} decimal places"
        )));
    }

    // compare against the headroom so an oversized amount is never added
    let principal = loan.principal();
    let headroom = principal - current_total;
    if proposed > headroom {
        return Err(LoanError::OverfundingRejected { remaining: headroom });
    }
    let new_total = current_total + proposed;

    Ok(Admission {
        new_total,
        fully_funded: new_total == principal,
    })
}

/// Headroom left before the loan is fully funded, never negative.
pub fn remaining(loan: &Loan, total: Decimal) -> Decimal {
    (loan.principal() - total).max(Decimal::ZERO)
}

pub fn total_of(investments: &[Investment]) -> Decimal {
    investments.iter().map(Investment::amount).sum()
}

/// Read-only funding view of a loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanSummary {
    pub loan: Loan,
    pub total_invested: Decimal,
    pub remaining_amount: Decimal,
    pub investment_count: usize,
    pub investments: Vec<Investment>,
}

impl LoanSummary {
    pub fn new(loan: Loan, investments: Vec<Investment>) -> Self {
        let total_invested = total_of(&investments);
        Self {
            remaining_amount: remaining(&loan, total_invested),
            investment_count: investments.len(),
            total_invested,
            investments,
            loan,
        }
    }
}
