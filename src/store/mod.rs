//! Persistence boundary for loans and their investment ledger
//!
//! Both backends give the same guarantees: a loan write is conditional on the
//! revision the caller read, and an investment insert commits together with
//! the loan replacement or not at all.
mod memory;
mod sled_store;

pub use self::memory::MemoryStore;
pub use self::sled_store::SledStore;

use rust_decimal::Decimal;

use crate::error::StoreError;
use crate::investment::Investment;
use crate::loan::{Loan, LoanState};

pub trait LoanStore: Send + Sync {
    /// Inserts a new loan. Fails with `Duplicate` if the id is taken.
    fn create_loan(&self, loan: &Loan) -> Result<(), StoreError>;

    fn get_loan(&self, id: &str) -> Result<Loan, StoreError>;

    /// Replaces the whole loan record if the stored revision equals `expected_revision`.
    ///
    /// Returns the number of affected records, zero when the loan vanished.
    fn update_loan(&self, loan: &Loan, expected_revision: u64) -> Result<usize, StoreError>;

    fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>, StoreError>;

    /// Appends `investment` and replaces `loan` in one transaction, conditional on
    /// the stored loan still being at `expected_revision`.
    fn create_investment(
        &self,
        investment: &Investment,
        loan: &Loan,
        expected_revision: u64,
    ) -> Result<(), StoreError>;

    /// All investments of a loan in creation order.
    fn list_investments_by_loan(&self, loan_id: &str) -> Result<Vec<Investment>, StoreError>;

    fn sum_investments_by_loan(&self, loan_id: &str) -> Result<Decimal, StoreError> {
        Ok(self
            .list_investments_by_loan(loan_id)?
            .iter()
            .map(Investment::amount)
            .sum())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub state: Option<LoanState>,
    pub borrower_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan) -> bool {
        self.state.is_none_or(|state| loan.state() == state)
            && self
                .borrower_id
                .as_deref()
                .is_none_or(|borrower| loan.borrower_id() == borrower)
    }

    /// Filters, orders newest first, then applies the offset/limit window.
    pub fn apply(&self, loans: impl IntoIterator<Item = Loan>) -> Vec<Loan> {
        let mut selected: Vec<Loan> = loans.into_iter().filter(|loan| self.matches(loan)).collect();
        selected.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(a.id()))
        });

        selected
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(value).map_err(|err| StoreError::Encode(err.to_string()))
}

fn check_revision(stored: &Loan, expected: u64) -> Result<(), StoreError> {
    if stored.revision() != expected {
        return Err(StoreError::Conflict {
            id: stored.id().to_string(),
            expected,
            found: stored.revision(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::CreateLoanParams;
    use crate::types::TimeStamp;
    use rust_decimal_macros::dec;

    fn loan(id: &str, borrower: &str, day: u32) -> Loan {
        let params = CreateLoanParams {
            borrower_id: borrower.into(),
            principal: dec!(100),
            rate: dec!(10),
            roi: dec!(8),
            agreement_link: "https://example.com/a.pdf".into(),
        };
        Loan::new(id.into(), params, TimeStamp::new_with(2024, 1, day, 0, 0, 0))
    }

    #[test]
    fn filter_orders_newest_first_and_windows() {
        let loans = vec![loan("l1", "b1", 1), loan("l2", "b2", 2), loan("l3", "b1", 3)];

        let all = LoanFilter::default().apply(loans.clone());
        let ids: Vec<_> = all.iter().map(Loan::id).collect();
        assert_eq!(ids, ["l3", "l2", "l1"]);

        let filter = LoanFilter {
            borrower_id: Some("b1".into()),
            ..Default::default()
        };
        let ids: Vec<_> = filter.apply(loans.clone()).iter().map(|l| l.id().to_string()).collect();
        assert_eq!(ids, ["l3", "l1"]);

        let window = LoanFilter {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        };
        let ids: Vec<_> = window.apply(loans.clone()).iter().map(|l| l.id().to_string()).collect();
        assert_eq!(ids, ["l2"]);

        let by_state = LoanFilter {
            state: Some(LoanState::Approved),
            ..Default::default()
        };
        assert!(by_state.apply(loans).is_empty());
    }
}
