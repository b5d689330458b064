use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{LoanFilter, LoanStore, check_revision};
use crate::error::StoreError;
use crate::investment::Investment;
use crate::loan::Loan;

#[derive(Debug, Default)]
struct Records {
    loans: HashMap<String, Loan>,
    investments: HashMap<String, Vec<Investment>>, // keyed by loan id, append order
}

/// Volatile store for tests and dry runs. Every operation holds one mutex,
/// so each call is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, Records>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

impl LoanStore for MemoryStore {
    fn create_loan(&self, loan: &Loan) -> Result<(), StoreError> {
        let mut records = self.records()?;
        if records.loans.contains_key(loan.id()) {
            return Err(StoreError::Duplicate(loan.id().to_string()));
        }
        records.loans.insert(loan.id().to_string(), loan.clone());
        Ok(())
    }

    fn get_loan(&self, id: &str) -> Result<Loan, StoreError> {
        self.records()?
            .loans
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn update_loan(&self, loan: &Loan, expected_revision: u64) -> Result<usize, StoreError> {
        let mut records = self.records()?;
        let Some(stored) = records.loans.get_mut(loan.id()) else {
            return Ok(0);
        };
        check_revision(stored, expected_revision)?;
        *stored = loan.clone();
        Ok(1)
    }

    fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>, StoreError> {
        let records = self.records()?;
        Ok(filter.apply(records.loans.values().cloned()))
    }

    fn create_investment(
        &self,
        investment: &Investment,
        loan: &Loan,
        expected_revision: u64,
    ) -> Result<(), StoreError> {
        let mut records = self.records()?;
        let stored = records
            .loans
            .get(loan.id())
            .ok_or_else(|| StoreError::NotFound(loan.id().to_string()))?;
        check_revision(stored, expected_revision)?;

        let ledger = records.investments.entry(loan.id().to_string()).or_default();
        if ledger.iter().any(|existing| existing.id() == investment.id()) {
            return Err(StoreError::Duplicate(investment.id().to_string()));
        }
        ledger.push(investment.clone());
        records.loans.insert(loan.id().to_string(), loan.clone());
        Ok(())
    }

    fn list_investments_by_loan(&self, loan_id: &str) -> Result<Vec<Investment>, StoreError> {
        Ok(self
            .records()?
            .investments
            .get(loan_id)
            .cloned()
            .unwrap_or_default())
    }
}
