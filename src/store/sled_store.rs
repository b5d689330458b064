use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use tracing::debug;

use super::{LoanFilter, LoanStore, check_revision, encode};
use crate::error::StoreError;
use crate::investment::Investment;
use crate::loan::Loan;

const LOANS_TREE: &str = "loans";
const INVESTMENTS_TREE: &str = "investments";

/// Durable store on an embedded sled database.
///
/// Loans live in the `loans` tree keyed by id. Investments live in the
/// `investments` tree under `<loan id>/<investment id>` so one prefix scan
/// yields a loan's whole ledger.
pub struct SledStore {
    instance: Db,
    loans: Tree,
    investments: Tree,
}

fn investment_prefix(loan_id: &str) -> String {
    format!("{loan_id}/")
}

fn investment_key(investment: &Investment) -> String {
    format!("{}{}", investment_prefix(investment.loan_id()), investment.id())
}

fn abort<T>(err: StoreError) -> Result<T, ConflictableTransactionError<StoreError>> {
    Err(ConflictableTransactionError::Abort(err))
}

fn from_transaction<T>(result: Result<T, TransactionError<StoreError>>) -> Result<T, StoreError> {
    result.map_err(|err| match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => StoreError::Sled(err),
    })
}

impl SledStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    pub fn from_db(instance: Db) -> Result<Self, StoreError> {
        let loans = instance.open_tree(LOANS_TREE)?;
        let investments = instance.open_tree(INVESTMENTS_TREE)?;
        Ok(Self {
            instance,
            loans,
            investments,
        })
    }
}

impl LoanStore for SledStore {
    fn create_loan(&self, loan: &Loan) -> Result<(), StoreError> {
        let cbor = encode(loan)?;
        self.loans
            .compare_and_swap(loan.id().as_bytes(), None as Option<&[u8]>, Some(cbor))?
            .map_err(|_| StoreError::Duplicate(loan.id().to_string()))?;

        debug!(loan_id = loan.id(), "loan inserted");
        Ok(())
    }

    fn get_loan(&self, id: &str) -> Result<Loan, StoreError> {
        let raw = self
            .loans
            .get(id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(minicbor::decode(&raw)?)
    }

    fn update_loan(&self, loan: &Loan, expected_revision: u64) -> Result<usize, StoreError> {
        let cbor = encode(loan)?;
        let key = loan.id().as_bytes();

        from_transaction(self.loans.transaction(|loans| {
            let Some(raw) = loans.get(key)? else {
                return Ok(0);
            };
            let stored: Loan = match minicbor::decode(&raw) {
                Ok(stored) => stored,
                Err(err) => return abort(StoreError::Decode(err)),
            };
            if let Err(err) = check_revision(&stored, expected_revision) {
                return abort(err);
            }

            loans.insert(key, cbor.as_slice())?;
            Ok(1)
        }))
    }

    fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>, StoreError> {
        let mut loans = Vec::new();
        for entry in self.loans.iter() {
            let (_, raw) = entry?;
            loans.push(minicbor::decode::<Loan>(&raw)?);
        }
        Ok(filter.apply(loans))
    }

    fn create_investment(
        &self,
        investment: &Investment,
        loan: &Loan,
        expected_revision: u64,
    ) -> Result<(), StoreError> {
        let investment_cbor = encode(investment)?;
        let loan_cbor = encode(loan)?;
        let investment_key = investment_key(investment);
        let loan_key = loan.id().as_bytes();

        // both inserts commit together, sled reruns the closure on write conflicts
        from_transaction((&self.loans, &self.investments).transaction(
            |(loans, investments)| {
                let Some(raw) = loans.get(loan_key)? else {
                    return abort(StoreError::NotFound(loan.id().to_string()));
                };
                let stored: Loan = match minicbor::decode(&raw) {
                    Ok(stored) => stored,
                    Err(err) => return abort(StoreError::Decode(err)),
                };
                if let Err(err) = check_revision(&stored, expected_revision) {
                    return abort(err);
                }
                if investments.get(investment_key.as_bytes())?.is_some() {
                    return abort(StoreError::Duplicate(investment.id().to_string()));
                }

                investments.insert(investment_key.as_bytes(), investment_cbor.as_slice())?;
                loans.insert(loan_key, loan_cbor.as_slice())?;
                Ok(())
            },
        ))?;

        debug!(loan_id = loan.id(), investment_id = investment.id(), "investment committed");
        Ok(())
    }

    fn list_investments_by_loan(&self, loan_id: &str) -> Result<Vec<Investment>, StoreError> {
        let mut investments = Vec::new();
        for entry in self.investments.scan_prefix(investment_prefix(loan_id).as_bytes()) {
            let (_, raw) = entry?;
            investments.push(minicbor::decode::<Investment>(&raw)?);
        }
        // bech32 ids are not lexically time ordered
        investments.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(investments)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.instance.flush()?;
        Ok(())
    }
}
