//! Service layer API for loan workflow operations
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::error::LoanError;
use super::investment::{InvestParams, Investment, distinct_investors};
use super::ledger::{self, LoanSummary};
use super::lifecycle;
use super::loan::{ApprovalEvidence, CreateLoanParams, DisbursementEvidence, Loan};
use super::locks::{Deadline, LoanLocks};
use super::notify::{FundedNotice, Notifier};
use super::store::{LoanFilter, LoanStore};
use super::types::TimeStamp;
use super::utils::{self, INVESTMENT_HRP, LOAN_HRP};

pub const DEFAULT_MAX_CONFLICT_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    /// How often a mutation is replayed after losing a revision race.
    pub max_conflict_retries: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

/// What a successful investment produced.
#[derive(Debug, Clone, Serialize)]
pub struct InvestOutcome {
    pub investment: Investment,
    pub loan: Loan,
    pub fully_funded: bool,
    /// Set when the loan was funded but the notice could not be delivered.
    pub notification_error: Option<String>,
}

pub struct LoanService {
    store: Arc<dyn LoanStore>,
    notifier: Arc<dyn Notifier>,
    locks: LoanLocks,
    options: ServiceOptions,
}

impl LoanService {
    pub fn new(store: Arc<dyn LoanStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_options(store, notifier, ServiceOptions::default())
    }

    pub fn with_options(
        store: Arc<dyn LoanStore>,
        notifier: Arc<dyn Notifier>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            store,
            notifier,
            locks: LoanLocks::new(),
            options,
        }
    }

    /// Load a loan from the store
    fn load_loan(&self, id: &str) -> Result<Loan, LoanError> {
        self.store
            .get_loan(id)
            .map_err(|err| LoanError::from_store(id, err))
    }

    fn new_id(hrp: &str) -> Result<String, LoanError> {
        utils::new_uuid_to_bech32(hrp).map_err(|err| LoanError::Identifier(err.to_string()))
    }

    /// Create a new loan in the proposed state
    pub fn create_loan(&self, params: CreateLoanParams) -> Result<Loan, LoanError> {
        params.validate()?;

        let loan = Loan::new(Self::new_id(LOAN_HRP)?, params, TimeStamp::new());
        self.store
            .create_loan(&loan)
            .map_err(|err| LoanError::from_store(loan.id(), err))?;

        info!(loan_id = loan.id(), principal = %loan.principal(), "loan proposed");
        Ok(loan)
    }

    /// Approve a proposed loan
    #[instrument(skip_all, fields(loan_id = id))]
    pub fn approve_loan(
        &self,
        id: &str,
        evidence: ApprovalEvidence,
        deadline: Deadline,
    ) -> Result<Loan, LoanError> {
        let loan = self.transition(id, deadline, |loan, now| {
            lifecycle::approve(loan, evidence.clone(), now)
        })?;

        info!(loan_id = id, "loan approved");
        Ok(loan)
    }

    /// Disburse a fully invested loan
    #[instrument(skip_all, fields(loan_id = id))]
    pub fn disburse_loan(
        &self,
        id: &str,
        evidence: DisbursementEvidence,
        deadline: Deadline,
    ) -> Result<Loan, LoanError> {
        let loan = self.transition(id, deadline, |loan, now| {
            lifecycle::disburse(loan, evidence.clone(), now)
        })?;

        info!(loan_id = id, "loan disbursed");
        Ok(loan)
    }

    /// Invest in an approved loan, promoting it to invested once fully funded
    #[instrument(skip_all, fields(loan_id = id))]
    pub fn invest_in_loan(
        &self,
        id: &str,
        params: InvestParams,
        deadline: Deadline,
    ) -> Result<InvestOutcome, LoanError> {
        if !utils::is_valid_email(params.investor_email.trim()) {
            return Err(LoanError::InvalidParams(format!(
                "'{}' is not a valid investor email",
                params.investor_email
            )));
        }
        deadline.check()?;

        let (investment, loan, fully_funded) = {
            let _guard = self.locks.acquire(id, deadline)?;
            self.with_retries(id, || self.try_invest(id, &params, deadline))?
        };

        let mut outcome = InvestOutcome {
            investment,
            loan,
            fully_funded,
            notification_error: None,
        };

        // funding is committed at this point, a failed notice only gets reported
        if fully_funded {
            if let Err(err) = self.notify_investors(&outcome.loan) {
                warn!(loan_id = id, error = %err, "fully funded notice failed");
                outcome.notification_error = Some(err.to_string());
            }
        }
        Ok(outcome)
    }

    /// Fails unless `id` could be approved by `staff_id` right now.
    ///
    /// Callers run this before storing evidence files; `approve_loan` re-checks
    /// under the loan's lock.
    pub fn check_approvable(&self, id: &str, staff_id: &str) -> Result<(), LoanError> {
        lifecycle::ensure_can_approve(&self.load_loan(id)?)?;
        lifecycle::validate_staff_id(staff_id)
    }

    /// Fails unless `id` could be disbursed by `staff_id` right now.
    pub fn check_disbursable(&self, id: &str, staff_id: &str) -> Result<(), LoanError> {
        lifecycle::ensure_can_disburse(&self.load_loan(id)?)?;
        lifecycle::validate_staff_id(staff_id)
    }

    /// Loan with its investments and funding totals
    pub fn get_loan_summary(&self, id: &str) -> Result<LoanSummary, LoanError> {
        let loan = self.load_loan(id)?;
        let investments = self
            .store
            .list_investments_by_loan(id)
            .map_err(|err| LoanError::from_store(id, err))?;

        Ok(LoanSummary::new(loan, investments))
    }

    pub fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>, LoanError> {
        Ok(self.store.list_loans(filter)?)
    }

    /// Runs a staff transition inside the loan's critical section.
    fn transition<F>(&self, id: &str, deadline: Deadline, apply: F) -> Result<Loan, LoanError>
    where
        F: Fn(&mut Loan, TimeStamp) -> Result<(), LoanError>,
    {
        deadline.check()?;
        let _guard = self.locks.acquire(id, deadline)?;

        self.with_retries(id, || {
            let current = self.load_loan(id)?;
            let now = TimeStamp::new();

            let mut updated = current.clone();
            apply(&mut updated, now)?;
            updated.touch(now);

            deadline.check()?;
            let affected = self
                .store
                .update_loan(&updated, current.revision())
                .map_err(|err| LoanError::from_store(id, err))?;
            if affected == 0 {
                return Err(LoanError::NotFound(id.to_string()));
            }
            Ok(updated)
        })
    }

    /// One read-admit-commit pass against the freshest persisted total.
    fn try_invest(
        &self,
        id: &str,
        params: &InvestParams,
        deadline: Deadline,
    ) -> Result<(Investment, Loan, bool), LoanError> {
        let current = self.load_loan(id)?;
        let total = self
            .store
            .sum_investments_by_loan(id)
            .map_err(|err| LoanError::from_store(id, err))?;
        let admission = ledger::admit(&current, total, params.amount)?;

        let now = TimeStamp::new();
        let investment = Investment::new(Self::new_id(INVESTMENT_HRP)?, id, params, now);
        let mut updated = current.clone();
        updated.touch(now);
        let promoted = lifecycle::promote_if_fully_funded(&mut updated, admission.new_total, now);

        deadline.check()?;
        self.store
            .create_investment(&investment, &updated, current.revision())
            .map_err(|err| LoanError::from_store(id, err))?;

        info!(
            loan_id = id,
            investment_id = investment.id(),
            amount = %params.amount,
            total = %admission.new_total,
            promoted,
            "investment recorded"
        );
        Ok((investment, updated, promoted))
    }

    fn with_retries<T>(
        &self,
        id: &str,
        mut attempt: impl FnMut() -> Result<T, LoanError>,
    ) -> Result<T, LoanError> {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(LoanError::ConcurrencyConflict(_))
                    if retries < self.options.max_conflict_retries =>
                {
                    retries += 1;
                    warn!(loan_id = id, retries, "loan changed underneath, retrying");
                }
                result => return result,
            }
        }
    }

    fn notify_investors(&self, loan: &Loan) -> Result<(), LoanError> {
        let investments = self
            .store
            .list_investments_by_loan(loan.id())
            .map_err(|err| LoanError::from_store(loan.id(), err))?;
        let notice = FundedNotice::new(loan, distinct_investors(&investments));

        self.notifier.notify_fully_funded(&notice)?;
        Ok(())
    }
}
