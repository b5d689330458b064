use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{Amount, TimeStamp};

/// One investor's contribution to a loan. Never updated or deleted once stored.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Investment {
    #[n(0)]
    pub(crate) id: String, // bech32 encoded uuid7, `inv_` prefix
    #[n(1)]
    pub(crate) loan_id: String,
    #[n(2)]
    pub(crate) investor_email: String,
    #[n(3)]
    pub(crate) amount: Amount,
    #[n(4)]
    pub(crate) created_at: TimeStamp,
}

#[derive(Debug, Clone)]
pub struct InvestParams {
    pub investor_email: String,
    pub amount: Decimal,
}

impl Investment {
    pub(crate) fn new(id: String, loan_id: &str, params: &InvestParams, now: TimeStamp) -> Self {
        Self {
            id,
            loan_id: loan_id.to_string(),
            investor_email: params.investor_email.trim().to_string(),
            amount: params.amount.into(),
            created_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn loan_id(&self) -> &str {
        &self.loan_id
    }
    pub fn investor_email(&self) -> &str {
        &self.investor_email
    }
    pub fn amount(&self) -> Decimal {
        self.amount.value()
    }
    pub fn created_at(&self) -> TimeStamp {
        self.created_at
    }
}

/// Distinct investor emails in the order they first invested.
pub fn distinct_investors(investments: &[Investment]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    investments
        .iter()
        .filter(|inv| seen.insert(inv.investor_email.as_str()))
        .map(|inv| inv.investor_email.clone())
        .collect()
}
