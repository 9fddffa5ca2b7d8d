//! Advisory affordability check run before any provider call.
//!
//! The gate never reserves funds. Settlement re-checks under a row lock, so a
//! pass here only means "worth trying".

use std::sync::Arc;

use tracing::debug;

use crate::domain::ports::{LedgerStore, LedgerStoreError};
use crate::domain::{Account, AccountId, Error};

/// Whether `account` could pay for one generation at `price` right now.
///
/// Administrative accounts always pass.
///
/// # Examples
/// ```
/// use photoshoot_backend::domain::{can_afford, Account, AccountId};
///
/// let mut account = Account::empty(AccountId::new(1));
/// assert!(!can_afford(&account, 50));
/// account.is_admin = true;
/// assert!(can_afford(&account, 50));
/// ```
pub fn can_afford(account: &Account, price: u64) -> bool {
    account.is_admin || account.plan_spend(price).is_some()
}

/// Gate verdict together with the snapshot it was based on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    /// Account snapshot read by the gate.
    pub account: Account,
    /// Whether the account passed.
    pub affordable: bool,
}

/// Loads an account and applies [`can_afford`].
#[derive(Clone)]
pub struct EligibilityGate {
    ledger: Arc<dyn LedgerStore>,
}

impl EligibilityGate {
    /// Build a gate over a ledger store.
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Check whether `account_id` can afford one generation at `price`.
    ///
    /// The account is created lazily on first reference; no balance or credit
    /// is touched.
    pub async fn check(&self, account_id: AccountId, price: u64) -> Result<Eligibility, Error> {
        let account = self
            .ledger
            .find_or_create(account_id)
            .await
            .map_err(map_ledger_error)?;
        let affordable = can_afford(&account, price);
        debug!(
            account_id = %account_id,
            credits = account.credits,
            balance = account.balance,
            is_admin = account.is_admin,
            affordable,
            "eligibility evaluated"
        );
        Ok(Eligibility {
            account,
            affordable,
        })
    }
}

pub(crate) fn map_ledger_error(error: LedgerStoreError) -> Error {
    match error {
        LedgerStoreError::Connection { message } => {
            Error::service_unavailable(format!("ledger unavailable: {message}"))
        }
        LedgerStoreError::Query { message } | LedgerStoreError::Corrupt { message } => {
            Error::internal(format!("ledger error: {message}"))
        }
    }
}
