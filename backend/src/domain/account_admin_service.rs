//! Operator-facing account administration.
//!
//! Every mutation is a single locked ledger operation and clamps at zero;
//! only the spend primitive refuses instead of clamping.

use std::sync::Arc;

use tracing::info;

use crate::domain::eligibility::map_ledger_error;
use crate::domain::ports::LedgerStore;
use crate::domain::{Account, AccountId, Error};

/// Administrative operations over a [`LedgerStore`].
#[derive(Clone)]
pub struct AccountAdminService {
    ledger: Arc<dyn LedgerStore>,
    price: u64,
}

impl AccountAdminService {
    /// Build the service; `price` converts generation top-ups to balance.
    pub fn new(ledger: Arc<dyn LedgerStore>, price: u64) -> Self {
        Self { ledger, price }
    }

    /// Load an existing account.
    pub async fn show(&self, account_id: AccountId) -> Result<Account, Error> {
        self.ledger
            .find(account_id)
            .await
            .map_err(map_ledger_error)?
            .ok_or_else(|| Error::not_found(format!("account {account_id} not found")))
    }

    /// Add (or with a negative delta, remove) credits.
    pub async fn adjust_credits(&self, account_id: AccountId, delta: i64) -> Result<Account, Error> {
        let account = self
            .ledger
            .adjust_credits(account_id, delta)
            .await
            .map_err(map_ledger_error)?;
        info!(account_id = %account_id, delta, credits = account.credits, "credits adjusted");
        Ok(account)
    }

    /// Add (or with a negative delta, remove) balance.
    pub async fn adjust_balance(&self, account_id: AccountId, delta: i64) -> Result<Account, Error> {
        let account = self
            .ledger
            .adjust_balance(account_id, delta)
            .await
            .map_err(map_ledger_error)?;
        info!(account_id = %account_id, delta, balance = account.balance, "balance adjusted");
        Ok(account)
    }

    /// Reset the balance to zero.
    pub async fn clear_balance(&self, account_id: AccountId) -> Result<Account, Error> {
        let account = self
            .ledger
            .clear_balance(account_id)
            .await
            .map_err(map_ledger_error)?;
        info!(account_id = %account_id, "balance cleared");
        Ok(account)
    }

    /// Grant or revoke administrative status.
    pub async fn set_admin(&self, account_id: AccountId, is_admin: bool) -> Result<Account, Error> {
        let account = self
            .ledger
            .set_admin(account_id, is_admin)
            .await
            .map_err(map_ledger_error)?;
        info!(account_id = %account_id, is_admin, "admin flag updated");
        Ok(account)
    }

    /// Add `generations * price` to the balance.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when `generations` is zero or the amount overflows.
    pub async fn top_up_generations(
        &self,
        account_id: AccountId,
        generations: u32,
    ) -> Result<Account, Error> {
        if generations == 0 {
            return Err(Error::invalid_request("top-up must add at least one generation"));
        }
        let delta = self
            .price
            .checked_mul(u64::from(generations))
            .and_then(|amount| i64::try_from(amount).ok())
            .ok_or_else(|| Error::invalid_request("top-up amount is too large"))?;
        self.adjust_balance(account_id, delta).await
    }
}
