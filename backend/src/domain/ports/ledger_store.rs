//! Port abstraction for account ledger persistence.
//!
//! Every credit or balance mutation goes through one of these methods, and
//! each method is a single storage transaction holding a row lock on the
//! account. There is deliberately no "write this balance" method: callers
//! express intent (spend, adjust) and the adapter does read-modify-write under
//! the lock.

use async_trait::async_trait;

use crate::domain::{Account, AccountId, SpendDecision};

use super::define_port_error;

define_port_error! {
    /// Errors raised by ledger store adapters.
    pub enum LedgerStoreError {
        /// Store connection could not be established.
        Connection { message: String } => "ledger store connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "ledger store query failed: {message}",
        /// A stored row violated a domain invariant.
        Corrupt { message: String } => "ledger store returned invalid data: {message}",
    }
}

/// Port for account state and the atomic spend primitive.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load an account, creating an empty one on first reference.
    async fn find_or_create(&self, account_id: AccountId) -> Result<Account, LedgerStoreError>;

    /// Load an account without creating it.
    async fn find(&self, account_id: AccountId) -> Result<Option<Account>, LedgerStoreError>;

    /// Atomically charge one generation at `price`.
    ///
    /// Takes one credit if any remain, otherwise `price` from the balance if
    /// it suffices, otherwise declines and changes nothing. Never clamps.
    async fn try_spend(
        &self,
        account_id: AccountId,
        price: u64,
    ) -> Result<SpendDecision, LedgerStoreError>;

    /// Add `delta` credits, clamping the result at zero.
    async fn adjust_credits(
        &self,
        account_id: AccountId,
        delta: i64,
    ) -> Result<Account, LedgerStoreError>;

    /// Add `delta` to the balance, clamping the result at zero.
    async fn adjust_balance(
        &self,
        account_id: AccountId,
        delta: i64,
    ) -> Result<Account, LedgerStoreError>;

    /// Reset the balance to zero.
    async fn clear_balance(&self, account_id: AccountId) -> Result<Account, LedgerStoreError>;

    /// Grant or revoke administrative status.
    async fn set_admin(
        &self,
        account_id: AccountId,
        is_admin: bool,
    ) -> Result<Account, LedgerStoreError>;
}
