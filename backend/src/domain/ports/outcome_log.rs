//! Port abstraction for the append-only generation outcome log.
//!
//! Appends also roll the per-account statistics forward in the same
//! transaction so totals never drift from the log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AccountId, AccountStats, Charge, GenerationOutcome, OutcomeRecord, OutcomeReport,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by outcome log adapters.
    pub enum OutcomeLogError {
        /// Store connection could not be established.
        Connection { message: String } => "outcome log connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "outcome log query failed: {message}",
        /// A stored row violated a domain invariant.
        Corrupt { message: String } => "outcome log returned invalid data: {message}",
    }
}

/// Result of [`OutcomeLog::append_with_charge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargedAppend {
    /// The charge committed together with the outcome.
    Recorded {
        /// Persisted outcome.
        outcome: GenerationOutcome,
        /// What was taken from the account.
        charge: Charge,
    },
    /// The account could not pay; nothing was written.
    Declined,
}

/// Port for writing and aggregating generation outcomes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutcomeLog: Send + Sync {
    /// Append an outcome that involves no ledger mutation.
    async fn append(&self, record: &OutcomeRecord) -> Result<GenerationOutcome, OutcomeLogError>;

    /// Charge one generation at `price` and append `record` atomically.
    ///
    /// Uses the same credit-then-balance rule as
    /// [`super::LedgerStore::try_spend`] under the account row lock. The
    /// record's charged columns are filled from the committed charge. An
    /// administrative account is recorded with [`Charge::Waived`] and left
    /// untouched. When the charge is declined nothing is written.
    async fn append_with_charge(
        &self,
        account_id: AccountId,
        price: u64,
        record: &OutcomeRecord,
    ) -> Result<ChargedAppend, OutcomeLogError>;

    /// Aggregate outcomes created at or after `since`.
    async fn report(&self, since: DateTime<Utc>) -> Result<OutcomeReport, OutcomeLogError>;

    /// Running totals for one account; `None` before its first outcome.
    async fn stats(
        &self,
        account_id: AccountId,
    ) -> Result<Option<AccountStats>, OutcomeLogError>;
}
