//! Read-only reporting over the outcome log.

use std::sync::Arc;

use chrono::TimeDelta;
use mockable::Clock;

use crate::domain::ports::{OutcomeLog, OutcomeLogError};
use crate::domain::{AccountId, AccountStats, Error, OutcomeReport};

/// Longest reporting window accepted, in days.
pub const MAX_REPORT_DAYS: u32 = 3660;

/// Aggregates for operators.
#[derive(Clone)]
pub struct ReportingService {
    outcome_log: Arc<dyn OutcomeLog>,
    clock: Arc<dyn Clock>,
}

impl ReportingService {
    /// Build the service.
    pub fn new(outcome_log: Arc<dyn OutcomeLog>, clock: Arc<dyn Clock>) -> Self {
        Self { outcome_log, clock }
    }

    /// Totals for outcomes created in the last `days` days.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when `days` is zero or exceeds [`MAX_REPORT_DAYS`].
    pub async fn report_last_days(&self, days: u32) -> Result<OutcomeReport, Error> {
        if days == 0 || days > MAX_REPORT_DAYS {
            return Err(Error::invalid_request(format!(
                "report window must be between 1 and {MAX_REPORT_DAYS} days"
            )));
        }
        let since = self.clock.utc() - TimeDelta::days(i64::from(days));
        self.outcome_log
            .report(since)
            .await
            .map_err(map_outcome_log_error)
    }

    /// Running totals for one account, zeroed before its first outcome.
    pub async fn account_stats(&self, account_id: AccountId) -> Result<AccountStats, Error> {
        let stats = self
            .outcome_log
            .stats(account_id)
            .await
            .map_err(map_outcome_log_error)?;
        Ok(stats.unwrap_or_else(|| AccountStats::empty(account_id)))
    }
}

fn map_outcome_log_error(error: OutcomeLogError) -> Error {
    match error {
        OutcomeLogError::Connection { message } => {
            Error::service_unavailable(format!("outcome log unavailable: {message}"))
        }
        OutcomeLogError::Query { message } | OutcomeLogError::Corrupt { message } => {
            Error::internal(format!("outcome log error: {message}"))
        }
    }
}
