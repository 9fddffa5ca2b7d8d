//! PostgreSQL-backed `OutcomeLog` implementation using Diesel ORM.
//!
//! Appends insert the outcome and roll `account_stats` forward in one
//! transaction. A charged append additionally locks the account row and
//! spends from it, so the charge and the success record commit together or
//! not at all.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::Timestamptz;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::{AsyncConnection as _, AsyncPgConnection, RunQueryDsl};
use mockable::Clock;

use crate::domain::ports::{ChargedAppend, OutcomeLog, OutcomeLogError};
use crate::domain::{
    AccountId, AccountStats, Charge, GenerationOutcome, OutcomeRecord, OutcomeReport,
    OutcomeStatus,
};

use super::diesel_account_lock::{lock_account, write_account};
use super::diesel_basic_error_mapping::{
    TxError, map_basic_diesel_error, map_basic_pool_error, map_basic_tx_error,
};
use super::models::{
    AccountStatsRow, NewAccountStatsRow, NewOutcomeRow, OutcomeRow, OutcomeTotalsRow,
};
use super::pool::{DbPool, PoolError};
use super::schema::{account_stats, generation_outcomes};

/// Diesel-backed implementation of the `OutcomeLog` port.
#[derive(Clone)]
pub struct DieselOutcomeLog {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl DieselOutcomeLog {
    /// Create a new log with the given connection pool and clock.
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

fn map_pool_error(error: PoolError) -> OutcomeLogError {
    map_basic_pool_error(error, OutcomeLogError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> OutcomeLogError {
    map_basic_diesel_error(error, OutcomeLogError::query, OutcomeLogError::connection)
}

fn map_tx_error(error: TxError) -> OutcomeLogError {
    map_basic_tx_error(
        error,
        OutcomeLogError::query,
        OutcomeLogError::connection,
        OutcomeLogError::corrupt,
    )
}

const REPORT_SQL: &str = r#"
SELECT status,
       COUNT(*)::BIGINT AS outcomes,
       COALESCE(SUM(charged_amount), 0)::BIGINT AS charged_amount,
       COALESCE(SUM(charged_credits), 0)::BIGINT AS charged_credits
FROM generation_outcomes
WHERE created_at >= $1
GROUP BY status
"#;

/// Fold per-status aggregate rows into a report.
fn fold_report(rows: Vec<OutcomeTotalsRow>) -> Result<OutcomeReport, String> {
    rows.into_iter().try_fold(OutcomeReport::default(), |mut report, row| {
        let status = row.status.parse::<OutcomeStatus>()?;
        let outcomes = u64::try_from(row.outcomes)
            .map_err(|_| "negative outcome count in report".to_owned())?;
        let amount = u64::try_from(row.charged_amount)
            .map_err(|_| "negative charged_amount in outcome log".to_owned())?;
        let credits = u64::try_from(row.charged_credits)
            .map_err(|_| "negative charged_credits in outcome log".to_owned())?;
        report.add_group(status, outcomes, amount, credits);
        Ok(report)
    })
}

/// Insert the outcome row and fold it into the account's running totals.
async fn insert_outcome(
    conn: &mut AsyncPgConnection,
    record: &OutcomeRecord,
) -> Result<GenerationOutcome, TxError> {
    let row = NewOutcomeRow::from_record(record).map_err(TxError::Corrupt)?;
    let stored: OutcomeRow = diesel::insert_into(generation_outcomes::table)
        .values(&row)
        .returning(OutcomeRow::as_returning())
        .get_result(conn)
        .await?;

    let increment = NewAccountStatsRow::for_outcome(&row);
    diesel::insert_into(account_stats::table)
        .values(&increment)
        .on_conflict(account_stats::account_id)
        .do_update()
        .set((
            account_stats::spent_amount
                .eq(account_stats::spent_amount + excluded(account_stats::spent_amount)),
            account_stats::generations_succeeded.eq(account_stats::generations_succeeded
                + excluded(account_stats::generations_succeeded)),
            account_stats::generations_failed
                .eq(account_stats::generations_failed + excluded(account_stats::generations_failed)),
            account_stats::last_generation_at.eq(excluded(account_stats::last_generation_at)),
        ))
        .execute(conn)
        .await?;

    GenerationOutcome::try_from(stored).map_err(TxError::Corrupt)
}

#[async_trait]
impl OutcomeLog for DieselOutcomeLog {
    async fn append(&self, record: &OutcomeRecord) -> Result<GenerationOutcome, OutcomeLogError> {
        let now = self.clock.utc();
        let mut pooled = self.pool.get().await.map_err(map_pool_error)?;
        let conn: &mut AsyncPgConnection = &mut pooled;
        conn.transaction(|conn| {
            async move {
                // Stats reference the account row, which may not exist yet
                // for a request that never reached the ledger.
                lock_account(conn, record.account_id, now).await?;
                insert_outcome(conn, record).await
            }
            .scope_boxed()
        })
        .await
        .map_err(map_tx_error)
    }

    async fn append_with_charge(
        &self,
        account_id: AccountId,
        price: u64,
        record: &OutcomeRecord,
    ) -> Result<ChargedAppend, OutcomeLogError> {
        let now = self.clock.utc();
        let mut pooled = self.pool.get().await.map_err(map_pool_error)?;
        let conn: &mut AsyncPgConnection = &mut pooled;
        conn.transaction(|conn| {
            async move {
                let account = lock_account(conn, account_id, now).await?;
                let charge = if account.is_admin {
                    Charge::Waived
                } else {
                    let Some(charge) = account.plan_spend(price) else {
                        return Ok(ChargedAppend::Declined);
                    };
                    write_account(conn, &account.after_charge(charge), now).await?;
                    charge
                };
                let outcome = insert_outcome(conn, &record.clone().with_charge(charge)).await?;
                Ok::<_, TxError>(ChargedAppend::Recorded { outcome, charge })
            }
            .scope_boxed()
        })
        .await
        .map_err(map_tx_error)
    }

    async fn report(&self, since: DateTime<Utc>) -> Result<OutcomeReport, OutcomeLogError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<OutcomeTotalsRow> = sql_query(REPORT_SQL)
            .bind::<Timestamptz, _>(since)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        fold_report(rows).map_err(OutcomeLogError::corrupt)
    }

    async fn stats(
        &self,
        account_id: AccountId,
    ) -> Result<Option<AccountStats>, OutcomeLogError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<AccountStatsRow> = account_stats::table
            .find(account_id.as_i64())
            .select(AccountStatsRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(AccountStats::try_from)
            .transpose()
            .map_err(OutcomeLogError::corrupt)
    }
}

#[cfg(test)]
mod tests {
    //! Report folding over aggregate rows; SQL paths run in `tests/`.

    use super::*;
    use rstest::rstest;

    fn row(status: &str, outcomes: i64, amount: i64, credits: i64) -> OutcomeTotalsRow {
        OutcomeTotalsRow {
            status: status.to_owned(),
            outcomes,
            charged_amount: amount,
            charged_credits: credits,
        }
    }

    #[rstest]
    fn grouped_rows_fold_into_one_report() {
        let report = fold_report(vec![row("success", 3, 100, 1), row("failure", 2, 0, 0)])
            .expect("rows are valid");

        assert_eq!(
            report,
            OutcomeReport {
                total: 5,
                succeeded: 3,
                failed: 2,
                charged_amount: 100,
                charged_credits: 1,
            }
        );
    }

    #[rstest]
    fn empty_window_is_an_empty_report() {
        assert_eq!(fold_report(Vec::new()), Ok(OutcomeReport::default()));
    }

    #[rstest]
    #[case::unknown_status(row("pending", 1, 0, 0))]
    #[case::negative_amount(row("success", 1, -5, 0))]
    fn corrupt_rows_are_rejected(#[case] bad: OutcomeTotalsRow) {
        assert!(fold_report(vec![bad]).is_err());
    }
}
