//! PostgreSQL-backed `LedgerStore` implementation using Diesel ORM.
//!
//! Every method is one transaction around a locked account row. Spending
//! refuses rather than clamping; administrative adjustments clamp at zero.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::{AsyncConnection as _, AsyncPgConnection, RunQueryDsl};
use mockable::Clock;
use tracing::debug;

use crate::domain::ports::{LedgerStore, LedgerStoreError};
use crate::domain::{Account, AccountId, SpendDecision};

use super::diesel_account_lock::{lock_account, write_account};
use super::diesel_basic_error_mapping::{
    TxError, map_basic_diesel_error, map_basic_pool_error, map_basic_tx_error,
};
use super::models::AccountRow;
use super::pool::{DbPool, PoolError};
use super::schema::accounts;

/// Diesel-backed implementation of the `LedgerStore` port.
#[derive(Clone)]
pub struct DieselLedgerStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl DieselLedgerStore {
    /// Create a new store with the given connection pool and clock.
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Lock `account_id`, apply `mutate`, and write the result back.
    async fn mutate<F>(&self, account_id: AccountId, mutate: F) -> Result<Account, LedgerStoreError>
    where
        F: FnOnce(&Account) -> Account + Send + 'static,
    {
        let now = self.clock.utc();
        let mut pooled = self.pool.get().await.map_err(map_pool_error)?;
        let conn: &mut AsyncPgConnection = &mut pooled;
        conn.transaction(|conn| {
            async move {
                let current = lock_account(conn, account_id, now).await?;
                write_account(conn, &mutate(&current), now).await
            }
            .scope_boxed()
        })
        .await
        .map_err(map_tx_error)
    }
}

fn map_pool_error(error: PoolError) -> LedgerStoreError {
    map_basic_pool_error(error, LedgerStoreError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> LedgerStoreError {
    map_basic_diesel_error(error, LedgerStoreError::query, LedgerStoreError::connection)
}

fn map_tx_error(error: TxError) -> LedgerStoreError {
    map_basic_tx_error(
        error,
        LedgerStoreError::query,
        LedgerStoreError::connection,
        LedgerStoreError::corrupt,
    )
}

#[async_trait]
impl LedgerStore for DieselLedgerStore {
    async fn find_or_create(&self, account_id: AccountId) -> Result<Account, LedgerStoreError> {
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(accounts::table)
            .values((
                accounts::id.eq(account_id.as_i64()),
                accounts::created_at.eq(now),
                accounts::updated_at.eq(now),
            ))
            .on_conflict(accounts::id)
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let row = accounts::table
            .find(account_id.as_i64())
            .select(AccountRow::as_select())
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Account::try_from(row).map_err(LedgerStoreError::corrupt)
    }

    async fn find(&self, account_id: AccountId) -> Result<Option<Account>, LedgerStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<AccountRow> = accounts::table
            .find(account_id.as_i64())
            .select(AccountRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(Account::try_from)
            .transpose()
            .map_err(LedgerStoreError::corrupt)
    }

    async fn try_spend(
        &self,
        account_id: AccountId,
        price: u64,
    ) -> Result<SpendDecision, LedgerStoreError> {
        let now = self.clock.utc();
        let mut pooled = self.pool.get().await.map_err(map_pool_error)?;
        let conn: &mut AsyncPgConnection = &mut pooled;
        let decision = conn
            .transaction(|conn| {
                async move {
                    let current = lock_account(conn, account_id, now).await?;
                    let Some(charge) = current.plan_spend(price) else {
                        return Ok(SpendDecision::Declined);
                    };
                    write_account(conn, &current.after_charge(charge), now).await?;
                    Ok::<_, TxError>(SpendDecision::Charged(charge))
                }
                .scope_boxed()
            })
            .await
            .map_err(map_tx_error)?;
        debug!(account_id = %account_id, price, ?decision, "spend attempted");
        Ok(decision)
    }

    async fn adjust_credits(
        &self,
        account_id: AccountId,
        delta: i64,
    ) -> Result<Account, LedgerStoreError> {
        self.mutate(account_id, move |account| account.with_credit_delta(delta))
            .await
    }

    async fn adjust_balance(
        &self,
        account_id: AccountId,
        delta: i64,
    ) -> Result<Account, LedgerStoreError> {
        self.mutate(account_id, move |account| account.with_balance_delta(delta))
            .await
    }

    async fn clear_balance(&self, account_id: AccountId) -> Result<Account, LedgerStoreError> {
        self.mutate(account_id, |account| {
            let mut next = account.clone();
            next.balance = 0;
            next
        })
        .await
    }

    async fn set_admin(
        &self,
        account_id: AccountId,
        is_admin: bool,
    ) -> Result<Account, LedgerStoreError> {
        self.mutate(account_id, move |account| {
            let mut next = account.clone();
            next.is_admin = is_admin;
            next
        })
        .await
    }
}
