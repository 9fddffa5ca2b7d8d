//! PostgreSQL-backed `PromoStore` implementation using Diesel ORM.
//!
//! Redemption locks the promo row before the account row. Keeping that order
//! everywhere prevents deadlocks between concurrent redemptions of one code.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::{AsyncConnection as _, AsyncPgConnection, RunQueryDsl};
use mockable::Clock;
use tracing::debug;

use crate::domain::ports::{PromoStore, PromoStoreError};
use crate::domain::{
    AccountId, NewPromoCode, PromoCode, PromoCodeValue, PromoPolicy, PromoRedemptionOutcome,
};

use super::diesel_account_lock::{lock_account, write_account};
use super::diesel_basic_error_mapping::{
    TxError, is_unique_violation, map_basic_diesel_error, map_basic_pool_error,
    map_basic_tx_error,
};
use super::models::{NewPromoCodeRow, NewPromoRedemptionRow, PromoCodeRow};
use super::pool::{DbPool, PoolError};
use super::schema::{promo_codes, promo_redemptions};

const REDEMPTION_CONSTRAINT: &str = "uq_promo_redemption";

/// Diesel-backed implementation of the `PromoStore` port.
#[derive(Clone)]
pub struct DieselPromoStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl DieselPromoStore {
    /// Create a new store with the given connection pool and clock.
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

fn map_pool_error(error: PoolError) -> PromoStoreError {
    map_basic_pool_error(error, PromoStoreError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> PromoStoreError {
    map_basic_diesel_error(error, PromoStoreError::query, PromoStoreError::connection)
}

fn map_tx_error(error: TxError) -> PromoStoreError {
    map_basic_tx_error(
        error,
        PromoStoreError::query,
        PromoStoreError::connection,
        PromoStoreError::corrupt,
    )
}

fn to_promo(row: PromoCodeRow) -> Result<PromoCode, PromoStoreError> {
    PromoCode::try_from(row).map_err(PromoStoreError::corrupt)
}

fn storage_int(value: u32, column: &str) -> Result<i32, PromoStoreError> {
    i32::try_from(value)
        .map_err(|_| PromoStoreError::query(format!("{column} exceeds storage range")))
}

async fn redeem_locked(
    conn: &mut AsyncPgConnection,
    account_id: AccountId,
    code: &PromoCodeValue,
    price: u64,
    policy: PromoPolicy,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<PromoRedemptionOutcome, TxError> {
    let row: Option<PromoCodeRow> = promo_codes::table
        .filter(promo_codes::code.eq(code.as_ref()))
        .select(PromoCodeRow::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?;
    let Some(row) = row else {
        return Ok(PromoRedemptionOutcome::Invalid);
    };
    let promo = PromoCode::try_from(row).map_err(TxError::Corrupt)?;
    let account = lock_account(conn, account_id, now).await?;

    let already_redeemed: bool = diesel::select(exists(
        promo_redemptions::table
            .filter(promo_redemptions::promo_code_id.eq(promo.id))
            .filter(promo_redemptions::account_id.eq(account_id.as_i64())),
    ))
    .get_result(conn)
    .await?;
    if already_redeemed {
        return Ok(PromoRedemptionOutcome::AlreadyUsed);
    }

    let Some(grant) = promo.redeemable_grant(price) else {
        return Ok(PromoRedemptionOutcome::Invalid);
    };
    let grant_delta = i64::try_from(grant)
        .map_err(|_| TxError::Corrupt(format!("grant for promo {} exceeds storage range", promo.id)))?;

    diesel::insert_into(promo_redemptions::table)
        .values(&NewPromoRedemptionRow {
            promo_code_id: promo.id,
            account_id: account_id.as_i64(),
            granted_amount: grant_delta,
            redeemed_at: now,
        })
        .execute(conn)
        .await?;
    write_account(conn, &account.with_balance_delta(grant_delta), now).await?;

    let (remaining_uses, is_active) = promo.after_redemption(policy);
    let remaining_uses = i32::try_from(remaining_uses)
        .map_err(|_| TxError::Corrupt(format!("promo {} remaining uses out of range", promo.id)))?;
    diesel::update(promo_codes::table.find(promo.id))
        .set((
            promo_codes::remaining_uses.eq(remaining_uses),
            promo_codes::is_active.eq(is_active),
            promo_codes::updated_at.eq(now),
        ))
        .execute(conn)
        .await?;

    Ok(PromoRedemptionOutcome::Redeemed {
        granted: grant,
        generations: promo.granted_generations,
    })
}

/// Translate the redemption transaction result, turning a lost race on the
/// `(code, account)` constraint into `AlreadyUsed`.
fn resolve_redemption(
    result: Result<PromoRedemptionOutcome, TxError>,
    account_id: AccountId,
    code: &PromoCodeValue,
) -> Result<PromoRedemptionOutcome, PromoStoreError> {
    match result {
        Ok(outcome) => Ok(outcome),
        Err(TxError::Diesel(error)) if is_unique_violation(&error, Some(REDEMPTION_CONSTRAINT)) => {
            debug!(account_id = %account_id, code = %code, "concurrent redemption lost the race");
            Ok(PromoRedemptionOutcome::AlreadyUsed)
        }
        Err(error) => Err(map_tx_error(error)),
    }
}

#[async_trait]
impl PromoStore for DieselPromoStore {
    async fn redeem(
        &self,
        account_id: AccountId,
        code: &PromoCodeValue,
        price: u64,
        policy: PromoPolicy,
    ) -> Result<PromoRedemptionOutcome, PromoStoreError> {
        let now = self.clock.utc();
        let mut pooled = self.pool.get().await.map_err(map_pool_error)?;
        let conn: &mut AsyncPgConnection = &mut pooled;
        let result = conn
            .transaction(|conn| {
                async move { redeem_locked(conn, account_id, code, price, policy, now).await }
                    .scope_boxed()
            })
            .await;
        resolve_redemption(result, account_id, code)
    }

    async fn create(&self, code: &NewPromoCode) -> Result<PromoCode, PromoStoreError> {
        let row = NewPromoCodeRow {
            code: code.code.as_ref(),
            granted_generations: storage_int(code.granted_generations, "granted_generations")?,
            remaining_uses: storage_int(code.remaining_uses, "remaining_uses")?,
            is_active: true,
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let stored = diesel::insert_into(promo_codes::table)
            .values(&row)
            .returning(PromoCodeRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|error| {
                if is_unique_violation(&error, None) {
                    PromoStoreError::duplicate_code(code.code.to_string())
                } else {
                    map_diesel_error(error)
                }
            })?;
        to_promo(stored)
    }

    async fn list(&self) -> Result<Vec<PromoCode>, PromoStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<PromoCodeRow> = promo_codes::table
            .select(PromoCodeRow::as_select())
            .order_by((promo_codes::created_at.desc(), promo_codes::id.desc()))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(to_promo).collect()
    }

    async fn find_by_code(
        &self,
        code: &PromoCodeValue,
    ) -> Result<Option<PromoCode>, PromoStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<PromoCodeRow> = promo_codes::table
            .filter(promo_codes::code.eq(code.as_ref()))
            .select(PromoCodeRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(to_promo).transpose()
    }

    async fn set_active(
        &self,
        id: i64,
        is_active: bool,
    ) -> Result<Option<PromoCode>, PromoStoreError> {
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<PromoCodeRow> = diesel::update(promo_codes::table.find(id))
            .set((
                promo_codes::is_active.eq(is_active),
                promo_codes::updated_at.eq(now),
            ))
            .returning(PromoCodeRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(to_promo).transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool, PromoStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(promo_codes::table.find(id))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(deleted > 0)
    }
}
