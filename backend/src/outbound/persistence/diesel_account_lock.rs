//! Locked read-modify-write helpers shared by every adapter that touches
//! account rows.
//!
//! All callers run inside a transaction. The account row is created on first
//! reference and then locked with `SELECT ... FOR UPDATE`, so concurrent
//! mutations of one account serialise on the row lock.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::domain::{Account, AccountId};

use super::diesel_basic_error_mapping::TxError;
use super::models::{AccountRow, AccountUpdate};
use super::schema::accounts;

/// Create the account if missing, then lock and load it.
pub(crate) async fn lock_account(
    conn: &mut AsyncPgConnection,
    account_id: AccountId,
    now: DateTime<Utc>,
) -> Result<Account, TxError> {
    diesel::insert_into(accounts::table)
        .values((
            accounts::id.eq(account_id.as_i64()),
            accounts::created_at.eq(now),
            accounts::updated_at.eq(now),
        ))
        .on_conflict(accounts::id)
        .do_nothing()
        .execute(conn)
        .await?;

    let row = accounts::table
        .find(account_id.as_i64())
        .select(AccountRow::as_select())
        .for_update()
        .first(conn)
        .await?;
    Account::try_from(row).map_err(TxError::Corrupt)
}

/// Persist `account` over its locked row and return the stored state.
pub(crate) async fn write_account(
    conn: &mut AsyncPgConnection,
    account: &Account,
    now: DateTime<Utc>,
) -> Result<Account, TxError> {
    let update = AccountUpdate::from_account(account, now).map_err(TxError::Corrupt)?;
    let row = diesel::update(accounts::table.find(account.id.as_i64()))
        .set(&update)
        .returning(AccountRow::as_returning())
        .get_result(conn)
        .await?;
    Account::try_from(row).map_err(TxError::Corrupt)
}
