//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. Conversions into domain types are fallible
//! because the database stores signed integers and text labels; a failed
//! conversion means a row violated a domain invariant.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountStats, FailureKind, GenerationOutcome, OutcomeRecord,
    OutcomeStatus, PromoCode, PromoCodeValue, QualityTier, Style, StyleId,
};

use super::schema::{
    account_stats, accounts, generation_outcomes, promo_codes, promo_redemptions, styles,
};

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Row struct for reading from the accounts table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AccountRow {
    pub id: i64,
    pub credits: i32,
    pub balance: i64,
    pub is_admin: bool,
}

impl TryFrom<AccountRow> for Account {
    type Error = String;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: AccountId::new(row.id),
            credits: u32::try_from(row.credits)
                .map_err(|_| format!("account {} has negative credits", row.id))?,
            balance: u64::try_from(row.balance)
                .map_err(|_| format!("account {} has negative balance", row.id))?,
            is_admin: row.is_admin,
        })
    }
}

/// Changeset written back after a locked read-modify-write.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = accounts)]
pub(crate) struct AccountUpdate {
    pub credits: i32,
    pub balance: i64,
    pub is_admin: bool,
    pub updated_at: DateTime<Utc>,
}

impl AccountUpdate {
    pub(crate) fn from_account(account: &Account, now: DateTime<Utc>) -> Result<Self, String> {
        Ok(Self {
            credits: i32::try_from(account.credits)
                .map_err(|_| format!("credits for account {} exceed storage range", account.id))?,
            balance: i64::try_from(account.balance)
                .map_err(|_| format!("balance for account {} exceeds storage range", account.id))?,
            is_admin: account.is_admin,
            updated_at: now,
        })
    }
}

// ---------------------------------------------------------------------------
// Account statistics
// ---------------------------------------------------------------------------

/// Row struct for reading from the account_stats table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = account_stats)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AccountStatsRow {
    pub account_id: i64,
    pub spent_amount: i64,
    pub generations_succeeded: i64,
    pub generations_failed: i64,
    pub last_generation_at: Option<DateTime<Utc>>,
}

impl TryFrom<AccountStatsRow> for AccountStats {
    type Error = String;

    fn try_from(row: AccountStatsRow) -> Result<Self, Self::Error> {
        let non_negative = |value: i64, column: &str| {
            u64::try_from(value)
                .map_err(|_| format!("account_stats.{column} is negative for {}", row.account_id))
        };
        Ok(Self {
            account_id: AccountId::new(row.account_id),
            spent_amount: non_negative(row.spent_amount, "spent_amount")?,
            generations_succeeded: non_negative(row.generations_succeeded, "generations_succeeded")?,
            generations_failed: non_negative(row.generations_failed, "generations_failed")?,
            last_generation_at: row.last_generation_at,
        })
    }
}

/// Insertable seed for the per-outcome stats upsert.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = account_stats)]
pub(crate) struct NewAccountStatsRow {
    pub account_id: i64,
    pub spent_amount: i64,
    pub generations_succeeded: i64,
    pub generations_failed: i64,
    pub last_generation_at: Option<DateTime<Utc>>,
}

impl NewAccountStatsRow {
    /// Increment carried by one outcome.
    pub(crate) fn for_outcome(row: &NewOutcomeRow<'_>) -> Self {
        let succeeded = i64::from(row.status == OutcomeStatus::Success.as_str());
        Self {
            account_id: row.account_id,
            spent_amount: row.charged_amount,
            generations_succeeded: succeeded,
            generations_failed: 1 - succeeded,
            last_generation_at: Some(row.created_at),
        }
    }
}

// ---------------------------------------------------------------------------
// Styles
// ---------------------------------------------------------------------------

/// Row struct for reading from the styles table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = styles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct StyleRow {
    pub id: i64,
    pub title: String,
    pub prompt: Option<String>,
    pub is_active: bool,
}

impl From<StyleRow> for Style {
    fn from(row: StyleRow) -> Self {
        Self {
            id: StyleId::new(row.id),
            title: row.title,
            prompt: row.prompt,
            is_active: row.is_active,
        }
    }
}

// ---------------------------------------------------------------------------
// Generation outcomes
// ---------------------------------------------------------------------------

/// Row struct for reading from the generation_outcomes table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = generation_outcomes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct OutcomeRow {
    pub id: i64,
    pub request_id: Uuid,
    pub account_id: i64,
    pub style_id: i64,
    pub style_title: String,
    pub status: String,
    pub failure_kind: Option<String>,
    pub charged_amount: i64,
    pub charged_credits: i32,
    pub provider: String,
    pub quality_tier: String,
    pub attempts: i32,
    pub error_message: Option<String>,
    pub input_photo_count: i32,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<OutcomeRow> for GenerationOutcome {
    type Error = String;

    fn try_from(row: OutcomeRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let counter = |value: i32, column: &str| {
            u32::try_from(value).map_err(|_| format!("outcome {id} has negative {column}"))
        };
        let record = OutcomeRecord {
            request_id: row.request_id,
            account_id: AccountId::new(row.account_id),
            style_id: StyleId::new(row.style_id),
            style_title: row.style_title,
            status: row.status.parse::<OutcomeStatus>()?,
            failure_kind: row
                .failure_kind
                .as_deref()
                .map(str::parse::<FailureKind>)
                .transpose()?,
            charged_amount: u64::try_from(row.charged_amount)
                .map_err(|_| format!("outcome {id} has negative charged_amount"))?,
            charged_credits: counter(row.charged_credits, "charged_credits")?,
            provider: row.provider,
            quality_tier: row
                .quality_tier
                .parse::<QualityTier>()
                .map_err(|error| error.to_string())?,
            attempts: counter(row.attempts, "attempts")?,
            error_message: row.error_message,
            input_photo_count: counter(row.input_photo_count, "input_photo_count")?,
            created_at: row.created_at,
        };
        Ok(Self { id, record })
    }
}

/// Insertable struct for appending an outcome.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = generation_outcomes)]
pub(crate) struct NewOutcomeRow<'a> {
    pub request_id: Uuid,
    pub account_id: i64,
    pub style_id: i64,
    pub style_title: &'a str,
    pub status: &'static str,
    pub failure_kind: Option<&'static str>,
    pub charged_amount: i64,
    pub charged_credits: i32,
    pub provider: &'a str,
    pub quality_tier: &'static str,
    pub attempts: i32,
    pub error_message: Option<&'a str>,
    pub input_photo_count: i32,
    pub created_at: DateTime<Utc>,
}

impl<'a> NewOutcomeRow<'a> {
    pub(crate) fn from_record(record: &'a OutcomeRecord) -> Result<Self, String> {
        let counter = |value: u32, column: &str| {
            i32::try_from(value).map_err(|_| format!("{column} exceeds storage range"))
        };
        Ok(Self {
            request_id: record.request_id,
            account_id: record.account_id.as_i64(),
            style_id: record.style_id.as_i64(),
            style_title: record.style_title.as_str(),
            status: record.status.as_str(),
            failure_kind: record.failure_kind.map(FailureKind::as_str),
            charged_amount: i64::try_from(record.charged_amount)
                .map_err(|_| "charged_amount exceeds storage range".to_owned())?,
            charged_credits: counter(record.charged_credits, "charged_credits")?,
            provider: record.provider.as_str(),
            quality_tier: record.quality_tier.as_str(),
            attempts: counter(record.attempts, "attempts")?,
            error_message: record.error_message.as_deref(),
            input_photo_count: counter(record.input_photo_count, "input_photo_count")?,
            created_at: record.created_at,
        })
    }
}

/// One `GROUP BY status` row of the outcome report.
#[derive(Debug, Clone, QueryableByName)]
pub(crate) struct OutcomeTotalsRow {
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub status: String,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub outcomes: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub charged_amount: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub charged_credits: i64,
}

// ---------------------------------------------------------------------------
// Promo codes
// ---------------------------------------------------------------------------

/// Row struct for reading from the promo_codes table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = promo_codes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct PromoCodeRow {
    pub id: i64,
    pub code: String,
    pub granted_generations: i32,
    pub remaining_uses: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PromoCodeRow> for PromoCode {
    type Error = String;

    fn try_from(row: PromoCodeRow) -> Result<Self, Self::Error> {
        let id = row.id;
        Ok(Self {
            id,
            code: PromoCodeValue::try_from(row.code).map_err(|error| error.to_string())?,
            granted_generations: u32::try_from(row.granted_generations)
                .map_err(|_| format!("promo code {id} has negative granted_generations"))?,
            remaining_uses: u32::try_from(row.remaining_uses)
                .map_err(|_| format!("promo code {id} has negative remaining_uses"))?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Insertable struct for creating promo codes.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = promo_codes)]
pub(crate) struct NewPromoCodeRow<'a> {
    pub code: &'a str,
    pub granted_generations: i32,
    pub remaining_uses: i32,
    pub is_active: bool,
}

/// Insertable struct for recording a redemption.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = promo_redemptions)]
pub(crate) struct NewPromoRedemptionRow {
    pub promo_code_id: i64,
    pub account_id: i64,
    pub granted_amount: i64,
    pub redeemed_at: DateTime<Utc>,
}
