//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate with
//! `diesel print-schema` after changing a migration, then restore the doc
//! comments.

diesel::table! {
    /// Billable accounts keyed by external identity.
    accounts (id) {
        /// External account identifier.
        id -> Int8,
        /// Pre-paid generations; never negative.
        credits -> Int4,
        /// Cash-equivalent minor units; never negative.
        balance -> Int8,
        /// Administrative accounts are never charged.
        is_admin -> Bool,
        /// Record creation timestamp.
        created_at -> Timestamptz,
        /// Last modification timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Running per-account totals maintained alongside outcome appends.
    account_stats (account_id) {
        /// Owning account.
        account_id -> Int8,
        /// Balance minor units charged in total.
        spent_amount -> Int8,
        /// Successful generations.
        generations_succeeded -> Int8,
        /// Failed generations.
        generations_failed -> Int8,
        /// Timestamp of the most recent outcome.
        last_generation_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Read-only style catalogue.
    styles (id) {
        /// Primary key.
        id -> Int8,
        /// Display title, also used by the default prompt.
        title -> Varchar,
        /// Optional custom prompt.
        prompt -> Nullable<Text>,
        /// Inactive styles cannot be requested.
        is_active -> Bool,
        /// Record creation timestamp.
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only log with one row per generation request.
    generation_outcomes (id) {
        /// Primary key.
        id -> Int8,
        /// Unique per top-level request.
        request_id -> Uuid,
        /// Requesting account.
        account_id -> Int8,
        /// Requested style.
        style_id -> Int8,
        /// Style title at request time.
        style_title -> Varchar,
        /// `success` or `failure`.
        status -> Text,
        /// Failure classification; null on success.
        failure_kind -> Nullable<Text>,
        /// Balance minor units charged.
        charged_amount -> Int8,
        /// Credits charged (0 or 1).
        charged_credits -> Int4,
        /// Provider label.
        provider -> Text,
        /// Tier of the final attempt.
        quality_tier -> Text,
        /// Provider invocations used.
        attempts -> Int4,
        /// Truncated failure detail.
        error_message -> Nullable<Varchar>,
        /// Reference photos sent.
        input_photo_count -> Int4,
        /// Record creation timestamp.
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Promo code inventory.
    promo_codes (id) {
        /// Primary key.
        id -> Int8,
        /// Normalised (trimmed, upper-cased) code text.
        code -> Varchar,
        /// Generations granted per redemption.
        granted_generations -> Int4,
        /// Remaining redemptions.
        remaining_uses -> Int4,
        /// Whether the code can be redeemed.
        is_active -> Bool,
        /// Record creation timestamp.
        created_at -> Timestamptz,
        /// Last modification timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// One row per (code, account) redemption; `uq_promo_redemption` guards pairs.
    promo_redemptions (id) {
        /// Primary key.
        id -> Int8,
        /// Redeemed code.
        promo_code_id -> Int8,
        /// Redeeming account.
        account_id -> Int8,
        /// Balance minor units granted.
        granted_amount -> Int8,
        /// Redemption timestamp.
        redeemed_at -> Timestamptz,
    }
}

diesel::joinable!(account_stats -> accounts (account_id));
diesel::joinable!(promo_redemptions -> promo_codes (promo_code_id));
diesel::joinable!(promo_redemptions -> accounts (account_id));

diesel::allow_tables_to_appear_in_same_query!(
    accounts,
    account_stats,
    generation_outcomes,
    promo_codes,
    promo_redemptions,
    styles,
);
