//! Append-only generation outcome records.
//!
//! One [`OutcomeRecord`] is written per top-level generation request, never per
//! provider retry. The log is the source of truth for billing reconciliation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Charge, QualityTier, StyleId};

/// Maximum stored length, in characters, of a failure detail.
pub const MAX_ERROR_DETAIL_CHARS: usize = 512;

/// Terminal status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// An image was delivered and (unless admin) paid for.
    Success,
    /// Nothing was delivered and nothing was charged.
    Failure,
}

/// Why a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient provider errors persisted until the attempt ceiling.
    ProviderExhausted,
    /// The provider returned a terminal error.
    ProviderRejected,
    /// Generation succeeded but the settlement charge was declined; the image
    /// was discarded.
    ChargeDeclined,
}

macro_rules! label_enum {
    ($ty:ident { $($variant:ident => $label:literal),* $(,)? }) => {
        impl $ty {
            /// Stable lowercase label used in storage.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)*
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($label => Ok(Self::$variant),)*
                    other => Err(format!("unknown {}: {other}", stringify!($ty))),
                }
            }
        }
    };
}

label_enum!(OutcomeStatus {
    Success => "success",
    Failure => "failure",
});

label_enum!(FailureKind {
    ProviderExhausted => "provider_exhausted",
    ProviderRejected => "provider_rejected",
    ChargeDeclined => "charge_declined",
});

/// Outcome fields written by settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Correlates the record with request logs.
    pub request_id: Uuid,
    /// Account the request belongs to.
    pub account_id: AccountId,
    /// Requested style.
    pub style_id: StyleId,
    /// Style title at request time.
    pub style_title: String,
    /// Terminal status.
    pub status: OutcomeStatus,
    /// Failure classification; `None` on success.
    pub failure_kind: Option<FailureKind>,
    /// Balance minor units charged; 0 for admins and failures.
    pub charged_amount: u64,
    /// Credits consumed; 0 or 1.
    pub charged_credits: u32,
    /// Provider label.
    pub provider: String,
    /// Tier of the final attempt.
    pub quality_tier: QualityTier,
    /// Provider attempts used.
    pub attempts: u32,
    /// Failure detail, truncated to [`MAX_ERROR_DETAIL_CHARS`].
    pub error_message: Option<String>,
    /// Number of input photos sent to the provider.
    pub input_photo_count: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl OutcomeRecord {
    /// Fill the charged columns from a committed charge.
    #[must_use]
    pub fn with_charge(mut self, charge: Charge) -> Self {
        self.charged_amount = charge.amount();
        self.charged_credits = charge.credits();
        self
    }
}

/// Persisted outcome with its storage identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    /// Storage identifier.
    pub id: i64,
    /// Recorded fields.
    pub record: OutcomeRecord,
}

/// Aggregated outcome totals for a reporting window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeReport {
    /// Number of requests.
    pub total: u64,
    /// Successful requests.
    pub succeeded: u64,
    /// Failed requests.
    pub failed: u64,
    /// Balance minor units charged.
    pub charged_amount: u64,
    /// Credits consumed.
    pub charged_credits: u64,
}

impl OutcomeReport {
    /// Fold one outcome into the totals.
    pub fn add(&mut self, status: OutcomeStatus, charged_amount: u64, charged_credits: u32) {
        self.add_group(status, 1, charged_amount, u64::from(charged_credits));
    }

    /// Fold pre-aggregated totals for `outcomes` records sharing one status.
    pub fn add_group(
        &mut self,
        status: OutcomeStatus,
        outcomes: u64,
        charged_amount: u64,
        charged_credits: u64,
    ) {
        self.total = self.total.saturating_add(outcomes);
        match status {
            OutcomeStatus::Success => self.succeeded = self.succeeded.saturating_add(outcomes),
            OutcomeStatus::Failure => self.failed = self.failed.saturating_add(outcomes),
        }
        self.charged_amount = self.charged_amount.saturating_add(charged_amount);
        self.charged_credits = self.charged_credits.saturating_add(charged_credits);
    }
}

/// Per-account running totals, rolled forward with every outcome append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStats {
    /// Owning account.
    pub account_id: AccountId,
    /// Balance minor units charged in total.
    pub spent_amount: u64,
    /// Successful generations.
    pub generations_succeeded: u64,
    /// Failed generations.
    pub generations_failed: u64,
    /// Timestamp of the most recent outcome.
    pub last_generation_at: Option<DateTime<Utc>>,
}

impl AccountStats {
    /// Totals for an account with no outcomes yet.
    pub const fn empty(account_id: AccountId) -> Self {
        Self {
            account_id,
            spent_amount: 0,
            generations_succeeded: 0,
            generations_failed: 0,
            last_generation_at: None,
        }
    }

    /// Roll the totals forward by one outcome.
    pub fn record(&mut self, record: &OutcomeRecord) {
        self.spent_amount = self.spent_amount.saturating_add(record.charged_amount);
        match record.status {
            OutcomeStatus::Success => {
                self.generations_succeeded = self.generations_succeeded.saturating_add(1);
            }
            OutcomeStatus::Failure => {
                self.generations_failed = self.generations_failed.saturating_add(1);
            }
        }
        self.last_generation_at = Some(
            self.last_generation_at
                .map_or(record.created_at, |last| last.max(record.created_at)),
        );
    }
}

/// Truncate a failure detail to the stored limit on a character boundary.
///
/// # Examples
/// ```
/// use photoshoot_backend::domain::{truncate_error_detail, MAX_ERROR_DETAIL_CHARS};
///
/// let long = "x".repeat(600);
/// assert_eq!(truncate_error_detail(&long).chars().count(), MAX_ERROR_DETAIL_CHARS);
/// ```
pub fn truncate_error_detail(detail: &str) -> String {
    detail.chars().take(MAX_ERROR_DETAIL_CHARS).collect()
}
