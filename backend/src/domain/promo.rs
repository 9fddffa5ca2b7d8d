//! Promotional code model and redemption outcomes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a normalised promo code.
pub const PROMO_CODE_MAX_CHARS: usize = 128;

/// Validation errors for promo code input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromoValidationError {
    /// The code was blank after trimming.
    #[error("promo code must not be empty")]
    EmptyCode,
    /// The code exceeded [`PROMO_CODE_MAX_CHARS`].
    #[error("promo code must be at most {max} characters")]
    CodeTooLong {
        /// Allowed maximum.
        max: usize,
    },
    /// A code must grant at least one generation.
    #[error("promo code must grant at least one generation")]
    ZeroGrant,
    /// A code must be redeemable at least once.
    #[error("promo code must allow at least one redemption")]
    ZeroUses,
}

/// Trimmed, upper-cased promo code text.
///
/// # Examples
/// ```
/// use photoshoot_backend::domain::PromoCodeValue;
///
/// let code = PromoCodeValue::parse("  spring-24 ").expect("valid code");
/// assert_eq!(code.as_ref(), "SPRING-24");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromoCodeValue(String);

impl PromoCodeValue {
    /// Normalise and validate raw user input.
    pub fn parse(raw: &str) -> Result<Self, PromoValidationError> {
        let normalised = raw.trim().to_uppercase();
        if normalised.is_empty() {
            return Err(PromoValidationError::EmptyCode);
        }
        if normalised.chars().count() > PROMO_CODE_MAX_CHARS {
            return Err(PromoValidationError::CodeTooLong {
                max: PROMO_CODE_MAX_CHARS,
            });
        }
        Ok(Self(normalised))
    }
}

impl AsRef<str> for PromoCodeValue {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for PromoCodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<PromoCodeValue> for String {
    fn from(value: PromoCodeValue) -> Self {
        value.0
    }
}

impl TryFrom<String> for PromoCodeValue {
    type Error = PromoValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// Stored promo code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Storage identifier.
    pub id: i64,
    /// Normalised code text.
    pub code: PromoCodeValue,
    /// Generations granted per redemption.
    pub granted_generations: u32,
    /// Redemptions left before the code is exhausted.
    pub remaining_uses: u32,
    /// Inactive codes cannot be redeemed.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl PromoCode {
    /// Balance granted by one redemption at `price`, if the code is usable.
    ///
    /// Returns `None` when the code is inactive, has no remaining uses, or
    /// would grant nothing.
    pub fn redeemable_grant(&self, price: u64) -> Option<u64> {
        if !self.is_active || self.remaining_uses == 0 || self.granted_generations == 0 {
            return None;
        }
        let grant = price.saturating_mul(u64::from(self.granted_generations));
        (grant > 0).then_some(grant)
    }

    /// Remaining uses and active flag after one redemption under `policy`.
    pub fn after_redemption(&self, policy: PromoPolicy) -> (u32, bool) {
        match policy {
            PromoPolicy::SingleUse => (0, false),
            PromoPolicy::Counted => {
                let remaining = self.remaining_uses.saturating_sub(1);
                (remaining, remaining > 0)
            }
        }
    }
}

/// Validated input for creating a promo code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPromoCode {
    /// Normalised code text.
    pub code: PromoCodeValue,
    /// Generations granted per redemption.
    pub granted_generations: u32,
    /// Redemptions allowed in total.
    pub remaining_uses: u32,
}

impl NewPromoCode {
    /// Validate creation input.
    pub fn try_new(
        raw_code: &str,
        granted_generations: u32,
        remaining_uses: u32,
    ) -> Result<Self, PromoValidationError> {
        let code = PromoCodeValue::parse(raw_code)?;
        if granted_generations == 0 {
            return Err(PromoValidationError::ZeroGrant);
        }
        if remaining_uses == 0 {
            return Err(PromoValidationError::ZeroUses);
        }
        Ok(Self {
            code,
            granted_generations,
            remaining_uses,
        })
    }
}

/// What happens to a code after a successful redemption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromoPolicy {
    /// Deactivate after the first redemption.
    #[default]
    SingleUse,
    /// Decrement remaining uses; deactivate at zero.
    Counted,
}

impl FromStr for PromoPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single_use" => Ok(Self::SingleUse),
            "counted" => Ok(Self::Counted),
            other => Err(format!("unknown promo policy: {other}")),
        }
    }
}

/// Result of redeeming a promo code for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromoRedemptionOutcome {
    /// Balance was credited.
    Redeemed {
        /// Balance minor units granted.
        granted: u64,
        /// Generations the grant corresponds to.
        generations: u32,
    },
    /// This account already redeemed this code.
    AlreadyUsed,
    /// Unknown, inactive, or exhausted code.
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn code() -> PromoCode {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        PromoCode {
            id: 1,
            code: PromoCodeValue::parse("WELCOME").expect("valid"),
            granted_generations: 2,
            remaining_uses: 3,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[rstest]
    #[case::blank("   ", PromoValidationError::EmptyCode)]
    #[case::too_long(&"a".repeat(129), PromoValidationError::CodeTooLong { max: 128 })]
    fn parse_rejects_invalid_codes(#[case] raw: &str, #[case] expected: PromoValidationError) {
        assert_eq!(PromoCodeValue::parse(raw), Err(expected));
    }

    #[rstest]
    fn parse_accepts_code_at_length_limit() {
        let code = PromoCodeValue::parse(&"b".repeat(128)).expect("valid");
        assert_eq!(code.as_ref().len(), 128);
    }

    #[rstest]
    fn new_code_rejects_zero_grant_and_uses() {
        assert_eq!(
            NewPromoCode::try_new("X", 0, 1),
            Err(PromoValidationError::ZeroGrant)
        );
        assert_eq!(
            NewPromoCode::try_new("X", 1, 0),
            Err(PromoValidationError::ZeroUses)
        );
    }

    #[rstest]
    fn grant_scales_with_price(code: PromoCode) {
        assert_eq!(code.redeemable_grant(50), Some(100));
        assert_eq!(code.redeemable_grant(0), None);
    }

    #[rstest]
    fn inactive_or_exhausted_codes_grant_nothing(mut code: PromoCode) {
        code.is_active = false;
        assert_eq!(code.redeemable_grant(50), None);
        code.is_active = true;
        code.remaining_uses = 0;
        assert_eq!(code.redeemable_grant(50), None);
    }

    #[rstest]
    fn policies_update_code_state(code: PromoCode) {
        assert_eq!(code.after_redemption(PromoPolicy::SingleUse), (0, false));
        assert_eq!(code.after_redemption(PromoPolicy::Counted), (2, true));

        let last = PromoCode {
            remaining_uses: 1,
            ..code
        };
        assert_eq!(last.after_redemption(PromoPolicy::Counted), (0, false));
    }

    #[rstest]
    #[case("single-use", PromoPolicy::SingleUse)]
    #[case("COUNTED", PromoPolicy::Counted)]
    fn policy_parses_labels(#[case] raw: &str, #[case] expected: PromoPolicy) {
        assert_eq!(raw.parse::<PromoPolicy>(), Ok(expected));
    }
}
