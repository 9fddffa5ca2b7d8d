//! Retry delay computation.

use std::time::Duration;

use super::BackoffJitter;

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the second attempt.
    pub initial: Duration,
    /// Upper bound for every delay, hints and jitter included.
    pub max: Duration,
    /// Growth factor per attempt; values below 1 behave as 1.
    pub multiplier: u32,
}

impl BackoffPolicy {
    /// `min(max, initial * multiplier^(attempt - 1))`, saturating.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(exponent);
        let base_ms = u64::try_from(self.initial.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
    }

    /// Delay to wait after failed `attempt`.
    ///
    /// A provider `hint` replaces the computed delay for this attempt only.
    /// The result never exceeds `max`.
    pub fn delay(&self, attempt: u32, hint: Option<Duration>, jitter: &dyn BackoffJitter) -> Duration {
        match hint {
            Some(hint) => hint.min(self.max),
            None => jitter
                .jittered_delay(self.base_delay(attempt), attempt)
                .min(self.max),
        }
    }
}
