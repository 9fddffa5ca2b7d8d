//! Runtime collaborators for the orchestrator: admission limiter, sleeper,
//! and jitter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{BackoffJitter, RetrySleeper};

/// Error returned when acquiring from a closed limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("generation limiter is closed")]
pub struct LimiterClosed;

/// Bounded global admission for orchestration sequences.
///
/// Build one at process start and share clones; every clone draws from the
/// same permits. A capacity of zero is accepted so tests can force contention.
#[derive(Debug, Clone)]
pub struct GenerationLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl GenerationLimiter {
    /// Build a limiter admitting `capacity` concurrent sequences.
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a slot. The slot is released when the permit drops.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterClosed`] once [`GenerationLimiter::close`] was called.
    pub async fn acquire(&self) -> Result<GenerationPermit, LimiterClosed> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map(GenerationPermit)
            .map_err(|_| LimiterClosed)
    }

    /// Refuse new admissions; waiters fail with [`LimiterClosed`].
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Held slot in a [`GenerationLimiter`].
#[must_use = "dropping the permit releases the slot immediately"]
#[derive(Debug)]
pub struct GenerationPermit(OwnedSemaphorePermit);

/// Runtime helpers used by retry policy.
pub struct OrchestratorRuntime {
    /// Async sleep implementation.
    pub sleeper: Arc<dyn RetrySleeper>,
    /// Jitter strategy for retry delays.
    pub jitter: Arc<dyn BackoffJitter>,
}

impl Default for OrchestratorRuntime {
    fn default() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(UniformJitter),
        }
    }
}

/// Tokio-based sleeper implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl RetrySleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Adds a uniform random extra of up to 25% of the base delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformJitter;

impl BackoffJitter for UniformJitter {
    fn jittered_delay(&self, base: Duration, _attempt: u32) -> Duration {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let max_extra = base_ms / 4;
        let extra = if max_extra == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max_extra)
        };
        Duration::from_millis(base_ms.saturating_add(extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn uniform_jitter_stays_within_quarter_of_base() {
        let base = Duration::from_millis(400);
        for attempt in 1..=200 {
            let delay = UniformJitter.jittered_delay(base, attempt);
            assert!(delay >= base);
            assert!(delay <= Duration::from_millis(500));
        }
    }

    #[rstest]
    fn uniform_jitter_keeps_tiny_delays() {
        assert_eq!(
            UniformJitter.jittered_delay(Duration::from_millis(3), 1),
            Duration::from_millis(3)
        );
    }

    #[tokio::test]
    async fn permits_release_on_drop() {
        let limiter = GenerationLimiter::new(2);
        let first = limiter.acquire().await.expect("first permit");
        let shared = limiter.clone();
        let _second = shared.acquire().await.expect("second permit");
        assert_eq!(limiter.available(), 0);
        drop(first);
        assert_eq!(limiter.available(), 1);
        assert_eq!(limiter.capacity(), 2);
    }

    #[tokio::test]
    async fn closed_limiter_refuses_admission() {
        let limiter = GenerationLimiter::new(1);
        limiter.close();
        assert_eq!(limiter.acquire().await.err(), Some(LimiterClosed));
    }
}
