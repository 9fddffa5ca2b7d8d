//! Retry orchestration for a single generation request.
//!
//! The orchestrator owns admission (one global limiter slot for the whole
//! sequence), retry policy (jittered exponential backoff with provider hints),
//! and quality degradation. It never touches the ledger; settlement consumes
//! the [`OrchestrationResult`] afterwards.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::ports::{GenerationProvider, ProviderError};
use crate::domain::{Error, GeneratedImage, QualityTier, ReferenceImage};

mod attempt;
mod backoff;
mod runtime;

pub use attempt::AttemptOutcome;
pub use backoff::BackoffPolicy;
pub use runtime::{
    GenerationLimiter, GenerationPermit, LimiterClosed, OrchestratorRuntime, TokioSleeper,
    UniformJitter,
};

/// Retry and degradation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOrchestratorConfig {
    /// Maximum provider attempts per request, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Cap for every retry delay.
    pub max_backoff: Duration,
    /// Exponential growth factor.
    pub backoff_multiplier: u32,
    /// Tier used by the first attempt of every request.
    pub initial_tier: QualityTier,
}

impl Default for GenerationOrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2,
            initial_tier: QualityTier::High,
        }
    }
}

impl GenerationOrchestratorConfig {
    /// Backoff parameters derived from this configuration.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: self.initial_backoff,
            max: self.max_backoff,
            multiplier: self.backoff_multiplier,
        }
    }
}

/// Input for one orchestration sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationJob {
    /// Correlates log lines for the request.
    pub request_id: Uuid,
    /// Final prompt text.
    pub prompt: String,
    /// Reference images, already capped.
    pub images: Vec<ReferenceImage>,
}

/// How an orchestration sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationResult {
    /// The provider produced an image.
    Success {
        /// Generated image; `image.tier` is the tier of the winning attempt.
        image: GeneratedImage,
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// Attempts ran out or a terminal error stopped the sequence.
    Exhausted {
        /// Attempts used.
        attempts: u32,
        /// Tier of the final attempt.
        tier: QualityTier,
        /// Error from the final attempt.
        last_error: ProviderError,
    },
}

impl OrchestrationResult {
    /// Attempts used by the sequence.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Tier of the final attempt.
    pub fn tier(&self) -> QualityTier {
        match self {
            Self::Success { image, .. } => image.tier,
            Self::Exhausted { tier, .. } => *tier,
        }
    }
}

/// Async sleeping abstraction for retry delays.
#[async_trait]
pub trait RetrySleeper: Send + Sync {
    /// Suspend execution for `duration`.
    ///
    /// ```rust,no_run
    /// use async_trait::async_trait;
    /// use photoshoot_backend::domain::RetrySleeper;
    /// use std::sync::Mutex;
    /// use std::time::Duration;
    ///
    /// #[derive(Default)]
    /// struct CountingSleeper {
    ///     calls: Mutex<u32>,
    /// }
    ///
    /// #[async_trait]
    /// impl RetrySleeper for CountingSleeper {
    ///     async fn sleep(&self, _duration: Duration) {
    ///         *self.calls.lock().expect("calls mutex") += 1;
    ///     }
    /// }
    /// ```
    async fn sleep(&self, duration: Duration);
}

/// Retry backoff jitter abstraction.
pub trait BackoffJitter: Send + Sync {
    /// Return a jittered delay from the exponential base delay.
    ///
    /// ```rust
    /// use photoshoot_backend::domain::BackoffJitter;
    /// use std::time::Duration;
    ///
    /// struct FixedJitter;
    /// impl BackoffJitter for FixedJitter {
    ///     fn jittered_delay(&self, base: Duration, attempt: u32) -> Duration {
    ///         base + Duration::from_millis(u64::from(attempt) * 5)
    ///     }
    /// }
    /// assert_eq!(
    ///     FixedJitter.jittered_delay(Duration::from_millis(100), 2),
    ///     Duration::from_millis(110)
    /// );
    /// ```
    fn jittered_delay(&self, base: Duration, attempt: u32) -> Duration;
}

/// Drives one request through bounded, degrading provider attempts.
pub struct GenerationOrchestrator {
    provider: Arc<dyn GenerationProvider>,
    limiter: GenerationLimiter,
    sleeper: Arc<dyn RetrySleeper>,
    jitter: Arc<dyn BackoffJitter>,
    config: GenerationOrchestratorConfig,
}

impl GenerationOrchestrator {
    /// Build an orchestrator using default runtime dependencies.
    /// ```rust,ignore
    /// let limiter = GenerationLimiter::new(3);
    /// let _orchestrator = GenerationOrchestrator::new(provider, limiter, config);
    /// ```
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        limiter: GenerationLimiter,
        config: GenerationOrchestratorConfig,
    ) -> Self {
        Self::with_runtime(provider, limiter, OrchestratorRuntime::default(), config)
    }

    /// Build an orchestrator with injected sleeper and jitter.
    pub fn with_runtime(
        provider: Arc<dyn GenerationProvider>,
        limiter: GenerationLimiter,
        runtime: OrchestratorRuntime,
        config: GenerationOrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            limiter,
            sleeper: runtime.sleeper,
            jitter: runtime.jitter,
            config,
        }
    }

    /// Configuration in effect.
    pub fn config(&self) -> &GenerationOrchestratorConfig {
        &self.config
    }

    /// Run attempts until success, a terminal error, or the attempt ceiling.
    ///
    /// The limiter slot is held from before the first attempt until the
    /// result is returned, backoff sleeps included. The tier starts at the
    /// configured initial tier and drops one step after every failed attempt.
    ///
    /// # Errors
    ///
    /// Returns [`crate::domain::ErrorCode::ServiceUnavailable`] when the
    /// limiter has been closed. Provider failures are reported through
    /// [`OrchestrationResult::Exhausted`], never as `Err`.
    pub async fn orchestrate(&self, job: &GenerationJob) -> Result<OrchestrationResult, Error> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| Error::service_unavailable("generation limiter is closed"))?;

        let max_attempts = self.config.max_attempts.max(1);
        let backoff = self.config.backoff();
        let mut tier = self.config.initial_tier;
        let mut attempt = 1;

        loop {
            let result = self.provider.invoke(&job.prompt, &job.images, tier).await;
            match AttemptOutcome::from(result) {
                AttemptOutcome::Success(image) => {
                    info!(
                        request_id = %job.request_id,
                        attempt,
                        tier = %tier,
                        "generation attempt succeeded"
                    );
                    return Ok(OrchestrationResult::Success {
                        image,
                        attempts: attempt,
                    });
                }
                AttemptOutcome::Terminal(error) => {
                    warn!(
                        request_id = %job.request_id,
                        attempt,
                        tier = %tier,
                        error = %error,
                        "generation attempt failed terminally"
                    );
                    return Ok(OrchestrationResult::Exhausted {
                        attempts: attempt,
                        tier,
                        last_error: error,
                    });
                }
                AttemptOutcome::Retryable(error) if attempt >= max_attempts => {
                    warn!(
                        request_id = %job.request_id,
                        attempt,
                        tier = %tier,
                        error = %error,
                        "generation attempts exhausted"
                    );
                    return Ok(OrchestrationResult::Exhausted {
                        attempts: attempt,
                        tier,
                        last_error: error,
                    });
                }
                AttemptOutcome::Retryable(error) => {
                    let delay = backoff.delay(attempt, error.retry_after(), self.jitter.as_ref());
                    let next_tier = tier.downgrade();
                    warn!(
                        request_id = %job.request_id,
                        attempt,
                        tier = %tier,
                        next_tier = %next_tier,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "generation attempt failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    tier = next_tier;
                    attempt += 1;
                }
            }
        }
    }
}
