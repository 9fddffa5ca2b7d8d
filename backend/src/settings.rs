//! Pipeline configuration loaded via OrthoConfig.
//!
//! Numeric settings carry their defaults in the derive; string settings stay
//! optional and accessors fill them in. [`PipelineSettings::runtime`]
//! validates the result before any service is built.

use std::env;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{
    GenerationOrchestratorConfig, GenerationServiceConfig, PromoPolicy, QualityTier,
};
use crate::outbound::provider::{ProviderEndpoint, TierTimeouts};

const DEFAULT_PROVIDER_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_PROVIDER_MODEL: &str = "gemini-3-pro-image-preview";
const DEFAULT_PROVIDER_LABEL: &str = "gemini";

/// Raised when loaded settings cannot produce a runnable pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// A value is outside its accepted range or does not parse.
    #[error("invalid setting {field}: {message}")]
    Invalid {
        /// Setting name without the environment prefix.
        field: &'static str,
        /// Why the value was rejected.
        message: String,
    },
    /// A required value is absent.
    #[error("missing setting {field}")]
    Missing {
        /// Setting name without the environment prefix.
        field: &'static str,
    },
}

impl SettingsError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Configuration for the generation pipeline and its adapters.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PHOTOSHOOT")]
pub struct PipelineSettings {
    /// PostgreSQL connection URL; `DATABASE_URL` is consulted when unset.
    pub database_url: Option<String>,
    /// Provider API root.
    pub provider_base_url: Option<String>,
    /// Provider model name.
    pub provider_model: Option<String>,
    /// Provider credential.
    pub provider_api_key: Option<String>,
    /// Label written to every outcome record.
    pub provider_label: Option<String>,
    /// Price of one generation in balance minor units.
    #[ortho_config(default = 50)]
    pub price: u64,
    /// Provider attempts per request.
    #[ortho_config(default = 6)]
    pub max_attempts: u32,
    /// First retry delay in milliseconds.
    #[ortho_config(default = 1_000)]
    pub initial_backoff_ms: u64,
    /// Retry delay ceiling in milliseconds.
    #[ortho_config(default = 30_000)]
    pub max_backoff_ms: u64,
    /// Exponential backoff factor.
    #[ortho_config(default = 2)]
    pub backoff_multiplier: u32,
    /// Process-wide cap on in-flight orchestration sequences.
    #[ortho_config(default = 3)]
    pub max_concurrent_generations: usize,
    /// Request timeout for `High` attempts.
    #[ortho_config(default = 120)]
    pub high_timeout_secs: u64,
    /// Request timeout for `Medium` attempts.
    #[ortho_config(default = 90)]
    pub medium_timeout_secs: u64,
    /// Request timeout for `Low` attempts.
    #[ortho_config(default = 60)]
    pub low_timeout_secs: u64,
    /// Tier of the first attempt (`high`, `medium`, `low`).
    pub initial_tier: Option<String>,
    /// Reference images beyond this count are dropped.
    #[ortho_config(default = 4)]
    pub max_reference_images: usize,
    /// `single_use` or `counted`.
    pub promo_policy: Option<String>,
}

/// Validated runtime configuration derived from [`PipelineSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Retry and degradation settings.
    pub orchestrator: GenerationOrchestratorConfig,
    /// Price and input limits.
    pub service: GenerationServiceConfig,
    /// Per-tier provider timeouts.
    pub timeouts: TierTimeouts,
    /// Limiter capacity.
    pub max_concurrent_generations: usize,
    /// Promo redemption policy.
    pub promo_policy: PromoPolicy,
    /// Provider label for outcome records.
    pub provider_label: String,
}

impl PipelineSettings {
    /// First retry delay.
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Retry delay ceiling.
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Provider API root.
    pub fn provider_base_url(&self) -> &str {
        self.provider_base_url
            .as_deref()
            .unwrap_or(DEFAULT_PROVIDER_BASE_URL)
    }

    /// Provider model name.
    pub fn provider_model(&self) -> &str {
        self.provider_model.as_deref().unwrap_or(DEFAULT_PROVIDER_MODEL)
    }

    /// Provider label for outcome records.
    pub fn provider_label(&self) -> &str {
        self.provider_label.as_deref().unwrap_or(DEFAULT_PROVIDER_LABEL)
    }

    /// Per-tier request timeouts.
    pub const fn timeouts(&self) -> TierTimeouts {
        TierTimeouts {
            high: Duration::from_secs(self.high_timeout_secs),
            medium: Duration::from_secs(self.medium_timeout_secs),
            low: Duration::from_secs(self.low_timeout_secs),
        }
    }

    /// Tier of the first attempt.
    ///
    /// # Errors
    ///
    /// [`SettingsError::Invalid`] for an unknown label.
    pub fn initial_tier(&self) -> Result<QualityTier, SettingsError> {
        self.initial_tier.as_deref().map_or(Ok(QualityTier::High), |raw| {
            raw.parse()
                .map_err(|err: crate::domain::ParseQualityTierError| {
                    SettingsError::invalid("initial_tier", err.to_string())
                })
        })
    }

    /// Promo redemption policy.
    ///
    /// # Errors
    ///
    /// [`SettingsError::Invalid`] for an unknown policy name.
    pub fn promo_policy(&self) -> Result<PromoPolicy, SettingsError> {
        self.promo_policy
            .as_deref()
            .map_or(Ok(PromoPolicy::default()), |raw| {
                raw.parse()
                    .map_err(|message: String| SettingsError::invalid("promo_policy", message))
            })
    }

    /// Database URL from settings, then `DATABASE_URL`.
    ///
    /// # Errors
    ///
    /// [`SettingsError::Missing`] when neither source is set, and
    /// [`SettingsError::Invalid`] when the chosen value is blank.
    pub fn database_url(&self) -> Result<String, SettingsError> {
        let value = match &self.database_url {
            Some(value) => value.clone(),
            None => env::var("DATABASE_URL")
                .map_err(|_| SettingsError::Missing {
                    field: "database_url",
                })?,
        };
        if value.trim().is_empty() {
            return Err(SettingsError::invalid("database_url", "must not be empty"));
        }
        Ok(value)
    }

    /// Provider endpoint including the credential.
    ///
    /// # Errors
    ///
    /// [`SettingsError::Missing`] when no API key is configured.
    pub fn provider_endpoint(&self) -> Result<ProviderEndpoint, SettingsError> {
        let api_key = self
            .provider_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(SettingsError::Missing {
                field: "provider_api_key",
            })?;
        Ok(ProviderEndpoint {
            base_url: self.provider_base_url().to_owned(),
            model: self.provider_model().to_owned(),
            api_key: api_key.to_owned(),
        })
    }

    /// Validate ranges and build the runtime configuration.
    ///
    /// # Errors
    ///
    /// [`SettingsError::Invalid`] naming the first offending field.
    pub fn runtime(&self) -> Result<PipelineConfig, SettingsError> {
        let price = self.price;
        if price == 0 {
            return Err(SettingsError::invalid("price", "must be positive"));
        }
        if i64::try_from(price).is_err() {
            return Err(SettingsError::invalid("price", "exceeds the ledger range"));
        }
        let max_attempts = self.max_attempts;
        if max_attempts == 0 {
            return Err(SettingsError::invalid("max_attempts", "must be at least 1"));
        }
        let (initial_backoff, max_backoff) = (self.initial_backoff(), self.max_backoff());
        if initial_backoff > max_backoff {
            return Err(SettingsError::invalid(
                "initial_backoff_ms",
                "must not exceed max_backoff_ms",
            ));
        }
        let backoff_multiplier = self.backoff_multiplier;
        if backoff_multiplier == 0 {
            return Err(SettingsError::invalid("backoff_multiplier", "must be at least 1"));
        }
        let max_concurrent_generations = self.max_concurrent_generations;
        if max_concurrent_generations == 0 {
            return Err(SettingsError::invalid(
                "max_concurrent_generations",
                "must be at least 1",
            ));
        }
        let max_reference_images = self.max_reference_images;
        if max_reference_images == 0 {
            return Err(SettingsError::invalid("max_reference_images", "must be at least 1"));
        }
        let timeouts = self.timeouts();
        for (field, timeout) in [
            ("high_timeout_secs", timeouts.high),
            ("medium_timeout_secs", timeouts.medium),
            ("low_timeout_secs", timeouts.low),
        ] {
            if timeout.is_zero() {
                return Err(SettingsError::invalid(field, "must be positive"));
            }
        }
        let provider_label = self.provider_label().trim();
        if provider_label.is_empty() {
            return Err(SettingsError::invalid("provider_label", "must not be empty"));
        }

        Ok(PipelineConfig {
            orchestrator: GenerationOrchestratorConfig {
                max_attempts,
                initial_backoff,
                max_backoff,
                backoff_multiplier,
                initial_tier: self.initial_tier()?,
            },
            service: GenerationServiceConfig {
                price,
                max_reference_images,
            },
            timeouts,
            max_concurrent_generations,
            promo_policy: self.promo_policy()?,
            provider_label: provider_label.to_owned(),
        })
    }
}
