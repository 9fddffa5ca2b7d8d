//! Driven port for the external image-generation provider.
//!
//! The domain owns the error taxonomy so retry orchestration can classify
//! failures without knowing anything about HTTP.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{GeneratedImage, QualityTier, ReferenceImage};

use super::define_port_error;

define_port_error! {
    /// Classified provider failures.
    pub enum ProviderError {
        /// HTTP 429 or a provider-declared quota event.
        RateLimited { message: String, retry_after: Option<Duration> } =>
            "provider rate limited request: {message}",
        /// The provider reported a server-side failure.
        Overloaded { message: String } =>
            "provider overloaded: {message}",
        /// Credentials were rejected; never retried.
        Unauthorized { message: String } =>
            "provider rejected credentials: {message}",
        /// The request or the provider's answer was unusable; never retried.
        BadRequest { message: String } =>
            "provider rejected request: {message}",
        /// The call exceeded its timeout.
        Timeout { message: String } =>
            "provider call timed out: {message}",
        /// Transport failed before a response arrived.
        Network { message: String } =>
            "provider transport failed: {message}",
    }
}

impl ProviderError {
    /// Return whether retrying this error is expected to help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Overloaded { .. } | Self::Timeout { .. } | Self::Network { .. }
        )
    }

    /// Provider-supplied delay hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Port for invoking the generation provider once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Run one generation attempt.
    ///
    /// Implementations must not reuse transport sessions across calls and must
    /// treat a successful response without an image as
    /// [`ProviderError::BadRequest`].
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use photoshoot_backend::domain::{QualityTier, ReferenceImage};
    /// use photoshoot_backend::domain::ports::{FixtureGenerationProvider, GenerationProvider};
    ///
    /// let provider = FixtureGenerationProvider;
    /// let image = provider
    ///     .invoke("prompt", &[ReferenceImage::new(vec![1], None)], QualityTier::High)
    ///     .await?;
    /// assert_eq!(image.tier, QualityTier::High);
    /// # Ok::<(), photoshoot_backend::domain::ports::ProviderError>(())
    /// ```
    async fn invoke(
        &self,
        prompt: &str,
        images: &[ReferenceImage],
        tier: QualityTier,
    ) -> Result<GeneratedImage, ProviderError>;
}

/// Fixture implementation echoing the first reference image back.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureGenerationProvider;

#[async_trait]
impl GenerationProvider for FixtureGenerationProvider {
    async fn invoke(
        &self,
        _prompt: &str,
        images: &[ReferenceImage],
        tier: QualityTier,
    ) -> Result<GeneratedImage, ProviderError> {
        let first = images
            .first()
            .ok_or_else(|| ProviderError::bad_request("no reference image supplied"))?;
        Ok(GeneratedImage {
            bytes: first.bytes.clone(),
            media_type: first.media_type.clone(),
            tier,
        })
    }
}
