//! Reqwest-backed generation provider adapter.
//!
//! This adapter owns transport details only: request serialisation, per-tier
//! timeouts, HTTP status classification, and decoding the returned image.
//! Every invocation builds its own client with idle pooling disabled, so no
//! connection outlives the attempt that opened it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::dto::{ErrorEnvelopeDto, GenerateRequestDto, GenerateResponseDto};
use crate::domain::ports::{GenerationProvider, ProviderError};
use crate::domain::{GeneratedImage, QualityTier, ReferenceImage};

const FINGERPRINT_BYTES: usize = 8;

/// Where and as whom to call the provider.
#[derive(Clone)]
pub struct ProviderEndpoint {
    /// Scheme and host, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Model name placed in the request path.
    pub model: String,
    /// Value of the `Authorization` header.
    pub api_key: String,
}

impl std::fmt::Debug for ProviderEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEndpoint")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &api_key_fingerprint(&self.api_key))
            .finish()
    }
}

/// Per-tier request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTimeouts {
    /// Timeout for [`QualityTier::High`].
    pub high: Duration,
    /// Timeout for [`QualityTier::Medium`].
    pub medium: Duration,
    /// Timeout for [`QualityTier::Low`].
    pub low: Duration,
}

impl TierTimeouts {
    /// Timeout applied to a call at `tier`.
    pub const fn for_tier(&self, tier: QualityTier) -> Duration {
        match tier {
            QualityTier::High => self.high,
            QualityTier::Medium => self.medium,
            QualityTier::Low => self.low,
        }
    }
}

impl Default for TierTimeouts {
    fn default() -> Self {
        Self {
            high: Duration::from_secs(120),
            medium: Duration::from_secs(90),
            low: Duration::from_secs(60),
        }
    }
}

/// Errors raised while building the adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderConfigError {
    /// The API key is blank.
    #[error("provider API key must not be empty")]
    MissingApiKey,
    /// The endpoint could not be parsed.
    #[error("invalid provider endpoint {url}: {message}")]
    InvalidEndpoint {
        /// Offending URL.
        url: String,
        /// Parser message.
        message: String,
    },
}

/// Generation provider speaking the `generateContent` JSON protocol.
pub struct HttpGenerationProvider {
    endpoint: Url,
    api_key: String,
    timeouts: TierTimeouts,
}

impl HttpGenerationProvider {
    /// Build an adapter for `endpoint`.
    ///
    /// ```rust,ignore
    /// let provider = HttpGenerationProvider::new(endpoint, TierTimeouts::default())?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ProviderConfigError`] when the key is blank or the URL is
    /// malformed.
    pub fn new(endpoint: ProviderEndpoint, timeouts: TierTimeouts) -> Result<Self, ProviderConfigError> {
        if endpoint.api_key.trim().is_empty() {
            return Err(ProviderConfigError::MissingApiKey);
        }
        let raw = format!(
            "{}/v1beta/models/{}:generateContent",
            endpoint.base_url.trim_end_matches('/'),
            endpoint.model.trim(),
        );
        let url = Url::parse(&raw).map_err(|error| ProviderConfigError::InvalidEndpoint {
            url: raw.clone(),
            message: error.to_string(),
        })?;
        debug!(
            endpoint = %url,
            key_fingerprint = %api_key_fingerprint(&endpoint.api_key),
            "generation provider configured"
        );
        Ok(Self {
            endpoint: url,
            api_key: endpoint.api_key,
            timeouts,
        })
    }

    /// Resolved request URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn session(&self, tier: QualityTier) -> Result<Client, ProviderError> {
        Client::builder()
            .timeout(self.timeouts.for_tier(tier))
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|error| ProviderError::network(format!("build HTTP client: {error}")))
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn invoke(
        &self,
        prompt: &str,
        images: &[ReferenceImage],
        tier: QualityTier,
    ) -> Result<GeneratedImage, ProviderError> {
        let client = self.session(tier)?;
        let request = GenerateRequestDto::new(prompt, images, tier);
        let response = client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, self.api_key.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "*/*")
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            let error = map_status_error(status, retry_after, body.as_ref());
            warn!(status = status.as_u16(), tier = %tier, error = %error, "provider returned error status");
            return Err(error);
        }

        parse_image(body.as_ref(), tier)
    }
}

fn parse_image(body: &[u8], tier: QualityTier) -> Result<GeneratedImage, ProviderError> {
    let decoded: GenerateResponseDto = serde_json::from_slice(body).map_err(|error| {
        ProviderError::bad_request(format!("invalid provider JSON payload: {error}"))
    })?;
    decoded
        .into_generated_image(tier)
        .map_err(ProviderError::bad_request)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::timeout(error.to_string())
    } else {
        ProviderError::network(error.to_string())
    }
}

fn map_status_error(status: StatusCode, retry_after: Option<Duration>, body: &[u8]) -> ProviderError {
    let body_preview = body_preview(body);
    let message = if body_preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), body_preview)
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(message, retry_after),
        StatusCode::FORBIDDEN if ErrorEnvelopeDto::parse(body).is_quota_event() => {
            ProviderError::rate_limited(message, retry_after)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::unauthorized(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::timeout(message),
        _ if status.is_server_error() => ProviderError::overloaded(message),
        _ => ProviderError::bad_request(message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

/// Truncated SHA-256 of the key, safe to log.
fn api_key_fingerprint(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(digest.as_slice().get(..FINGERPRINT_BYTES).unwrap_or_default())
}
