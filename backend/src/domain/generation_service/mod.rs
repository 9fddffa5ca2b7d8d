//! Caller-facing generation use case.
//!
//! Resolves the style, runs the eligibility gate, orchestrates provider
//! attempts, and settles. Provider and storage detail never reaches the
//! caller; it lives in the outcome log and tracing output.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::ports::{StyleCatalog, StyleCatalogError};
use crate::domain::{
    AccountId, EligibilityGate, Error, GeneratedImage, GenerationJob, GenerationOrchestrator,
    ReferenceImage, Settlement, SettlementCoordinator, SettlementTicket, Style, StyleId,
    build_prompt,
};

/// Pricing and input limits for generation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationServiceConfig {
    /// Price of one generation in balance minor units.
    pub price: u64,
    /// Reference images beyond this count are dropped.
    pub max_reference_images: usize,
}

impl Default for GenerationServiceConfig {
    fn default() -> Self {
        Self {
            price: 50,
            max_reference_images: 4,
        }
    }
}

/// Collaborators of [`GenerationService`].
pub struct GenerationServicePorts {
    /// Style lookup.
    pub styles: Arc<dyn StyleCatalog>,
    /// Advisory affordability check.
    pub gate: EligibilityGate,
    /// Retry orchestration.
    pub orchestrator: Arc<GenerationOrchestrator>,
    /// Charging and outcome logging.
    pub settlement: SettlementCoordinator,
}

/// Entry point for billed generation requests.
pub struct GenerationService {
    styles: Arc<dyn StyleCatalog>,
    gate: EligibilityGate,
    orchestrator: Arc<GenerationOrchestrator>,
    settlement: SettlementCoordinator,
    config: GenerationServiceConfig,
}

impl GenerationService {
    /// Build the service.
    pub fn new(ports: GenerationServicePorts, config: GenerationServiceConfig) -> Self {
        Self {
            styles: ports.styles,
            gate: ports.gate,
            orchestrator: ports.orchestrator,
            settlement: ports.settlement,
            config,
        }
    }

    /// Generate an image and return it, or a caller-safe error.
    ///
    /// # Errors
    ///
    /// See [`GenerationService::generate`]; a discarded image maps to
    /// `InsufficientFunds` and any provider failure to a generic
    /// `ServiceUnavailable`.
    pub async fn request_generation(
        &self,
        account_id: AccountId,
        style_id: StyleId,
        images: Vec<ReferenceImage>,
    ) -> Result<GeneratedImage, Error> {
        self.generate(account_id, style_id, images)
            .await?
            .into_delivery()
    }

    /// Run one request through gate, orchestrator, and settlement.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` when `images` is empty.
    /// - `NotFound` when the style is unknown or inactive.
    /// - `InsufficientFunds` when the gate refuses; nothing is recorded.
    /// - `ServiceUnavailable` or `InternalError` for storage failures.
    pub async fn generate(
        &self,
        account_id: AccountId,
        style_id: StyleId,
        mut images: Vec<ReferenceImage>,
    ) -> Result<Settlement, Error> {
        if images.is_empty() {
            return Err(Error::invalid_request("at least one reference image is required"));
        }
        images.truncate(self.config.max_reference_images.max(1));

        let style = self.resolve_style(style_id).await?;
        let eligibility = self.gate.check(account_id, self.config.price).await?;
        if !eligibility.affordable {
            debug!(account_id = %account_id, "generation refused by eligibility gate");
            return Err(Error::insufficient_funds(
                "insufficient credits or balance to start a generation",
            ));
        }

        let request_id = Uuid::new_v4();
        info!(
            request_id = %request_id,
            account_id = %account_id,
            style_id = %style_id,
            images = images.len(),
            "generation requested"
        );

        let job = GenerationJob {
            request_id,
            prompt: build_prompt(&style.title, style.prompt.as_deref()),
            images,
        };
        let result = self.orchestrator.orchestrate(&job).await?;

        let ticket = SettlementTicket {
            request_id,
            account: eligibility.account,
            style,
            price: self.config.price,
            references: job.images,
        };
        self.settlement.settle(&ticket, result).await
    }

    async fn resolve_style(&self, style_id: StyleId) -> Result<Style, Error> {
        let style = self
            .styles
            .find_style(style_id)
            .await
            .map_err(map_style_error)?;
        match style {
            Some(style) if style.is_active => Ok(style),
            _ => Err(Error::not_found(format!("style {style_id} not found"))),
        }
    }
}

fn map_style_error(error: StyleCatalogError) -> Error {
    match error {
        StyleCatalogError::Connection { message } => {
            Error::service_unavailable(format!("style catalogue unavailable: {message}"))
        }
        StyleCatalogError::Query { message } => {
            Error::internal(format!("style catalogue error: {message}"))
        }
    }
}

#[cfg(test)]
mod tests;
