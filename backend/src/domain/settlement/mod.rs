//! Settlement of a finished orchestration sequence.
//!
//! Charges only after provider success, writes exactly one outcome record per
//! request, and withholds the image when the authoritative charge is declined.

use std::sync::Arc;

use mockable::Clock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::ports::{
    ChargedAppend, OutcomeLog, OutcomeLogError, ProviderError, SettlementSideEffects,
};
use crate::domain::{
    Account, Charge, Error, FailureKind, GeneratedImage, GenerationOutcome, OrchestrationResult,
    OutcomeRecord, OutcomeStatus, QualityTier, ReferenceImage, Style, truncate_error_detail,
};

/// User-facing message for any failed generation.
pub const GENERIC_FAILURE_MESSAGE: &str = "generation failed, please try again later";

const CHARGE_DECLINED_DETAIL: &str = "charge declined at settlement: insufficient credits or balance";

/// Everything settlement needs to know about the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementTicket {
    /// Correlates the outcome with request logs.
    pub request_id: Uuid,
    /// Account snapshot taken by the eligibility gate.
    pub account: Account,
    /// Requested style.
    pub style: Style,
    /// Price of one generation in balance minor units.
    pub price: u64,
    /// Reference images sent to the provider.
    pub references: Vec<ReferenceImage>,
}

/// Settled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Paid (or waived) and recorded; the image goes to the caller.
    Delivered {
        /// Generated image.
        image: GeneratedImage,
        /// Success outcome.
        outcome: GenerationOutcome,
        /// What was taken from the account.
        charge: Charge,
    },
    /// The provider succeeded but the charge was declined; the image was
    /// dropped.
    Discarded {
        /// `ChargeDeclined` failure outcome.
        outcome: GenerationOutcome,
    },
    /// The orchestrator gave up.
    Failed {
        /// Provider failure outcome.
        outcome: GenerationOutcome,
    },
}

impl Settlement {
    /// The single outcome written for this request.
    pub fn outcome(&self) -> &GenerationOutcome {
        match self {
            Self::Delivered { outcome, .. }
            | Self::Discarded { outcome }
            | Self::Failed { outcome } => outcome,
        }
    }

    /// Convert into what the caller receives.
    ///
    /// # Errors
    ///
    /// [`crate::domain::ErrorCode::InsufficientFunds`] for a discarded image,
    /// [`crate::domain::ErrorCode::ServiceUnavailable`] with
    /// [`GENERIC_FAILURE_MESSAGE`] for provider failures.
    pub fn into_delivery(self) -> Result<GeneratedImage, Error> {
        match self {
            Self::Delivered { image, .. } => Ok(image),
            Self::Discarded { .. } => Err(Error::insufficient_funds(
                "insufficient credits or balance to pay for the generation",
            )),
            Self::Failed { .. } => Err(Error::service_unavailable(GENERIC_FAILURE_MESSAGE)),
        }
    }
}

/// Turns orchestration results into charges and outcome records.
#[derive(Clone)]
pub struct SettlementCoordinator {
    outcome_log: Arc<dyn OutcomeLog>,
    side_effects: Arc<dyn SettlementSideEffects>,
    clock: Arc<dyn Clock>,
    provider_label: String,
}

impl SettlementCoordinator {
    /// Build a coordinator.
    pub fn new(
        outcome_log: Arc<dyn OutcomeLog>,
        side_effects: Arc<dyn SettlementSideEffects>,
        clock: Arc<dyn Clock>,
        provider_label: impl Into<String>,
    ) -> Self {
        Self {
            outcome_log,
            side_effects,
            clock,
            provider_label: provider_label.into(),
        }
    }

    /// Settle one request.
    ///
    /// # Errors
    ///
    /// Returns [`crate::domain::ErrorCode::ServiceUnavailable`] when the
    /// outcome cannot be written. A declined charge or provider failure is a
    /// successful settlement and is reported through [`Settlement`].
    pub async fn settle(
        &self,
        ticket: &SettlementTicket,
        result: OrchestrationResult,
    ) -> Result<Settlement, Error> {
        match result {
            OrchestrationResult::Success { image, attempts } => {
                self.settle_success(ticket, image, attempts).await
            }
            OrchestrationResult::Exhausted {
                attempts,
                tier,
                last_error,
            } => self.settle_exhausted(ticket, attempts, tier, &last_error).await,
        }
    }

    async fn settle_success(
        &self,
        ticket: &SettlementTicket,
        image: GeneratedImage,
        attempts: u32,
    ) -> Result<Settlement, Error> {
        let record = self.record(ticket, OutcomeStatus::Success, None, image.tier, attempts, None);

        let (outcome, charge) = if ticket.account.is_admin {
            let outcome = self
                .outcome_log
                .append(&record.with_charge(Charge::Waived))
                .await
                .map_err(|err| map_outcome_log_error(ticket.request_id, err))?;
            (outcome, Charge::Waived)
        } else {
            let appended = self
                .outcome_log
                .append_with_charge(ticket.account.id, ticket.price, &record)
                .await
                .map_err(|err| map_outcome_log_error(ticket.request_id, err))?;
            match appended {
                ChargedAppend::Recorded { outcome, charge } => (outcome, charge),
                ChargedAppend::Declined => {
                    return self.settle_declined(ticket, image.tier, attempts).await;
                }
            }
        };

        info!(
            request_id = %ticket.request_id,
            account_id = %ticket.account.id,
            outcome_id = outcome.id,
            charged_amount = charge.amount(),
            charged_credits = charge.credits(),
            "generation settled"
        );

        if let Err(err) = self
            .side_effects
            .after_success(&outcome, &image, &ticket.references)
            .await
        {
            warn!(
                request_id = %ticket.request_id,
                outcome_id = outcome.id,
                error = %err,
                "post-settlement side effect failed"
            );
        }

        Ok(Settlement::Delivered {
            image,
            outcome,
            charge,
        })
    }

    async fn settle_declined(
        &self,
        ticket: &SettlementTicket,
        tier: QualityTier,
        attempts: u32,
    ) -> Result<Settlement, Error> {
        let record = self.record(
            ticket,
            OutcomeStatus::Failure,
            Some(FailureKind::ChargeDeclined),
            tier,
            attempts,
            Some(CHARGE_DECLINED_DETAIL.to_owned()),
        );
        let outcome = self
            .outcome_log
            .append(&record)
            .await
            .map_err(|err| map_outcome_log_error(ticket.request_id, err))?;
        warn!(
            request_id = %ticket.request_id,
            account_id = %ticket.account.id,
            outcome_id = outcome.id,
            "charge declined at settlement, image discarded"
        );
        Ok(Settlement::Discarded { outcome })
    }

    async fn settle_exhausted(
        &self,
        ticket: &SettlementTicket,
        attempts: u32,
        tier: QualityTier,
        last_error: &ProviderError,
    ) -> Result<Settlement, Error> {
        let kind = if last_error.is_retryable() {
            FailureKind::ProviderExhausted
        } else {
            FailureKind::ProviderRejected
        };
        let record = self.record(
            ticket,
            OutcomeStatus::Failure,
            Some(kind),
            tier,
            attempts,
            Some(truncate_error_detail(&last_error.to_string())),
        );
        let outcome = self
            .outcome_log
            .append(&record)
            .await
            .map_err(|err| map_outcome_log_error(ticket.request_id, err))?;
        warn!(
            request_id = %ticket.request_id,
            account_id = %ticket.account.id,
            outcome_id = outcome.id,
            failure_kind = %kind,
            attempts,
            "generation failed without charge"
        );
        Ok(Settlement::Failed { outcome })
    }

    fn record(
        &self,
        ticket: &SettlementTicket,
        status: OutcomeStatus,
        failure_kind: Option<FailureKind>,
        quality_tier: QualityTier,
        attempts: u32,
        error_message: Option<String>,
    ) -> OutcomeRecord {
        OutcomeRecord {
            request_id: ticket.request_id,
            account_id: ticket.account.id,
            style_id: ticket.style.id,
            style_title: ticket.style.title.clone(),
            status,
            failure_kind,
            charged_amount: 0,
            charged_credits: 0,
            provider: self.provider_label.clone(),
            quality_tier,
            attempts,
            error_message,
            input_photo_count: u32::try_from(ticket.references.len()).unwrap_or(u32::MAX),
            created_at: self.clock.utc(),
        }
    }
}

fn map_outcome_log_error(request_id: Uuid, err: OutcomeLogError) -> Error {
    error!(request_id = %request_id, error = %err, "outcome write failed");
    Error::service_unavailable("generation outcome could not be recorded")
}
