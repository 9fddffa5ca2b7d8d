//! Domain primitives, services, and ports for billed image generation.
//!
//! Purpose: own the billing rules (charge only after success, exactly one
//! outcome per request, fail-closed spending) independently of storage and
//! transport. Adapters live in [`crate::outbound`].
//!
//! Public surface:
//! - Error (alias to `error::Error`): caller-facing error payload.
//! - ErrorCode (alias to `error::ErrorCode`): stable error identifier.
//! - GenerationService: the caller boundary.
//! - GenerationOrchestrator, SettlementCoordinator, EligibilityGate: the
//!   pipeline stages.
//! - PromoService, AccountAdminService, ReportingService: operator surfaces.

pub mod account;
pub mod account_admin_service;
pub mod eligibility;
pub mod error;
pub mod generation;
pub mod generation_orchestrator;
pub mod generation_service;
pub mod outcome;
pub mod ports;
pub mod promo;
pub mod promo_service;
pub mod reporting_service;
pub mod settlement;
pub mod style;

pub use self::account::{Account, AccountId, Charge, SpendDecision};
pub use self::account_admin_service::AccountAdminService;
pub use self::eligibility::{Eligibility, EligibilityGate, can_afford};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::generation::{
    DEFAULT_MEDIA_TYPE, GeneratedImage, ParseQualityTierError, QualityTier, ReferenceImage,
    build_prompt,
};
pub use self::generation_orchestrator::{
    AttemptOutcome, BackoffJitter, BackoffPolicy, GenerationJob, GenerationLimiter,
    GenerationOrchestrator, GenerationOrchestratorConfig, GenerationPermit, LimiterClosed,
    OrchestrationResult, OrchestratorRuntime, RetrySleeper, TokioSleeper, UniformJitter,
};
pub use self::generation_service::{
    GenerationService, GenerationServiceConfig, GenerationServicePorts,
};
pub use self::outcome::{
    AccountStats, FailureKind, GenerationOutcome, MAX_ERROR_DETAIL_CHARS, OutcomeRecord, OutcomeReport,
    OutcomeStatus, truncate_error_detail,
};
pub use self::promo::{
    NewPromoCode, PROMO_CODE_MAX_CHARS, PromoCode, PromoCodeValue, PromoPolicy,
    PromoRedemptionOutcome, PromoValidationError,
};
pub use self::promo_service::PromoService;
pub use self::reporting_service::{MAX_REPORT_DAYS, ReportingService};
pub use self::settlement::{
    GENERIC_FAILURE_MESSAGE, Settlement, SettlementCoordinator, SettlementTicket,
};
pub use self::style::{Style, StyleId};

/// Convenient domain result alias.
///
/// # Examples
/// ```
/// use photoshoot_backend::domain::{DomainResult, Error};
///
/// fn refuse() -> DomainResult<()> {
///     Err(Error::insufficient_funds("top up first"))
/// }
/// assert!(refuse().is_err());
/// ```
pub type DomainResult<T> = Result<T, Error>;
