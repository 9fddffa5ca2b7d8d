//! Port for work triggered after a successful, paid generation.
//!
//! Typical adapters replace the account's stored reference photo or notify a
//! front end. Failures are logged by the caller and never undo settlement.

use async_trait::async_trait;

use crate::domain::{GeneratedImage, GenerationOutcome, ReferenceImage};

use super::define_port_error;

define_port_error! {
    /// Errors raised by post-settlement side effects.
    pub enum SettlementSideEffectsError {
        /// The side effect could not complete.
        Failed { message: String } => "settlement side effect failed: {message}",
    }
}

/// Port for post-success side effects.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementSideEffects: Send + Sync {
    /// Run side effects for a delivered image.
    async fn after_success(
        &self,
        outcome: &GenerationOutcome,
        image: &GeneratedImage,
        references: &[ReferenceImage],
    ) -> Result<(), SettlementSideEffectsError>;
}

/// Side-effect adapter that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSettlementSideEffects;

#[async_trait]
impl SettlementSideEffects for NoOpSettlementSideEffects {
    async fn after_success(
        &self,
        _outcome: &GenerationOutcome,
        _image: &GeneratedImage,
        _references: &[ReferenceImage],
    ) -> Result<(), SettlementSideEffectsError> {
        Ok(())
    }
}
