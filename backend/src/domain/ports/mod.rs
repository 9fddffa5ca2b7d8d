//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod generation_provider;
mod ledger_store;
mod outcome_log;
mod promo_store;
mod settlement_side_effects;
mod style_catalog;

#[cfg(test)]
pub use generation_provider::MockGenerationProvider;
pub use generation_provider::{FixtureGenerationProvider, GenerationProvider, ProviderError};
#[cfg(test)]
pub use ledger_store::MockLedgerStore;
pub use ledger_store::{LedgerStore, LedgerStoreError};
#[cfg(test)]
pub use outcome_log::MockOutcomeLog;
pub use outcome_log::{ChargedAppend, OutcomeLog, OutcomeLogError};
#[cfg(test)]
pub use promo_store::MockPromoStore;
pub use promo_store::{PromoStore, PromoStoreError};
#[cfg(test)]
pub use settlement_side_effects::MockSettlementSideEffects;
pub use settlement_side_effects::{
    NoOpSettlementSideEffects, SettlementSideEffects, SettlementSideEffectsError,
};
#[cfg(test)]
pub use style_catalog::MockStyleCatalog;
pub use style_catalog::{FixtureStyleCatalog, StyleCatalog, StyleCatalogError};
