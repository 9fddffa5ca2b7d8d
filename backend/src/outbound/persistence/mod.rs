//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Concrete implementations of the ledger, outcome log, promo, and style
//! ports backed by PostgreSQL via `diesel-async` and `bb8` pooling.
//!
//! - **Thin adapters**: implementations translate between Diesel rows and
//!   domain types; spend and promo rules stay in the domain types they call.
//! - **Internal models**: row structs (`models.rs`) and table definitions
//!   (`schema.rs`) never leave this module.
//! - **One transaction per mutation**: every balance or credit change locks
//!   the account row for the duration of a single transaction.
//!
//! ```ignore
//! use photoshoot_backend::outbound::persistence::{DbPool, DieselLedgerStore, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/photoshoot")).await?;
//! let ledger = DieselLedgerStore::new(pool, Arc::new(DefaultClock));
//! ```

mod diesel_account_lock;
mod diesel_basic_error_mapping;
mod diesel_ledger_store;
mod diesel_outcome_log;
mod diesel_promo_store;
mod diesel_style_catalog;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_ledger_store::DieselLedgerStore;
pub use diesel_outcome_log::DieselOutcomeLog;
pub use diesel_promo_store::DieselPromoStore;
pub use diesel_style_catalog::DieselStyleCatalog;
pub use migrations::{MigrationError, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
