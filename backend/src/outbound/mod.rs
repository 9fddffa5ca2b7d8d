//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL-backed ledger, outcome log, promo, and style
//!   stores using Diesel ORM
//! - **memory**: mutex-guarded in-process implementation of the same ports
//! - **provider**: reqwest-backed generation provider client
//!
//! Adapters are thin translators between domain types and infrastructure
//! representations. They contain no billing rules of their own.

pub mod memory;
pub mod persistence;
pub mod provider;
