//! Billed image generation pipeline.
//!
//! The domain owns the billing rules; adapters under [`outbound`] provide
//! PostgreSQL storage, an in-memory store, and the HTTP provider client.

pub mod domain;
pub mod outbound;
pub mod settings;
pub mod telemetry;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
