//! Generation provider outbound adapters.
//!
//! This module provides a thin HTTP implementation of the
//! `GenerationProvider` port.

mod dto;
mod http_provider;

pub use http_provider::{HttpGenerationProvider, ProviderConfigError, ProviderEndpoint, TierTimeouts};
