//! Read-only port onto the style catalogue.

use async_trait::async_trait;

use crate::domain::{Style, StyleId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by style catalogue adapters.
    pub enum StyleCatalogError {
        /// Store connection could not be established.
        Connection { message: String } => "style catalogue connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } => "style catalogue query failed: {message}",
    }
}

/// Port for resolving requested styles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StyleCatalog: Send + Sync {
    /// Load a style by id, active or not.
    async fn find_style(&self, style_id: StyleId) -> Result<Option<Style>, StyleCatalogError>;
}

/// Fixture catalogue holding a fixed list of styles.
#[derive(Debug, Clone, Default)]
pub struct FixtureStyleCatalog {
    styles: Vec<Style>,
}

impl FixtureStyleCatalog {
    /// Build a catalogue over `styles`.
    pub fn new(styles: Vec<Style>) -> Self {
        Self { styles }
    }
}

#[async_trait]
impl StyleCatalog for FixtureStyleCatalog {
    async fn find_style(&self, style_id: StyleId) -> Result<Option<Style>, StyleCatalogError> {
        Ok(self.styles.iter().find(|style| style.id == style_id).cloned())
    }
}
