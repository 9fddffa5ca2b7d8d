//! Catalogue styles as seen by the generation pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Catalogue style identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleId(i64);

impl StyleId {
    /// Wrap a raw identifier.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Access the raw identifier.
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for StyleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only projection of a catalogue style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    /// Style identity.
    pub id: StyleId,
    /// Display title, also used by the default prompt template.
    pub title: String,
    /// Optional custom provider prompt.
    pub prompt: Option<String>,
    /// Inactive styles cannot be requested.
    pub is_active: bool,
}
