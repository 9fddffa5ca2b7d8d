//! Generation payload types shared by the orchestrator, provider port, and
//! settlement.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Provider-selectable output fidelity.
///
/// Ordered from most to least expensive. The orchestrator only ever moves
/// towards [`QualityTier::Low`] within one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// 4K output.
    High,
    /// 2K output.
    Medium,
    /// 1K output.
    Low,
}

impl QualityTier {
    /// Next cheaper tier, or `self` when already lowest.
    ///
    /// # Examples
    /// ```
    /// use photoshoot_backend::domain::QualityTier;
    ///
    /// assert_eq!(QualityTier::High.downgrade(), QualityTier::Medium);
    /// assert_eq!(QualityTier::Low.downgrade(), QualityTier::Low);
    /// ```
    #[must_use]
    pub const fn downgrade(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    /// Whether no cheaper tier exists.
    pub const fn is_lowest(self) -> bool {
        matches!(self, Self::Low)
    }

    /// Image size token understood by the provider.
    pub const fn image_size(self) -> &'static str {
        match self {
            Self::High => "4K",
            Self::Medium => "2K",
            Self::Low => "1K",
        }
    }

    /// Stable lowercase label used in storage and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown tier label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown quality tier: {0}")]
pub struct ParseQualityTierError(String);

impl FromStr for QualityTier {
    type Err = ParseQualityTierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "4k" => Ok(Self::High),
            "medium" | "2k" => Ok(Self::Medium),
            "low" | "1k" => Ok(Self::Low),
            other => Err(ParseQualityTierError(other.to_owned())),
        }
    }
}

/// Media type assumed when neither caller nor provider names one.
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

/// Source photo supplied by the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    /// Raw encoded image bytes.
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`.
    pub media_type: String,
}

impl ReferenceImage {
    /// Build a reference image, defaulting the media type to JPEG.
    pub fn new(bytes: Vec<u8>, media_type: Option<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_owned()),
        }
    }
}

impl fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceImage")
            .field("len", &self.bytes.len())
            .field("media_type", &self.media_type)
            .finish()
    }
}

/// Decoded image returned by the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Raw encoded image bytes.
    pub bytes: Vec<u8>,
    /// MIME type reported by the provider.
    pub media_type: String,
    /// Tier the image was produced at.
    pub tier: QualityTier,
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("len", &self.bytes.len())
            .field("media_type", &self.media_type)
            .field("tier", &self.tier)
            .finish()
    }
}

/// Build the provider prompt for a style.
///
/// A non-blank custom prompt wins; otherwise a default template names the
/// style title.
///
/// # Examples
/// ```
/// use photoshoot_backend::domain::build_prompt;
///
/// assert_eq!(build_prompt("Noir", Some("black and white")), "black and white");
/// assert!(build_prompt("Noir", None).contains("\"Noir\""));
/// ```
pub fn build_prompt(style_title: &str, style_prompt: Option<&str>) -> String {
    match style_prompt.map(str::trim) {
        Some(custom) if !custom.is_empty() => custom.to_owned(),
        _ => format!(
            "Turn this selfie into a professional photoshoot.\n\
             Style: \"{style_title}\".\n\
             Keep the person's facial features; render lighting, background and \
             retouching in the given style, with no captions or logos, as a \
             high-quality realistic image."
        ),
    }
}

#[cfg(test)]
mod tests {
    //! Tier ordering and prompt construction.

    use super::*;
    use rstest::rstest;

    #[rstest]
    fn downgrade_walks_towards_lowest_and_stops() {
        let mut tier = QualityTier::High;
        let mut seen = vec![tier];
        for _ in 0..4 {
            tier = tier.downgrade();
            seen.push(tier);
        }
        assert_eq!(
            seen,
            vec![
                QualityTier::High,
                QualityTier::Medium,
                QualityTier::Low,
                QualityTier::Low,
                QualityTier::Low,
            ]
        );
        assert!(tier.is_lowest());
    }

    #[rstest]
    #[case::high(QualityTier::High, "4K")]
    #[case::medium(QualityTier::Medium, "2K")]
    #[case::low(QualityTier::Low, "1K")]
    fn tiers_map_to_provider_sizes(#[case] tier: QualityTier, #[case] size: &str) {
        assert_eq!(tier.image_size(), size);
        assert_eq!(tier.as_str().parse::<QualityTier>().expect("round trip"), tier);
        assert_eq!(size.parse::<QualityTier>().expect("size alias"), tier);
    }

    #[rstest]
    fn parse_rejects_unknown_tier() {
        assert!("ultra".parse::<QualityTier>().is_err());
    }

    #[rstest]
    #[case::blank(Some("   "))]
    #[case::missing(None)]
    fn prompt_falls_back_to_template(#[case] custom: Option<&str>) {
        let prompt = build_prompt("Film noir", custom);
        assert!(prompt.contains("Style: \"Film noir\""));
    }

    #[rstest]
    fn reference_image_defaults_to_jpeg() {
        let image = ReferenceImage::new(vec![1, 2, 3], None);
        assert_eq!(image.media_type, DEFAULT_MEDIA_TYPE);
        assert_eq!(format!("{image:?}"), "ReferenceImage { len: 3, media_type: \"image/jpeg\" }");
    }
}
