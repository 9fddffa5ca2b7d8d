//! DTOs for the provider's `generateContent` wire format.
//!
//! Requests are serialised from borrowed data; responses decode into these
//! transport DTOs first and are mapped into a [`GeneratedImage`] in one pass.
//! The provider answers in camelCase but accepts and sometimes echoes
//! snake_case, so response fields accept both spellings.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_MEDIA_TYPE, GeneratedImage, QualityTier, ReferenceImage};

#[derive(Debug, Serialize)]
pub(super) struct GenerateRequestDto<'a> {
    pub(super) contents: [ContentDto<'a>; 1],
    #[serde(rename = "generationConfig")]
    pub(super) generation_config: GenerationConfigDto,
}

#[derive(Debug, Serialize)]
pub(super) struct ContentDto<'a> {
    pub(super) role: &'static str,
    pub(super) parts: Vec<RequestPartDto<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(super) enum RequestPartDto<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineDataDto<'a> },
}

#[derive(Debug, Serialize)]
pub(super) struct InlineDataDto<'a> {
    pub(super) mime_type: &'a str,
    pub(super) data: String,
}

#[derive(Debug, Serialize)]
pub(super) struct GenerationConfigDto {
    #[serde(rename = "responseModalities")]
    pub(super) response_modalities: [&'static str; 1],
    #[serde(rename = "imageConfig")]
    pub(super) image_config: ImageConfigDto,
}

#[derive(Debug, Serialize)]
pub(super) struct ImageConfigDto {
    #[serde(rename = "imageSize")]
    pub(super) image_size: &'static str,
}

impl<'a> GenerateRequestDto<'a> {
    pub(super) fn new(prompt: &'a str, images: &'a [ReferenceImage], tier: QualityTier) -> Self {
        let mut parts = Vec::with_capacity(images.len() + 1);
        parts.push(RequestPartDto::Text { text: prompt });
        parts.extend(images.iter().map(|image| RequestPartDto::InlineData {
            inline_data: InlineDataDto {
                mime_type: image.media_type.as_str(),
                data: STANDARD.encode(&image.bytes),
            },
        }));
        Self {
            contents: [ContentDto {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfigDto {
                response_modalities: ["IMAGE"],
                image_config: ImageConfigDto {
                    image_size: tier.image_size(),
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct GenerateResponseDto {
    #[serde(default)]
    pub(super) candidates: Vec<CandidateDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CandidateDto {
    pub(super) content: Option<CandidateContentDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CandidateContentDto {
    #[serde(default)]
    pub(super) parts: Vec<ResponsePartDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ResponsePartDto {
    #[serde(rename = "inlineData", alias = "inline_data")]
    pub(super) inline_data: Option<ResponseInlineDataDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ResponseInlineDataDto {
    #[serde(rename = "mimeType", alias = "mime_type")]
    pub(super) mime_type: Option<String>,
    pub(super) data: Option<String>,
}

impl GenerateResponseDto {
    /// Decode the first inline image found in any candidate.
    pub(super) fn into_generated_image(self, tier: QualityTier) -> Result<GeneratedImage, String> {
        let inline = self
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.inline_data)
            .find(|inline| inline.data.as_deref().is_some_and(|data| !data.is_empty()))
            .ok_or_else(|| "response contained no image part".to_owned())?;

        let bytes = STANDARD
            .decode(inline.data.unwrap_or_default())
            .map_err(|error| format!("image part is not valid base64: {error}"))?;
        if bytes.is_empty() {
            return Err("image part decoded to zero bytes".to_owned());
        }
        Ok(GeneratedImage {
            bytes,
            media_type: inline
                .mime_type
                .filter(|mime| !mime.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_owned()),
            tier,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ErrorEnvelopeDto {
    pub(super) error: Option<ErrorBodyDto>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ErrorBodyDto {
    pub(super) code: Option<serde_json::Value>,
    pub(super) message: Option<String>,
}

impl ErrorEnvelopeDto {
    /// Best-effort parse of an error body; garbage yields an empty envelope.
    pub(super) fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// Whether the provider declared its paid quota exhausted.
    pub(super) fn is_quota_event(&self) -> bool {
        const QUOTA_MARKER: &str = "insufficient_user_quota";
        self.error.as_ref().is_some_and(|error| {
            let code_matches = match &error.code {
                Some(serde_json::Value::String(code)) => code.contains(QUOTA_MARKER),
                _ => false,
            };
            code_matches
                || error
                    .message
                    .as_deref()
                    .is_some_and(|message| message.contains(QUOTA_MARKER))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn request_carries_prompt_images_and_tier_size() {
        let images = [
            ReferenceImage::new(vec![1, 2, 3], None),
            ReferenceImage::new(vec![4], Some("image/png".to_owned())),
        ];
        let body = serde_json::to_value(GenerateRequestDto::new("pose", &images, QualityTier::Medium))
            .expect("serialises");

        assert_eq!(
            body,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "pose" },
                        { "inline_data": { "mime_type": "image/jpeg", "data": "AQID" } },
                        { "inline_data": { "mime_type": "image/png", "data": "BA==" } }
                    ]
                }],
                "generationConfig": {
                    "responseModalities": ["IMAGE"],
                    "imageConfig": { "imageSize": "2K" }
                }
            })
        );
    }

    #[rstest]
    #[case::camel_case(json!({ "inlineData": { "mimeType": "image/png", "data": "AQI=" } }), "image/png")]
    #[case::snake_case(json!({ "inline_data": { "mime_type": "image/webp", "data": "AQI=" } }), "image/webp")]
    #[case::missing_mime(json!({ "inlineData": { "data": "AQI=" } }), "image/jpeg")]
    fn decodes_either_spelling(#[case] part: serde_json::Value, #[case] media_type: &str) {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "here you go" }, part] } }]
        });
        let dto: GenerateResponseDto = serde_json::from_value(body).expect("decodes");

        let image = dto.into_generated_image(QualityTier::Low).expect("image");
        assert_eq!(image.bytes, vec![1, 2]);
        assert_eq!(image.media_type, media_type);
        assert_eq!(image.tier, QualityTier::Low);
    }

    #[rstest]
    #[case::no_candidates(json!({}))]
    #[case::text_only(json!({ "candidates": [{ "content": { "parts": [{ "text": "sorry" }] } }] }))]
    #[case::empty_data(json!({ "candidates": [{ "content": { "parts": [{ "inlineData": { "data": "" } }] } }] }))]
    #[case::bad_base64(json!({ "candidates": [{ "content": { "parts": [{ "inlineData": { "data": "***" } }] } }] }))]
    fn rejects_responses_without_a_usable_image(#[case] body: serde_json::Value) {
        let dto: GenerateResponseDto = serde_json::from_value(body).expect("decodes");
        assert!(dto.into_generated_image(QualityTier::High).is_err());
    }

    #[rstest]
    #[case::code(br#"{"error":{"code":"insufficient_user_quota","message":"x"}}"#.as_slice(), true)]
    #[case::message(br#"{"error":{"code":403,"message":"insufficient_user_quota: top up"}}"#.as_slice(), true)]
    #[case::other(br#"{"error":{"code":"forbidden","message":"bad key"}}"#.as_slice(), false)]
    #[case::garbage(b"<html>".as_slice(), false)]
    fn recognises_quota_events(#[case] body: &[u8], #[case] expected: bool) {
        assert_eq!(ErrorEnvelopeDto::parse(body).is_quota_event(), expected);
    }
}
