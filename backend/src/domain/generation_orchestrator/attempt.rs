//! Attempt-local outcome for one provider call.
//!
//! Classifying each call into an explicit tagged value keeps the retry loop an
//! exhaustive `match` instead of error-type dispatch.

use crate::domain::GeneratedImage;
use crate::domain::ports::ProviderError;

/// Classified result of a single provider invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The provider returned an image.
    Success(GeneratedImage),
    /// A transient failure; another attempt may succeed.
    Retryable(ProviderError),
    /// A terminal failure; no further attempts are made.
    Terminal(ProviderError),
}

impl From<Result<GeneratedImage, ProviderError>> for AttemptOutcome {
    fn from(result: Result<GeneratedImage, ProviderError>) -> Self {
        match result {
            Ok(image) => Self::Success(image),
            Err(error) if error.is_retryable() => Self::Retryable(error),
            Err(error) => Self::Terminal(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QualityTier;
    use rstest::rstest;

    #[rstest]
    fn classifies_provider_results() {
        let image = GeneratedImage {
            bytes: vec![1],
            media_type: "image/png".to_owned(),
            tier: QualityTier::High,
        };
        assert_eq!(
            AttemptOutcome::from(Ok(image.clone())),
            AttemptOutcome::Success(image)
        );
        assert!(matches!(
            AttemptOutcome::from(Err(ProviderError::overloaded("503"))),
            AttemptOutcome::Retryable(_)
        ));
        assert!(matches!(
            AttemptOutcome::from(Err(ProviderError::unauthorized("401"))),
            AttemptOutcome::Terminal(_)
        ));
    }
}
