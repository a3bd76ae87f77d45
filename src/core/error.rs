use crate::core::series::ProviderKind;
use thiserror::Error;

/// Failure taxonomy for the fetch pipeline.
///
/// `SourceUnavailable` and `MalformedData` are absorbed by the orchestrator
/// and only trigger fallback to the next provider. `InstrumentUnavailable` is
/// the single variant that crosses the core boundary.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source {provider} unavailable: {reason}")]
    SourceUnavailable {
        provider: ProviderKind,
        reason: String,
    },

    #[error("source {provider} returned malformed data: {reason}")]
    MalformedData {
        provider: ProviderKind,
        reason: String,
    },

    #[error("instrument {0} could not be analyzed for this period")]
    InstrumentUnavailable(String),
}

impl FetchError {
    pub fn unavailable(provider: ProviderKind, reason: impl Into<String>) -> Self {
        FetchError::SourceUnavailable {
            provider,
            reason: reason.into(),
        }
    }

    pub fn malformed(provider: ProviderKind, reason: impl Into<String>) -> Self {
        FetchError::MalformedData {
            provider,
            reason: reason.into(),
        }
    }
}
