//! Error types for the extraction boundary.

use intake_core::error::IntakeError;

/// Errors from the external text-generation call.
///
/// These never cross the engine boundary: the engine traits degrade to an
/// empty map or a canned reply. The type exists so the HTTP client can use
/// `?` internally and log one structured failure.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned status {0}")]
    Status(u16),
    #[error("missing API key in environment variable {0}")]
    MissingApiKey(String),
    #[error("response had no completion content")]
    EmptyResponse,
}

impl From<ExtractError> for IntakeError {
    fn from(err: ExtractError) -> Self {
        IntakeError::Extraction(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            ExtractError::Status(429).to_string(),
            "service returned status 429"
        );
        assert_eq!(
            ExtractError::MissingApiKey("INTAKE_LLM_API_KEY".into()).to_string(),
            "missing API key in environment variable INTAKE_LLM_API_KEY"
        );
        assert_eq!(
            ExtractError::EmptyResponse.to_string(),
            "response had no completion content"
        );
    }

    #[test]
    fn test_into_intake_error() {
        let err: IntakeError = ExtractError::EmptyResponse.into();
        assert!(matches!(err, IntakeError::Extraction(_)));
    }
}
