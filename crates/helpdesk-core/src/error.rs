//! Error taxonomy shared by every helpdesk crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HelpdeskError>;

#[derive(Debug, Error)]
pub enum HelpdeskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API key missing for provider '{0}'")]
    ApiKeyMissing(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Knowledge retriever not initialized (load or build the index first)")]
    RetrieverNotInitialized,

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Index storage error: {0}")]
    Storage(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse error classes used to decide where a failure is absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing credential or setting; fatal at startup.
    Configuration,
    /// Index missing or similarity search failed.
    Retrieval,
    /// Generative call failed or timed out.
    Generation,
    Unexpected,
}

impl HelpdeskError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_) | Self::ApiKeyMissing(_) | Self::ProviderNotFound(_) => {
                ErrorClass::Configuration
            }
            Self::RetrieverNotInitialized
            | Self::Retrieval(_)
            | Self::Embedding(_)
            | Self::Corpus(_)
            | Self::Storage(_) => ErrorClass::Retrieval,
            Self::Generation(_) | Self::Timeout(_) | Self::Http(_) => ErrorClass::Generation,
            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorClass::Unexpected,
        }
    }

    /// Retrieval and generation failures are answered with an apology
    /// instead of being propagated.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.class(), ErrorClass::Retrieval | ErrorClass::Generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            HelpdeskError::ApiKeyMissing("huggingface".into()).class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            HelpdeskError::RetrieverNotInitialized.class(),
            ErrorClass::Retrieval
        );
        assert_eq!(
            HelpdeskError::Timeout("llm".into()).class(),
            ErrorClass::Generation
        );
        assert_eq!(
            HelpdeskError::Other("boom".into()).class(),
            ErrorClass::Unexpected
        );
    }

    #[test]
    fn test_recoverable() {
        assert!(HelpdeskError::Retrieval("search".into()).is_recoverable());
        assert!(HelpdeskError::Http("reset".into()).is_recoverable());
        assert!(!HelpdeskError::Config("bad".into()).is_recoverable());
        assert!(!HelpdeskError::Other("bad".into()).is_recoverable());
    }

    #[test]
    fn test_display_keeps_detail() {
        let err = HelpdeskError::Generation("503 Service Unavailable".into());
        assert!(err.to_string().contains("503 Service Unavailable"));
    }
}
