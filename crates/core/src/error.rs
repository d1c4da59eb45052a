//! Error types for the PromptChain domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type.

use thiserror::Error;

// --- Bounded context errors ---

/// Failures of the completion service. Surfaced to the caller, never retried.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures while building or running a sequential prompt chain.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Template '{template}' is missing variable '{name}'")]
    MissingVariable { template: String, name: String },

    #[error("Pipeline '{pipeline}' was invoked without input '{name}'")]
    MissingInput { pipeline: String, name: String },

    #[error("Output key '{key}' is produced more than once (stage '{stage}')")]
    DuplicateOutput { key: String, stage: String },

    #[error("Invalid template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("Stage '{stage}' needs variable '{name}' which no input or earlier stage provides")]
    UnresolvedVariable { stage: String, name: String },

    #[error("Declared output '{0}' is not produced by any stage")]
    UndeclaredOutput(String),

    #[error("Pipeline '{0}' has no stages")]
    EmptyPipeline(String),

    #[error("Completion failed: {0}")]
    Completion(#[from] ProviderError),

    #[error("Stage #{index} '{stage}' failed: {source}")]
    StageFailed {
        index: usize,
        stage: String,
        #[source]
        source: Box<ChainError>,
    },
}

impl ChainError {
    /// The innermost error, looking through any `StageFailed` tags.
    pub fn root(&self) -> &ChainError {
        match self {
            ChainError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ChainError::Completion(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn not_configured_names_the_provider() {
        let err = ProviderError::NotConfigured("groq".into());
        assert_eq!(err.to_string(), "Provider not configured: groq");
    }

    #[test]
    fn stage_failure_names_the_stage() {
        let err = ChainError::StageFailed {
            index: 1,
            stage: "dob".into(),
            source: Box::new(ChainError::Completion(ProviderError::Timeout(
                "after 30s".into(),
            ))),
        };
        let text = err.to_string();
        assert!(text.contains("#1"));
        assert!(text.contains("dob"));
        assert!(text.contains("after 30s"));
    }

    #[test]
    fn root_unwraps_stage_tags() {
        let err = ChainError::StageFailed {
            index: 0,
            stage: "person".into(),
            source: Box::new(ChainError::MissingVariable {
                template: "person".into(),
                name: "name".into(),
            }),
        };
        assert!(matches!(err.root(), ChainError::MissingVariable { name, .. } if name == "name"));
    }
}
