use std::io;
use thiserror::Error;
use async_openai::error::OpenAIError;
use reqwest::StatusCode;

use crate::orchestrator::SegmentRole;

/// Custom result type alias for the pipeline
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while turning a repository into an artifact
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The repository, README or file does not exist (or is hidden from this credential)
    #[error("Not found: {0}")]
    UpstreamNotFound(String),

    /// The repository exists but the credential may not read it
    #[error("Access denied: {0}")]
    UpstreamAccessDenied(String),

    /// Network failure, 5xx or secondary rate limit on the repository host
    #[error("Upstream temporarily unavailable: {0}")]
    UpstreamTransient(String),

    /// Bounded content still exceeds the token envelope
    #[error("Content is too large for analysis: {measured} tokens exceeds the limit of {limit}")]
    SizeExceeded {
        /// Token count measured after truncation
        measured: usize,
        /// The configured ceiling
        limit: usize,
    },

    /// The backend never produced output that passed validation
    #[error("Failed to generate valid {format} output after {attempts} attempts")]
    GenerationExhausted {
        /// Output format that kept failing validation
        format: String,
        /// Number of backend calls made
        attempts: u32,
    },

    /// The generation backend is throttling us
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// One of the concurrent segments died before producing a result
    #[error("{role} segment failed: {reason}")]
    PartialSegmentFailure {
        /// Which segment was lost
        role: SegmentRole,
        /// Panic or abort description
        reason: String,
    },

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic generation backend failures
    #[error("Backend error: {0}")]
    Backend(String),

    /// I/O errors
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    /// JSON parsing/serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// OpenAI API errors that are not rate limits
    #[error("OpenAI error: {0}")]
    OpenAI(OpenAIError),
}

impl PipelineError {
    /// Checks if this error is transient and retryable
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamTransient(_) | Self::IO(_))
    }

    /// Checks if this error is fatal and should terminate processing
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }

    /// HTTP status an outer web layer should answer with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UpstreamNotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamAccessDenied(_) => StatusCode::FORBIDDEN,
            Self::UpstreamTransient(_) => StatusCode::BAD_GATEWAY,
            Self::SizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::GenerationExhausted { .. }
            | Self::PartialSegmentFailure { .. }
            | Self::Config(_)
            | Self::Backend(_)
            | Self::IO(_)
            | Self::Json(_)
            | Self::OpenAI(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable message for end users, one per failure category
    pub fn user_message(&self) -> String {
        match self {
            Self::UpstreamNotFound(detail) | Self::UpstreamAccessDenied(detail) => detail.clone(),
            Self::UpstreamTransient(_) => {
                "GitHub is not responding right now. Please try again shortly.".to_string()
            }
            Self::SizeExceeded { .. } => "Content is too large for analysis.".to_string(),
            Self::RateLimited(_) => {
                "Service is currently experiencing high demand. Please try again in a few minutes."
                    .to_string()
            }
            Self::Validation(detail) => detail.clone(),
            Self::GenerationExhausted { .. } | Self::PartialSegmentFailure { .. } => {
                "Error occurred during generation. Please try again.".to_string()
            }
            other => format!("An error occurred: {}", other),
        }
    }
}

impl From<OpenAIError> for PipelineError {
    fn from(err: OpenAIError) -> Self {
        match &err {
            OpenAIError::ApiError(api)
                if is_rate_limit(api.r#type.as_deref(), &api.message)
                    || api.code.as_deref() == Some("rate_limit_exceeded") =>
            {
                Self::RateLimited(api.message.clone())
            }
            _ => Self::OpenAI(err),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
            Self::RateLimited(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}

fn is_rate_limit(kind: Option<&str>, message: &str) -> bool {
    kind.map_or(false, |k| k.contains("rate_limit"))
        || message.to_lowercase().contains("rate limit")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(PipelineError::UpstreamNotFound("x".into()), 404)]
    #[test_case(PipelineError::UpstreamAccessDenied("x".into()), 403)]
    #[test_case(PipelineError::RateLimited("x".into()), 429)]
    #[test_case(PipelineError::SizeExceeded { measured: 2, limit: 1 }, 413)]
    #[test_case(PipelineError::Validation("x".into()), 400)]
    #[test_case(PipelineError::GenerationExhausted { format: "ssml".into(), attempts: 3 }, 500)]
    fn test_status_code(error: PipelineError, expected: u16) {
        assert_eq!(error.status_code().as_u16(), expected);
    }

    #[test]
    fn test_is_transient() {
        let transient = PipelineError::UpstreamTransient("connection reset".into());
        let fatal = PipelineError::UpstreamNotFound("octocat/missing".into());

        assert!(transient.is_transient());
        assert!(!fatal.is_transient());
        assert!(PipelineError::RateLimited("slow down".into()).is_fatal());
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limit(Some("rate_limit_exceeded"), "whatever"));
        assert!(is_rate_limit(None, "Rate limit reached for gpt-4o"));
        assert!(!is_rate_limit(Some("invalid_request_error"), "bad input"));
    }

    #[test]
    fn test_openai_rate_limit_code_maps_to_rate_limited() {
        let api = async_openai::error::ApiError {
            message: "Too many requests".into(),
            r#type: Some("requests".into()),
            param: None,
            code: Some("rate_limit_exceeded".into()),
        };
        let error = PipelineError::from(OpenAIError::ApiError(api));
        assert!(matches!(error, PipelineError::RateLimited(_)));
        assert_eq!(error.status_code().as_u16(), 429);
    }

    #[test]
    fn test_user_message_hides_internals() {
        let error = PipelineError::SizeExceeded { measured: 120_000, limit: 100_000 };
        assert_eq!(error.user_message(), "Content is too large for analysis.");
        assert!(error.to_string().contains("120000"));
    }
}
