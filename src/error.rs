//! Error Types
//!
//! Quota exhaustion is not an error at the limiter level (`Decision::Denied`);
//! it only becomes one at the service boundary, where the caller must stop.

/// Failures of the text generation backend
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// None of the configured key variables is set
    #[error("No API key configured (checked: {0})")]
    MissingApiKey(String),

    /// Connection, TLS or timeout failure
    #[error("Generation request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status from the backend
    #[error("Generation backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered without any text
    #[error("Generation backend returned no text")]
    EmptyResponse,

    /// The response body could not be decoded
    #[error("Invalid response from generation backend: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Transport(_) => true,
            GenerationError::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

/// Failures of the web search backend
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Search credentials are missing
    #[error("Search is not configured: {0}")]
    NotConfigured(String),

    /// Connection, TLS or timeout failure
    #[error("Search request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status from the backend
    #[error("Search backend returned HTTP {0}")]
    Status(u16),

    /// The response body could not be decoded
    #[error("Invalid response from search backend: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced to callers of the generation service
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Quota exhausted for this session
    #[error("{message}")]
    RateLimited {
        seconds_remaining: u64,
        message: String,
    },

    /// Prompt is blank
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    /// Prompt exceeds the configured size
    #[error("Prompt is {len} characters, the maximum is {max}")]
    PromptTooLong { len: usize, max: usize },

    /// The generation backend failed
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// HTTP statuses worth retrying
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(
        status,
        408 | // Request Timeout
        429 | // Too Many Requests
        500 | // Internal Server Error
        502 | // Bad Gateway
        503 | // Service Unavailable
        504   // Gateway Timeout
    )
}
