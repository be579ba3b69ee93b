//! Error types for the execution adapter

use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Errors that can occur when talking to the execution service
#[derive(Debug, Error)]
pub enum AdapterError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Execution service returned an error status code
    #[error("Execution service error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the service
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The service does not know the run id
    #[error("Unknown run '{0}'")]
    UnknownRun(String),

    /// Cancel was requested for a run that already finished
    #[error("Run '{0}' is already in a terminal state")]
    AlreadyTerminal(String),

    /// Credentials were rejected
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Start succeeded but no run id came back
    #[error("Execution service returned an empty run id for pipeline '{0}'")]
    EmptyRunId(String),

    /// Service temporarily unreachable or overloaded
    #[error("Execution service unavailable: {0}")]
    Unavailable(String),
}

impl AdapterError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if retrying the whole attempt may succeed
    ///
    /// Network failures, timeouts, 5xx, 408 and 429 are transient. Everything
    /// else, including unknown run ids and auth failures, is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::ApiError { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Unavailable(_) => true,
            Self::ParseError(_)
            | Self::UnknownRun(_)
            | Self::AlreadyTerminal(_)
            | Self::Unauthorized(_)
            | Self::EmptyRunId(_) => false,
        }
    }
}
