//! Error types shared across Conduit crates

use thiserror::Error;

/// A pipeline request that cannot be handed to the execution service
///
/// Validation happens before any Start call and is never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was absent or blank
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A pipeline parameter had an empty name
    #[error("pipeline parameter names must not be empty")]
    EmptyParameterName,

    /// A run request did not carry a run id
    #[error("run request for pipeline '{0}' has no run id")]
    MissingRunId(String),
}

/// Result alias for request validation
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
