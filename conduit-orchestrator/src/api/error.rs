//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use conduit_client::AdapterError;

use crate::service::ExecutionError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    /// The execution service refused the call
    BadGateway(String),
    /// The execution service could not be reached or is overloaded
    ServiceUnavailable(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => {
                tracing::warn!("Execution service error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                tracing::warn!("Execution service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Validation(e) => ApiError::BadRequest(e.to_string()),
            ExecutionError::NotFound(id) => {
                ApiError::NotFound(format!("Execution {} not found", id))
            }
            ExecutionError::InvalidState(msg) => ApiError::Conflict(msg),
            ExecutionError::Adapter(e @ AdapterError::AlreadyTerminal(_)) => {
                ApiError::Conflict(e.to_string())
            }
            ExecutionError::Adapter(e) if e.is_transient() => {
                ApiError::ServiceUnavailable(e.to_string())
            }
            ExecutionError::Adapter(e) => ApiError::BadGateway(e.to_string()),
            ExecutionError::Store(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
