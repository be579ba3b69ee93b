//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod execution;
pub mod health;
pub mod pipeline;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::ExecutionService;

/// Create the main API router with all endpoints
pub fn create_router(service: Arc<ExecutionService>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Execution endpoints
        .route(
            "/executions",
            post(execution::start_execution).get(execution::list_executions),
        )
        .route("/executions/checks", post(execution::start_check))
        .route("/executions/{id}", get(execution::get_execution))
        .route("/executions/{id}/signal", post(execution::raise_signal))
        .route("/executions/{id}/cancel", post(execution::cancel_execution))
        .route("/executions/{id}/errors", get(execution::get_execution_errors))
        // Direct execution service calls
        .route("/pipelines/validate", post(pipeline::validate_pipeline))
        .route("/pipelines/status", post(pipeline::run_status))
        .route("/pipelines/cancel", post(pipeline::cancel_run))
        .route("/pipelines/errors", post(pipeline::run_errors))
        // Add state and middleware
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}
