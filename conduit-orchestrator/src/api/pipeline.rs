//! Pipeline API Handlers
//!
//! Direct calls to the execution service for a known run, without creating
//! an orchestration.

use axum::{Json, extract::State};
use conduit_core::domain::error_detail::PipelineErrorDetail;
use conduit_core::domain::pipeline::{PipelineDescription, PipelineRequest, PipelineRunRequest};
use conduit_core::domain::run::PipelineRunStatus;
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::service::ExecutionService;

/// POST /pipelines/validate
pub async fn validate_pipeline(
    State(service): State<Arc<ExecutionService>>,
    Json(req): Json<PipelineRequest>,
) -> ApiResult<Json<PipelineDescription>> {
    tracing::debug!("Validating pipeline '{}'", req.pipeline_name);
    Ok(Json(service.validate_pipeline(req).await?))
}

/// POST /pipelines/status
pub async fn run_status(
    State(service): State<Arc<ExecutionService>>,
    Json(req): Json<PipelineRunRequest>,
) -> ApiResult<Json<PipelineRunStatus>> {
    Ok(Json(service.run_status(req).await?))
}

/// POST /pipelines/cancel
pub async fn cancel_run(
    State(service): State<Arc<ExecutionService>>,
    Json(req): Json<PipelineRunRequest>,
) -> ApiResult<Json<PipelineRunStatus>> {
    tracing::info!("Cancelling pipeline '{}' run {}", req.pipeline_name(), req.run_id);
    Ok(Json(service.cancel_run(req).await?))
}

/// POST /pipelines/errors
pub async fn run_errors(
    State(service): State<Arc<ExecutionService>>,
    Json(req): Json<PipelineRunRequest>,
) -> ApiResult<Json<PipelineErrorDetail>> {
    Ok(Json(service.run_errors(req).await?))
}
