//! Execution API Handlers
//!
//! HTTP endpoints for accepting, inspecting and steering orchestrations.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use conduit_core::domain::error_detail::PipelineErrorDetail;
use conduit_core::domain::orchestration::{OrchestrationInstance, RunStartedSignal};
use conduit_core::domain::pipeline::PipelineRequest;
use conduit_core::domain::run::PipelineRunStatus;
use conduit_core::dto::execution::{
    ExecutionAccepted, ExecutionDetail, ExecutionSummary, SignalOutcome, StartExecution,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::repository::Delivery;
use crate::service::ExecutionService;

const DEFAULT_LIST_LIMIT: usize = 50;

/// POST /executions
/// Accept a pipeline execution; it runs in the background
pub async fn start_execution(
    State(service): State<Arc<ExecutionService>>,
    Json(req): Json<StartExecution>,
) -> ApiResult<(StatusCode, Json<ExecutionAccepted>)> {
    let instance = service.submit(req).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted(&instance))))
}

/// POST /executions/checks
/// Create a checker that waits for a run id to be signalled
pub async fn start_check(
    State(service): State<Arc<ExecutionService>>,
    Json(req): Json<PipelineRequest>,
) -> ApiResult<(StatusCode, Json<ExecutionAccepted>)> {
    let checker = service.submit_check(req).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted(&checker))))
}

/// GET /executions
pub async fn list_executions(
    State(service): State<Arc<ExecutionService>>,
    Query(params): Query<ListQuery>,
) -> ApiResult<Json<Vec<ExecutionSummary>>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    tracing::debug!("Listing up to {} executions", limit);

    let instances = service.list(limit).await?;
    Ok(Json(instances.into_iter().map(ExecutionSummary::from).collect()))
}

/// GET /executions/{id}
pub async fn get_execution(
    State(service): State<Arc<ExecutionService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ExecutionDetail>> {
    let instance = service.get(id).await?;
    Ok(Json(instance.into()))
}

/// POST /executions/{id}/signal
/// Deliver the run-started signal to a checker
pub async fn raise_signal(
    State(service): State<Arc<ExecutionService>>,
    Path(id): Path<Uuid>,
    Json(signal): Json<RunStartedSignal>,
) -> ApiResult<Json<SignalOutcome>> {
    let delivery = service.raise_signal(id, signal).await?;
    Ok(Json(SignalOutcome {
        instance_id: id,
        delivered: delivery == Delivery::Delivered,
    }))
}

/// POST /executions/{id}/cancel
pub async fn cancel_execution(
    State(service): State<Arc<ExecutionService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRunStatus>> {
    Ok(Json(service.cancel(id).await?))
}

/// GET /executions/{id}/errors
pub async fn get_execution_errors(
    State(service): State<Arc<ExecutionService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineErrorDetail>> {
    Ok(Json(service.errors(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

fn accepted(instance: &OrchestrationInstance) -> ExecutionAccepted {
    ExecutionAccepted {
        instance_id: instance.id,
        kind: instance.kind,
        status_url: format!("/executions/{}", instance.id),
    }
}
