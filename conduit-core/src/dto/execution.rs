//! Execution DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::orchestration::{
    CorrelationMode, HistoryEntry, InstanceKind, OrchestrationFailure, OrchestrationInstance, Phase,
};
use crate::domain::pipeline::PipelineRequest;
use crate::domain::run::{PipelineRunStatus, RunStatus, SimpleStatus};

/// Request to execute a pipeline to completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartExecution {
    pub request: PipelineRequest,

    /// Run start and polling as separately resumable units
    #[serde(default)]
    pub correlated: bool,
}

/// Response to an accepted execution or checker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAccepted {
    pub instance_id: Uuid,
    pub kind: InstanceKind,
    pub status_url: String,
}

/// Outcome of raising a run-started signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub instance_id: Uuid,

    /// False when the checker already had a signal
    pub delivered: bool,
}

/// Lightweight instance summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub id: Uuid,
    pub kind: InstanceKind,
    pub parent_id: Option<Uuid>,
    pub pipeline_name: String,
    pub phase: Phase,
    pub run_id: Option<String>,
    pub attempt: u32,
    pub actual_status: Option<RunStatus>,
    pub failed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrchestrationInstance> for ExecutionSummary {
    fn from(instance: OrchestrationInstance) -> Self {
        let actual_status = instance
            .output
            .as_ref()
            .or(instance.last_status.as_ref())
            .map(|status| status.actual_status.clone());

        Self {
            id: instance.id,
            kind: instance.kind,
            parent_id: instance.parent_id,
            pipeline_name: instance.request.pipeline_name,
            phase: instance.phase,
            run_id: instance.run_id,
            attempt: instance.attempt,
            actual_status,
            failed: instance.failure.is_some(),
            created_at: instance.created_at,
            updated_at: instance.updated_at,
        }
    }
}

/// Full view of one instance, with the authentication key removed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionDetail {
    #[serde(flatten)]
    pub summary: ExecutionSummary,
    pub simple_status: SimpleStatus,
    pub correlation: CorrelationMode,
    pub request: PipelineRequest,
    pub check_instance_id: Option<Uuid>,
    pub next_wake_at: Option<DateTime<Utc>>,
    pub last_status: Option<PipelineRunStatus>,
    pub output: Option<PipelineRunStatus>,
    pub failure: Option<OrchestrationFailure>,
    pub history: Vec<HistoryEntry>,
}

impl From<OrchestrationInstance> for ExecutionDetail {
    fn from(instance: OrchestrationInstance) -> Self {
        let simple_status = if instance.is_terminal() {
            SimpleStatus::Complete
        } else {
            SimpleStatus::Running
        };
        let request = instance.request.redacted();
        let correlation = instance.correlation;
        let check_instance_id = instance.check_instance_id;
        let next_wake_at = instance.next_wake_at;
        let last_status = instance.last_status.clone();
        let output = instance.output.clone();
        let failure = instance.failure.clone();
        let history = instance.history.clone();

        Self {
            summary: instance.into(),
            simple_status,
            correlation,
            request,
            check_instance_id,
            next_wake_at,
            last_status,
            output,
            failure,
            history,
        }
    }
}
