//! Execution Service
//!
//! Accepting executions, inspecting them, raising signals and reaching the
//! run behind an execution.

use conduit_client::{AdapterError, ExecutionAdapter};
use conduit_core::domain::error_detail::PipelineErrorDetail;
use conduit_core::domain::orchestration::{
    CorrelationMode, InstanceKind, OrchestrationInstance, RunStartedSignal,
};
use conduit_core::domain::pipeline::{PipelineDescription, PipelineRequest, PipelineRunRequest};
use conduit_core::domain::run::PipelineRunStatus;
use conduit_core::dto::execution::StartExecution;
use conduit_core::error::ValidationError;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::Clock;
use crate::repository::{Delivery, InstanceRepository, SignalRepository, StoreError};

/// Service error type
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Execution {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

pub struct ExecutionService {
    adapter: Arc<dyn ExecutionAdapter>,
    instances: Arc<dyn InstanceRepository>,
    signals: Arc<dyn SignalRepository>,
    clock: Arc<dyn Clock>,
}

impl ExecutionService {
    pub fn new(
        adapter: Arc<dyn ExecutionAdapter>,
        instances: Arc<dyn InstanceRepository>,
        signals: Arc<dyn SignalRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            adapter,
            instances,
            signals,
            clock,
        }
    }

    /// Accepts an execution; the scheduler starts it on its next tick
    pub async fn submit(&self, req: StartExecution) -> ExecutionResult<OrchestrationInstance> {
        req.request.validate()?;

        let correlation = if req.correlated {
            CorrelationMode::Signalled
        } else {
            CorrelationMode::Inline
        };
        let instance = OrchestrationInstance::execute(req.request, correlation, self.clock.now());
        self.instances.insert(&instance).await?;

        tracing::info!(
            "Execution {} accepted for pipeline '{}' ({:?})",
            instance.id,
            instance.pipeline_name(),
            correlation
        );

        Ok(instance)
    }

    /// Creates a checker that waits for a run-started signal
    pub async fn submit_check(
        &self,
        request: PipelineRequest,
    ) -> ExecutionResult<OrchestrationInstance> {
        request.validate()?;

        let checker =
            OrchestrationInstance::checker(Uuid::new_v4(), request, None, self.clock.now());
        self.instances.insert(&checker).await?;

        tracing::info!(
            "Checker {} created for pipeline '{}'",
            checker.id,
            checker.pipeline_name()
        );

        Ok(checker)
    }

    pub async fn get(&self, id: Uuid) -> ExecutionResult<OrchestrationInstance> {
        self.instances
            .find_by_id(id)
            .await?
            .ok_or(ExecutionError::NotFound(id))
    }

    pub async fn list(&self, limit: usize) -> ExecutionResult<Vec<OrchestrationInstance>> {
        Ok(self.instances.list_recent(limit).await?)
    }

    /// Delivers a run-started signal to a checker
    ///
    /// Only the first signal counts; later ones report [`Delivery::Duplicate`]
    /// and change nothing.
    pub async fn raise_signal(
        &self,
        id: Uuid,
        signal: RunStartedSignal,
    ) -> ExecutionResult<Delivery> {
        if signal.run_id.trim().is_empty() {
            return Err(ValidationError::MissingField("RunId").into());
        }

        let instance = self.get(id).await?;
        if instance.kind != InstanceKind::Check {
            return Err(ExecutionError::InvalidState(format!(
                "Execution {} does not accept signals",
                id
            )));
        }

        let now = self.clock.now();
        let delivery = self.signals.deliver(id, &signal, now).await?;
        match delivery {
            Delivery::Delivered => {
                self.instances.wake(id, now).await?;
                tracing::info!("Signal with run id {} delivered to checker {}", signal.run_id, id);
            }
            Delivery::Duplicate => {
                tracing::debug!("Duplicate signal for checker {} ignored", id);
            }
        }

        Ok(delivery)
    }

    /// Requests cancellation of the run behind an execution
    ///
    /// The orchestration itself keeps polling and finishes when the service
    /// reports the cancelled run as terminal.
    pub async fn cancel(&self, id: Uuid) -> ExecutionResult<PipelineRunStatus> {
        let run = self.current_run(id).await?;
        tracing::info!(
            "Cancelling pipeline '{}' run {} (execution {})",
            run.pipeline_name(),
            run.run_id,
            id
        );
        Ok(self.adapter.cancel(&run).await?)
    }

    /// Activity errors of the run behind an execution
    pub async fn errors(&self, id: Uuid) -> ExecutionResult<PipelineErrorDetail> {
        let run = self.current_run(id).await?;
        Ok(self.adapter.errors(&run).await?)
    }

    async fn current_run(&self, id: Uuid) -> ExecutionResult<PipelineRunRequest> {
        self.get(id).await?.run_request().ok_or_else(|| {
            ExecutionError::InvalidState(format!("Execution {} has not started a run yet", id))
        })
    }

    // =========================================================================
    // Direct adapter calls
    // =========================================================================

    pub async fn validate_pipeline(
        &self,
        request: PipelineRequest,
    ) -> ExecutionResult<PipelineDescription> {
        request.validate()?;
        Ok(self.adapter.validate(&request).await?)
    }

    pub async fn run_status(&self, run: PipelineRunRequest) -> ExecutionResult<PipelineRunStatus> {
        run.validate()?;
        Ok(self.adapter.check(&run).await?)
    }

    pub async fn cancel_run(&self, run: PipelineRunRequest) -> ExecutionResult<PipelineRunStatus> {
        run.validate()?;
        Ok(self.adapter.cancel(&run).await?)
    }

    pub async fn run_errors(
        &self,
        run: PipelineRunRequest,
    ) -> ExecutionResult<PipelineErrorDetail> {
        run.validate()?;
        Ok(self.adapter.errors(&run).await?)
    }
}
