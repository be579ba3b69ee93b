//! Test doubles shared by the engine, scheduler and API tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit_client::{AdapterError, ExecutionAdapter};
use conduit_core::domain::error_detail::PipelineErrorDetail;
use conduit_core::domain::pipeline::{
    OrchestratorType, PipelineDescription, PipelineRequest, PipelineRunRequest,
};
use conduit_core::domain::run::{PipelineRunStatus, RunStatus};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::engine::clock::{Clock, ManualClock};
use crate::engine::Coordinator;
use crate::repository::{InMemoryInstanceRepository, InMemorySignalRepository, InstanceRepository};
use crate::scheduler::InstancePoller;
use crate::service::ExecutionService;
use conduit_core::domain::orchestration::OrchestrationInstance;
use std::time::Duration;
use uuid::Uuid;

pub fn sample_request() -> PipelineRequest {
    PipelineRequest {
        tenant_id: "tenant".to_string(),
        application_id: Some("app".to_string()),
        authentication_key: Some("s3cret".to_string()),
        subscription_id: "sub".to_string(),
        resource_group_name: "rg".to_string(),
        orchestrator_type: OrchestratorType::DataFactory,
        orchestrator_name: "factory".to_string(),
        pipeline_name: "Ingest".to_string(),
        pipeline_parameters: Default::default(),
    }
}

#[derive(Default)]
struct Script {
    starts: VecDeque<Result<String, AdapterError>>,
    checks: VecDeque<Result<RunStatus, AdapterError>>,
    last: HashMap<String, RunStatus>,
    cancelled: HashSet<String>,
    errors: HashMap<String, PipelineErrorDetail>,
    start_calls: Vec<DateTime<Utc>>,
    check_calls: Vec<(String, DateTime<Utc>)>,
}

/// Execution adapter that replays scripted answers
///
/// Starts without a scripted answer get run ids `run-1`, `run-2`, ... Checks
/// without a scripted answer repeat the last status seen for the run, or
/// `InProgress` for a run never checked before. Every call is stamped with the
/// manual clock so tests can assert on timing.
pub struct ScriptedAdapter {
    clock: Arc<ManualClock>,
    script: Mutex<Script>,
    start_delay: Option<Duration>,
}

impl ScriptedAdapter {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            script: Mutex::new(Script::default()),
            start_delay: None,
        }
    }

    /// Makes every Start take `delay` of real time before answering
    pub fn slow_start(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn start_ok(self, run_id: &str) -> Self {
        self.script.lock().unwrap().starts.push_back(Ok(run_id.to_string()));
        self
    }

    pub fn start_err(self, error: AdapterError) -> Self {
        self.script.lock().unwrap().starts.push_back(Err(error));
        self
    }

    pub fn check_ok(self, status: RunStatus) -> Self {
        self.script.lock().unwrap().checks.push_back(Ok(status));
        self
    }

    pub fn check_err(self, error: AdapterError) -> Self {
        self.script.lock().unwrap().checks.push_back(Err(error));
        self
    }

    pub fn with_errors(self, detail: PipelineErrorDetail) -> Self {
        self.script
            .lock()
            .unwrap()
            .errors
            .insert(detail.run_id.clone(), detail);
        self
    }

    pub fn start_count(&self) -> usize {
        self.script.lock().unwrap().start_calls.len()
    }

    pub fn check_count(&self) -> usize {
        self.script.lock().unwrap().check_calls.len()
    }

    pub fn start_times(&self) -> Vec<DateTime<Utc>> {
        self.script.lock().unwrap().start_calls.clone()
    }

    pub fn checks(&self) -> Vec<(String, DateTime<Utc>)> {
        self.script.lock().unwrap().check_calls.clone()
    }
}

#[async_trait]
impl ExecutionAdapter for ScriptedAdapter {
    async fn start(&self, request: &PipelineRequest) -> conduit_client::Result<PipelineRunStatus> {
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.script.lock().unwrap();
        script.start_calls.push(self.clock.now());
        let attempt = script.start_calls.len();

        let run_id = script
            .starts
            .pop_front()
            .unwrap_or_else(|| Ok(format!("run-{}", attempt)))?;
        script.last.insert(run_id.clone(), RunStatus::Queued);
        Ok(PipelineRunStatus::new(
            &request.pipeline_name,
            run_id,
            RunStatus::Queued,
        ))
    }

    async fn check(
        &self,
        request: &PipelineRunRequest,
    ) -> conduit_client::Result<PipelineRunStatus> {
        let mut script = self.script.lock().unwrap();
        script
            .check_calls
            .push((request.run_id.clone(), self.clock.now()));

        let status = if script.cancelled.contains(&request.run_id) {
            RunStatus::Cancelled
        } else {
            match script.checks.pop_front() {
                Some(scripted) => scripted?,
                None => script
                    .last
                    .get(&request.run_id)
                    .cloned()
                    .filter(|status| status.is_terminal())
                    .unwrap_or(RunStatus::InProgress),
            }
        };
        script.last.insert(request.run_id.clone(), status.clone());

        Ok(PipelineRunStatus::new(
            request.pipeline_name(),
            &request.run_id,
            status,
        ))
    }

    async fn cancel(
        &self,
        request: &PipelineRunRequest,
    ) -> conduit_client::Result<PipelineRunStatus> {
        let mut script = self.script.lock().unwrap();
        if script
            .last
            .get(&request.run_id)
            .is_some_and(|status| status.is_terminal())
        {
            return Err(AdapterError::AlreadyTerminal(request.run_id.clone()));
        }
        script.cancelled.insert(request.run_id.clone());
        Ok(PipelineRunStatus::new(
            request.pipeline_name(),
            &request.run_id,
            RunStatus::Unknown("Cancelling".to_string()),
        ))
    }

    async fn errors(
        &self,
        request: &PipelineRunRequest,
    ) -> conduit_client::Result<PipelineErrorDetail> {
        let script = self.script.lock().unwrap();
        let status = script
            .last
            .get(&request.run_id)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownRun(request.run_id.clone()))?;
        Ok(script.errors.get(&request.run_id).cloned().unwrap_or_else(|| {
            PipelineErrorDetail::empty(request.pipeline_name(), &request.run_id, status)
        }))
    }

    async fn validate(
        &self,
        request: &PipelineRequest,
    ) -> conduit_client::Result<PipelineDescription> {
        Ok(PipelineDescription {
            pipeline_exists: true,
            pipeline_name: request.pipeline_name.clone(),
            pipeline_id: Some("pipeline-1".to_string()),
            pipeline_type: Some(request.orchestrator_type.to_string()),
            activity_count: 3,
        })
    }
}

/// In-memory orchestrator wired around a scripted adapter and a manual clock
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub adapter: Arc<ScriptedAdapter>,
    pub instances: Arc<InMemoryInstanceRepository>,
    pub signals: Arc<InMemorySignalRepository>,
    pub coordinator: Arc<Coordinator>,
    pub poller: InstancePoller,
    pub service: Arc<ExecutionService>,
    pub config: Config,
}

impl Harness {
    pub fn new(clock: Arc<ManualClock>, adapter: ScriptedAdapter) -> Self {
        Self::with_config(Config::default(), clock, adapter)
    }

    pub fn with_config(config: Config, clock: Arc<ManualClock>, adapter: ScriptedAdapter) -> Self {
        let adapter = Arc::new(adapter);
        let instances = Arc::new(InMemoryInstanceRepository::new());
        let signals = Arc::new(InMemorySignalRepository::new());

        let coordinator = Arc::new(Coordinator::new(
            adapter.clone(),
            instances.clone(),
            signals.clone(),
            config.poll_loop(),
            config.retry_policy(),
        ));
        let poller = InstancePoller::new(
            &config,
            coordinator.clone(),
            instances.clone(),
            clock.clone(),
        );
        let service = Arc::new(ExecutionService::new(
            adapter.clone(),
            instances.clone(),
            signals.clone(),
            clock.clone(),
        ));

        Self {
            clock,
            adapter,
            instances,
            signals,
            coordinator,
            poller,
            service,
            config,
        }
    }

    /// One scheduler tick at the current manual time
    pub async fn tick(&self) -> usize {
        self.poller.run_once().await.unwrap()
    }

    /// Moves the clock forward, then ticks
    pub async fn tick_after(&self, duration: Duration) -> usize {
        self.clock.advance(duration);
        self.tick().await
    }

    /// Ticks every `step` until the instance is terminal or `limit` ticks pass
    pub async fn run_to_end(
        &self,
        id: Uuid,
        step: Duration,
        limit: usize,
    ) -> OrchestrationInstance {
        for _ in 0..limit {
            let instance = self.instance(id).await;
            if instance.is_terminal() {
                return instance;
            }
            self.tick_after(step).await;
        }
        self.instance(id).await
    }

    pub async fn instance(&self, id: Uuid) -> OrchestrationInstance {
        self.instances.find_by_id(id).await.unwrap().unwrap()
    }
}
