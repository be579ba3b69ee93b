//! Orchestration instance domain types
//!
//! An [`OrchestrationInstance`] is the durable record of one unit of work:
//! either a full "execute pipeline" request or a checker that polls a run it
//! learns about through a signal. The orchestrator persists it after every
//! transition so a restarted process resumes from the last completed phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::{PipelineRequest, PipelineRunRequest};
use crate::domain::run::{PipelineRunStatus, RunStatus};

/// What an instance is responsible for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceKind {
    /// Start a run, poll it to completion, retry transient failures
    Execute,

    /// Wait for a run-started signal, then poll that run
    Check,
}

/// How an execute instance hands the run id to its poller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationMode {
    /// Start and poll inside the same instance
    #[default]
    Inline,

    /// Dispatch a checker first and signal it once the run exists
    Signalled,
}

/// Position of an instance in its attempt state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    NotStarted,
    Starting,
    WaitingForCorrelation,
    Polling,
    Terminal,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::NotStarted => write!(f, "NotStarted"),
            Phase::Starting => write!(f, "Starting"),
            Phase::WaitingForCorrelation => write!(f, "WaitingForCorrelation"),
            Phase::Polling => write!(f, "Polling"),
            Phase::Terminal => write!(f, "Terminal"),
        }
    }
}

/// Why an instance is suspended until a wake time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitReason {
    PollInterval,
    RetryBackoff,
}

/// One-shot signal carrying the run id to a waiting checker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunStartedSignal {
    pub run_id: String,
}

/// Why an orchestration ended without a terminal run status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum OrchestrationFailure {
    /// The request was rejected before Start
    Validation { message: String },

    /// The execution service refused the call and retrying cannot help
    Adapter {
        message: String,
        run_id: Option<String>,
    },

    /// Every attempt failed transiently
    RetriesExhausted {
        pipeline_name: String,
        run_id: Option<String>,
        attempts: u32,
        last_error: String,
    },

    /// A checker whose attempt was given up before it finished
    Abandoned { attempt: u32 },

    /// A transient failure inside a checker, handed to the parent's retry policy
    Transient {
        message: String,
        run_id: Option<String>,
    },
}

impl std::fmt::Display for OrchestrationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestrationFailure::Validation { message } => {
                write!(f, "validation failed: {}", message)
            }
            OrchestrationFailure::Adapter { message, .. } => {
                write!(f, "execution service error: {}", message)
            }
            OrchestrationFailure::RetriesExhausted {
                pipeline_name,
                run_id,
                attempts,
                last_error,
            } => write!(
                f,
                "max retries exceeded for pipeline '{}' with run id '{}' after {} attempt(s): {}",
                pipeline_name,
                run_id.as_deref().unwrap_or("<none>"),
                attempts,
                last_error
            ),
            OrchestrationFailure::Abandoned { attempt } => {
                write!(f, "checker abandoned after attempt {} failed", attempt)
            }
            OrchestrationFailure::Transient { message, .. } => {
                write!(f, "transient execution service error: {}", message)
            }
        }
    }
}

/// Something that happened to an instance, kept in its history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    AttemptBegan { attempt: u32 },
    CheckerDispatched { check_instance_id: Uuid },
    RunStarted { run_id: String },
    SignalDelivered { check_instance_id: Uuid, duplicate: bool },
    SignalReceived { run_id: String },
    Suspended { reason: WaitReason, until: DateTime<Utc> },
    Checked { status: RunStatus },
    AttemptFailed { attempt: u32, error: String, transient: bool },
    Completed { status: RunStatus },
    Failed { failure: OrchestrationFailure },
}

/// Timestamped history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub event: OrchestrationEvent,
}

/// Durable record of one orchestration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationInstance {
    pub id: Uuid,
    pub kind: InstanceKind,
    pub parent_id: Option<Uuid>,
    pub request: PipelineRequest,
    pub correlation: CorrelationMode,
    pub phase: Phase,

    /// Last run id seen, kept across retries for diagnostics
    pub run_id: Option<String>,

    /// Checker currently polling on behalf of this instance
    pub check_instance_id: Option<Uuid>,

    /// Number of attempts begun so far (1-based once started)
    pub attempt: u32,

    pub last_status: Option<PipelineRunStatus>,

    /// When the scheduler should advance this instance next; `None` means parked
    pub next_wake_at: Option<DateTime<Utc>>,

    pub output: Option<PipelineRunStatus>,
    pub failure: Option<OrchestrationFailure>,
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrchestrationInstance {
    /// New execute instance, due immediately
    pub fn execute(
        request: PipelineRequest,
        correlation: CorrelationMode,
        now: DateTime<Utc>,
    ) -> Self {
        Self::blank(
            Uuid::new_v4(),
            InstanceKind::Execute,
            None,
            request,
            correlation,
            Phase::NotStarted,
            Some(now),
            now,
        )
    }

    /// New checker, parked until its run-started signal arrives
    ///
    /// A checker's run requests carry its own id as the check instance id.
    pub fn checker(
        id: Uuid,
        request: PipelineRequest,
        parent_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut checker = Self::blank(
            id,
            InstanceKind::Check,
            parent_id,
            request,
            CorrelationMode::Signalled,
            Phase::WaitingForCorrelation,
            None,
            now,
        );
        checker.check_instance_id = Some(id);
        checker
    }

    #[allow(clippy::too_many_arguments)]
    fn blank(
        id: Uuid,
        kind: InstanceKind,
        parent_id: Option<Uuid>,
        request: PipelineRequest,
        correlation: CorrelationMode,
        phase: Phase,
        next_wake_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            parent_id,
            request,
            correlation,
            phase,
            run_id: None,
            check_instance_id: None,
            attempt: 0,
            last_status: None,
            next_wake_at,
            output: None,
            failure: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Deterministic checker id for one attempt of this instance
    ///
    /// Re-running the dispatch step after a restart yields the same id, so the
    /// checker record is created at most once.
    pub fn checker_id_for_attempt(&self, attempt: u32) -> Uuid {
        Uuid::new_v5(&self.id, format!("check-attempt-{}", attempt).as_bytes())
    }

    pub fn pipeline_name(&self) -> &str {
        &self.request.pipeline_name
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == Phase::Terminal
    }

    /// Whether the scheduler should advance this instance at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_terminal() && self.next_wake_at.is_some_and(|wake| wake <= now)
    }

    /// Run request for the current run, if one has started
    pub fn run_request(&self) -> Option<PipelineRunRequest> {
        self.run_id.as_ref().map(|run_id| {
            let run = PipelineRunRequest::new(self.request.clone(), run_id.clone());
            match self.check_instance_id {
                Some(checker) => run.with_check_instance(checker),
                None => run,
            }
        })
    }

    /// Appends an event to the history
    pub fn record(&mut self, at: DateTime<Utc>, event: OrchestrationEvent) {
        self.updated_at = at;
        self.history.push(HistoryEntry { at, event });
    }

    /// Suspends until `until` for the given reason
    pub fn suspend(&mut self, at: DateTime<Utc>, reason: WaitReason, until: DateTime<Utc>) {
        self.next_wake_at = Some(until);
        self.record(at, OrchestrationEvent::Suspended { reason, until });
    }

    /// End of the most recent suspension for `reason`
    ///
    /// Unlike `next_wake_at`, which a wake-up can pull forward, this is the
    /// earliest time the suspended work may legitimately resume.
    pub fn resume_at(&self, reason: WaitReason) -> Option<DateTime<Utc>> {
        self.history.iter().rev().find_map(|entry| match entry.event {
            OrchestrationEvent::Suspended { reason: r, until } if r == reason => Some(until),
            _ => None,
        })
    }

    /// Parks the instance until something explicitly wakes it
    pub fn park(&mut self, at: DateTime<Utc>) {
        self.next_wake_at = None;
        self.updated_at = at;
    }

    /// Ends the instance with a terminal run status
    pub fn complete(&mut self, at: DateTime<Utc>, status: PipelineRunStatus) {
        self.phase = Phase::Terminal;
        self.next_wake_at = None;
        self.record(
            at,
            OrchestrationEvent::Completed {
                status: status.actual_status.clone(),
            },
        );
        self.output = Some(status);
    }

    /// Ends the instance with a failure
    pub fn fail(&mut self, at: DateTime<Utc>, failure: OrchestrationFailure) {
        self.phase = Phase::Terminal;
        self.next_wake_at = None;
        self.record(
            at,
            OrchestrationEvent::Failed {
                failure: failure.clone(),
            },
        );
        self.failure = Some(failure);
    }

    /// Number of history events matching a predicate
    pub fn count_events(&self, predicate: impl Fn(&OrchestrationEvent) -> bool) -> usize {
        self.history.iter().filter(|entry| predicate(&entry.event)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::tests::sample_request;

    #[test]
    fn test_execute_instance_is_due_immediately() {
        let now = Utc::now();
        let instance =
            OrchestrationInstance::execute(sample_request(), CorrelationMode::Inline, now);
        assert_eq!(instance.phase, Phase::NotStarted);
        assert!(instance.is_due(now));
        assert!(instance.run_request().is_none());
    }

    #[test]
    fn test_checker_is_parked() {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let checker = OrchestrationInstance::checker(id, sample_request(), None, now);
        assert_eq!(checker.phase, Phase::WaitingForCorrelation);
        assert_eq!(checker.check_instance_id, Some(id));
        assert!(!checker.is_due(now + chrono::Duration::days(365)));
    }

    #[test]
    fn test_checker_id_is_stable_per_attempt() {
        let instance =
            OrchestrationInstance::execute(
                sample_request(),
                CorrelationMode::Signalled,
                Utc::now(),
            );
        assert_eq!(
            instance.checker_id_for_attempt(1),
            instance.checker_id_for_attempt(1)
        );
        assert_ne!(
            instance.checker_id_for_attempt(1),
            instance.checker_id_for_attempt(2)
        );
    }

    #[test]
    fn test_complete_clears_wake_and_records_event() {
        let now = Utc::now();
        let mut instance =
            OrchestrationInstance::execute(sample_request(), CorrelationMode::Inline, now);
        instance.complete(now, PipelineRunStatus::new("Ingest", "abc", RunStatus::Succeeded));
        assert!(instance.is_terminal());
        assert!(instance.next_wake_at.is_none());
        assert_eq!(
            instance.count_events(|e| matches!(e, OrchestrationEvent::Completed { .. })),
            1
        );
    }

    #[test]
    fn test_resume_at_uses_latest_suspension() {
        let now = Utc::now();
        let mut instance =
            OrchestrationInstance::execute(sample_request(), CorrelationMode::Inline, now);
        assert!(instance.resume_at(WaitReason::PollInterval).is_none());

        let first = now + chrono::Duration::seconds(5);
        let second = now + chrono::Duration::seconds(10);
        instance.suspend(now, WaitReason::PollInterval, first);
        instance.suspend(now, WaitReason::PollInterval, second);
        instance.next_wake_at = Some(now);

        assert_eq!(instance.resume_at(WaitReason::PollInterval), Some(second));
        assert!(instance.resume_at(WaitReason::RetryBackoff).is_none());
    }

    #[test]
    fn test_run_request_carries_checker() {
        let now = Utc::now();
        let mut instance =
            OrchestrationInstance::execute(sample_request(), CorrelationMode::Signalled, now);
        let checker = instance.checker_id_for_attempt(1);
        instance.run_id = Some("z9".to_string());
        instance.check_instance_id = Some(checker);

        let run = instance.run_request().unwrap();
        assert_eq!(run.run_id, "z9");
        assert_eq!(run.check_orchestrator_instance_id, Some(checker));
    }

    #[test]
    fn test_failure_message_names_pipeline_and_run() {
        let failure = OrchestrationFailure::RetriesExhausted {
            pipeline_name: "Ingest".to_string(),
            run_id: Some("abc".to_string()),
            attempts: 5,
            last_error: "timeout".to_string(),
        };
        let message = failure.to_string();
        assert!(message.contains("Ingest"));
        assert!(message.contains("abc"));
    }
}
