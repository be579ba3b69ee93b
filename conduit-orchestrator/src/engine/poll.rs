//! Poll loop
//!
//! Polling is not a loop in memory: every iteration is one durable step. On
//! entry the instance is suspended for one interval, each due step performs
//! a single Check, and the next Check is scheduled one interval after the
//! previous one. A restarted orchestrator picks up from the persisted wake
//! time.

use chrono::{DateTime, Utc};
use conduit_client::{AdapterError, ExecutionAdapter};
use conduit_core::domain::orchestration::{
    OrchestrationEvent, OrchestrationInstance, Phase, WaitReason,
};
use conduit_core::domain::pipeline::PipelineRunRequest;
use conduit_core::domain::run::PipelineRunStatus;
use std::time::Duration;
use tracing::debug;

use super::clock::after;

/// Result of one poll step
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The wake time has not been reached; nothing was called
    NotDue,

    /// The run is still live; the next Check is scheduled
    Pending,

    /// The run reached a terminal status
    Terminal(PipelineRunStatus),
}

#[derive(Debug, Clone, Copy)]
pub struct PollLoop {
    interval: Duration,
}

impl PollLoop {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Moves the instance into polling without checking
    ///
    /// The first Check happens one interval from `now`.
    pub fn enter(&self, instance: &mut OrchestrationInstance, now: DateTime<Utc>) {
        instance.phase = Phase::Polling;
        instance.suspend(now, WaitReason::PollInterval, after(now, self.interval));
    }

    /// Performs at most one Check
    ///
    /// Adapter failures are returned untouched; deciding what they mean is
    /// the caller's job.
    pub async fn poll_once(
        &self,
        adapter: &dyn ExecutionAdapter,
        instance: &mut OrchestrationInstance,
        run: &PipelineRunRequest,
        now: DateTime<Utc>,
    ) -> Result<PollOutcome, AdapterError> {
        // Woken early: keep waiting for the interval that was scheduled
        if let Some(resume_at) = instance
            .resume_at(WaitReason::PollInterval)
            .filter(|resume_at| *resume_at > now)
        {
            instance.next_wake_at = Some(resume_at);
            return Ok(PollOutcome::NotDue);
        }

        let status = adapter.check(run).await?;
        debug!(
            "Pipeline '{}' run {} is {}",
            run.pipeline_name(),
            run.run_id,
            status.actual_status
        );

        instance.record(
            now,
            OrchestrationEvent::Checked {
                status: status.actual_status.clone(),
            },
        );
        instance.last_status = Some(status.clone());

        if status.is_terminal() {
            return Ok(PollOutcome::Terminal(status));
        }

        instance.suspend(now, WaitReason::PollInterval, after(now, self.interval));
        Ok(PollOutcome::Pending)
    }
}

impl Default for PollLoop {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::{Clock, ManualClock};
    use crate::testing::{ScriptedAdapter, sample_request};
    use conduit_core::domain::orchestration::CorrelationMode;
    use conduit_core::domain::run::RunStatus;
    use std::sync::Arc;

    fn polling_instance(
        clock: &ManualClock,
        poll: &PollLoop,
        run_id: &str,
    ) -> OrchestrationInstance {
        let mut instance =
            OrchestrationInstance::execute(sample_request(), CorrelationMode::Inline, clock.now());
        instance.run_id = Some(run_id.to_string());
        poll.enter(&mut instance, clock.now());
        instance
    }

    #[tokio::test]
    async fn test_entering_does_not_check() {
        let clock = Arc::new(ManualClock::default());
        let adapter = ScriptedAdapter::new(clock.clone());
        let poll = PollLoop::default();
        let mut instance = polling_instance(&clock, &poll, "abc");
        let run = instance.run_request().unwrap();

        let outcome = poll
            .poll_once(&adapter, &mut instance, &run, clock.now())
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::NotDue);
        assert_eq!(adapter.check_count(), 0);
    }

    #[tokio::test]
    async fn test_polls_until_terminal() {
        let clock = Arc::new(ManualClock::default());
        let adapter = ScriptedAdapter::new(clock.clone())
            .check_ok(RunStatus::InProgress)
            .check_ok(RunStatus::InProgress)
            .check_ok(RunStatus::Succeeded);
        let poll = PollLoop::default();
        let mut instance = polling_instance(&clock, &poll, "abc");
        let run = instance.run_request().unwrap();

        let mut outcome = PollOutcome::NotDue;
        for _ in 0..3 {
            clock.advance(poll.interval());
            outcome = poll
                .poll_once(&adapter, &mut instance, &run, clock.now())
                .await
                .unwrap();
        }

        match outcome {
            PollOutcome::Terminal(status) => {
                assert_eq!(status.actual_status, RunStatus::Succeeded);
                assert_eq!(status.run_id, "abc");
            }
            other => panic!("expected terminal outcome, got {:?}", other),
        }
        assert_eq!(adapter.check_count(), 3);
    }

    #[tokio::test]
    async fn test_early_wake_does_not_check() {
        let clock = Arc::new(ManualClock::default());
        let adapter = ScriptedAdapter::new(clock.clone());
        let poll = PollLoop::default();
        let mut instance = polling_instance(&clock, &poll, "abc");
        let run = instance.run_request().unwrap();
        let scheduled = instance.next_wake_at;

        clock.advance(Duration::from_secs(1));
        instance.next_wake_at = Some(clock.now());
        let outcome = poll
            .poll_once(&adapter, &mut instance, &run, clock.now())
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::NotDue);
        assert_eq!(instance.next_wake_at, scheduled);
        assert_eq!(adapter.check_count(), 0);
    }

    #[tokio::test]
    async fn test_check_failure_propagates() {
        let clock = Arc::new(ManualClock::default());
        let adapter = ScriptedAdapter::new(clock.clone())
            .check_err(AdapterError::UnknownRun("abc".to_string()));
        let poll = PollLoop::default();
        let mut instance = polling_instance(&clock, &poll, "abc");
        let run = instance.run_request().unwrap();

        clock.advance(poll.interval());
        let result = poll.poll_once(&adapter, &mut instance, &run, clock.now()).await;

        assert!(matches!(result, Err(AdapterError::UnknownRun(_))));
    }
}
