//! Orchestration coordinator
//!
//! Advances one instance by one step. A step performs at most one call to
//! the execution service, and the caller persists the returned record before
//! anything else happens, so a crash never loses more than the step that was
//! in flight.
//!
//! Execute instances own the attempt loop and the retry decision. Check
//! instances wait for a run id, poll that run to a terminal status and report
//! back to their parent; they never retry.

use chrono::{DateTime, Utc};
use conduit_client::ExecutionAdapter;
use conduit_core::domain::orchestration::{
    CorrelationMode, InstanceKind, OrchestrationEvent, OrchestrationFailure,
    OrchestrationInstance, Phase, RunStartedSignal, WaitReason,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::clock::after;
use super::poll::{PollLoop, PollOutcome};
use super::retry::{RetryDecision, RetryPolicy};
use super::{EngineError, EngineResult};
use crate::repository::{Delivery, InstanceRepository, SignalRepository, StoreError};

/// Result of advancing an instance
#[derive(Debug)]
pub struct Step {
    pub instance: OrchestrationInstance,

    /// Instances to wake once `instance` has been saved
    pub wake: Vec<Uuid>,
}

pub struct Coordinator {
    adapter: Arc<dyn ExecutionAdapter>,
    instances: Arc<dyn InstanceRepository>,
    signals: Arc<dyn SignalRepository>,
    poll: PollLoop,
    retry: RetryPolicy,
}

impl Coordinator {
    pub fn new(
        adapter: Arc<dyn ExecutionAdapter>,
        instances: Arc<dyn InstanceRepository>,
        signals: Arc<dyn SignalRepository>,
        poll: PollLoop,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            adapter,
            instances,
            signals,
            poll,
            retry,
        }
    }

    /// Performs the next step of `instance`
    pub async fn advance(
        &self,
        instance: OrchestrationInstance,
        now: DateTime<Utc>,
    ) -> EngineResult<Step> {
        let mut step = Step {
            instance,
            wake: Vec::new(),
        };

        match (step.instance.kind, step.instance.phase) {
            (_, Phase::Terminal) => {}
            (InstanceKind::Execute, Phase::NotStarted) => {
                self.begin_attempt(&mut step.instance, now).await?
            }
            (InstanceKind::Execute, Phase::Starting) => self.start(&mut step, now).await?,
            (InstanceKind::Execute, Phase::Polling) => match step.instance.correlation {
                CorrelationMode::Inline => self.poll_inline(&mut step, now).await?,
                CorrelationMode::Signalled => self.follow_checker(&mut step, now).await?,
            },
            (InstanceKind::Check, Phase::WaitingForCorrelation) => {
                self.await_signal(&mut step.instance, now).await?
            }
            (InstanceKind::Check, Phase::Polling) => self.poll_checker(&mut step, now).await?,
            (kind, phase) => {
                return Err(EngineError::invalid(
                    step.instance.id,
                    format!("{:?} instance in phase {}", kind, phase),
                ));
            }
        }

        Ok(step)
    }

    // =========================================================================
    // Execute instances
    // =========================================================================

    async fn begin_attempt(
        &self,
        instance: &mut OrchestrationInstance,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if let Err(e) = instance.request.validate() {
            warn!("Instance {} rejected: {}", instance.id, e);
            instance.fail(
                now,
                OrchestrationFailure::Validation {
                    message: e.to_string(),
                },
            );
            return Ok(());
        }

        if let Some(resume_at) = instance
            .resume_at(WaitReason::RetryBackoff)
            .filter(|resume_at| *resume_at > now)
        {
            debug!("Instance {} woken during backoff", instance.id);
            instance.next_wake_at = Some(resume_at);
            return Ok(());
        }

        instance.attempt += 1;
        let attempt = instance.attempt;
        instance.record(now, OrchestrationEvent::AttemptBegan { attempt });
        info!(
            "Instance {} beginning attempt {} of pipeline '{}'",
            instance.id,
            attempt,
            instance.pipeline_name()
        );

        if instance.correlation == CorrelationMode::Signalled {
            // The id only depends on the attempt number, so redoing this step
            // after a crash finds the checker created the first time.
            let checker_id = instance.checker_id_for_attempt(attempt);
            let checker = OrchestrationInstance::checker(
                checker_id,
                instance.request.clone(),
                Some(instance.id),
                now,
            );
            if !self.instances.insert_if_absent(&checker).await? {
                debug!("Checker {} was already dispatched", checker_id);
            }
            instance.check_instance_id = Some(checker_id);
            instance.record(
                now,
                OrchestrationEvent::CheckerDispatched {
                    check_instance_id: checker_id,
                },
            );
        }

        instance.phase = Phase::Starting;
        instance.next_wake_at = Some(now);
        Ok(())
    }

    async fn start(&self, step: &mut Step, now: DateTime<Utc>) -> EngineResult<()> {
        let status = match self.adapter.start(&step.instance.request).await {
            Ok(status) => status,
            Err(e) => {
                return self
                    .attempt_failed(step, e.to_string(), e.is_transient(), now)
                    .await;
            }
        };

        let instance = &mut step.instance;

        info!(
            "Pipeline '{}' started with run id {} (instance {}, attempt {})",
            instance.pipeline_name(),
            status.run_id,
            instance.id,
            instance.attempt
        );
        instance.run_id = Some(status.run_id.clone());
        instance.record(
            now,
            OrchestrationEvent::RunStarted {
                run_id: status.run_id.clone(),
            },
        );
        instance.last_status = Some(status);

        match instance.correlation {
            CorrelationMode::Inline => self.poll.enter(instance, now),
            CorrelationMode::Signalled => {
                // The run id is persisted before the signal goes out
                instance.phase = Phase::Polling;
                instance.next_wake_at = Some(now);
            }
        }
        Ok(())
    }

    async fn poll_inline(&self, step: &mut Step, now: DateTime<Utc>) -> EngineResult<()> {
        let run = step
            .instance
            .run_request()
            .ok_or_else(|| EngineError::invalid(step.instance.id, "polling without a run id"))?;

        match self
            .poll
            .poll_once(self.adapter.as_ref(), &mut step.instance, &run, now)
            .await
        {
            Ok(PollOutcome::Terminal(status)) => {
                info!(
                    "Pipeline '{}' run {} finished as {} (instance {})",
                    run.pipeline_name(),
                    run.run_id,
                    status.actual_status,
                    step.instance.id
                );
                step.instance.complete(now, status);
                Ok(())
            }
            Ok(PollOutcome::Pending | PollOutcome::NotDue) => Ok(()),
            Err(e) => {
                self.attempt_failed(step, e.to_string(), e.is_transient(), now)
                    .await
            }
        }
    }

    /// Polling step of a signalled execute instance
    ///
    /// The checker does the polling. The parent makes sure the signal reached
    /// it, mirrors its latest status and adopts its outcome once it is
    /// terminal. Besides being woken by the checker, the parent re-reads the
    /// checker every poll interval.
    async fn follow_checker(&self, step: &mut Step, now: DateTime<Utc>) -> EngineResult<()> {
        let id = step.instance.id;
        let checker_id = step
            .instance
            .check_instance_id
            .ok_or_else(|| EngineError::invalid(id, "no checker dispatched"))?;
        let run_id = step
            .instance
            .run_id
            .clone()
            .ok_or_else(|| EngineError::invalid(id, "polling without a run id"))?;
        let checker = self
            .instances
            .find_by_id(checker_id)
            .await?
            .ok_or(StoreError::NotFound(checker_id))?;

        let phase = checker.phase;
        match phase {
            Phase::Terminal => return self.adopt(step, checker, now).await,
            Phase::WaitingForCorrelation => {
                let delivery = self
                    .signals
                    .deliver(checker_id, &RunStartedSignal { run_id: run_id.clone() }, now)
                    .await?;

                let first = step.instance.count_events(|event| {
                    matches!(
                        event,
                        OrchestrationEvent::SignalDelivered { check_instance_id, .. }
                            if *check_instance_id == checker_id
                    )
                }) == 0;
                if first {
                    info!(
                        "Delivered run id {} to checker {} (instance {})",
                        run_id, checker_id, id
                    );
                    step.instance.record(
                        now,
                        OrchestrationEvent::SignalDelivered {
                            check_instance_id: checker_id,
                            duplicate: delivery == Delivery::Duplicate,
                        },
                    );
                }
                step.wake.push(checker_id);
            }
            _ => {
                if checker.last_status.is_some() {
                    step.instance.last_status = checker.last_status;
                }
            }
        }

        step.instance.updated_at = now;
        step.instance.next_wake_at = Some(after(now, self.poll.interval()));
        Ok(())
    }

    async fn adopt(
        &self,
        step: &mut Step,
        checker: OrchestrationInstance,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if let Some(status) = checker.output {
            info!(
                "Pipeline '{}' run {} finished as {} (instance {}, checker {})",
                step.instance.pipeline_name(),
                status.run_id,
                status.actual_status,
                step.instance.id,
                checker.id
            );
            step.instance.last_status = Some(status.clone());
            step.instance.complete(now, status);
            return Ok(());
        }

        match checker.failure {
            Some(OrchestrationFailure::Transient { message, .. }) => {
                self.attempt_failed(step, message, true, now).await
            }
            Some(OrchestrationFailure::Adapter { message, .. }) => {
                self.attempt_failed(step, message, false, now).await
            }
            Some(other) => {
                step.instance.fail(now, other);
                Ok(())
            }
            None => Err(EngineError::invalid(
                checker.id,
                "terminal checker without output or failure",
            )),
        }
    }

    /// Records a failed attempt and applies the retry policy
    async fn attempt_failed(
        &self,
        step: &mut Step,
        message: String,
        transient: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let attempt = step.instance.attempt;
        warn!(
            "Attempt {} of pipeline '{}' failed (instance {}, transient: {}): {}",
            attempt,
            step.instance.pipeline_name(),
            step.instance.id,
            transient,
            message
        );
        step.instance.record(
            now,
            OrchestrationEvent::AttemptFailed {
                attempt,
                error: message.clone(),
                transient,
            },
        );

        if let Some(checker_id) = step.instance.check_instance_id.take() {
            self.abandon_checker(checker_id, attempt, now).await?;
        }

        let instance = &mut step.instance;
        match self.retry.decide(attempt, transient) {
            RetryDecision::RetryAfter(backoff) => {
                instance.phase = Phase::NotStarted;
                instance.suspend(now, WaitReason::RetryBackoff, after(now, backoff));
            }
            RetryDecision::Exhausted => {
                let failure = OrchestrationFailure::RetriesExhausted {
                    pipeline_name: instance.pipeline_name().to_string(),
                    run_id: instance.run_id.clone(),
                    attempts: attempt,
                    last_error: message,
                };
                error!("Instance {} failed: {}", instance.id, failure);
                instance.fail(now, failure);
            }
            RetryDecision::GiveUp => {
                let failure = OrchestrationFailure::Adapter {
                    message,
                    run_id: instance.run_id.clone(),
                };
                error!("Instance {} failed: {}", instance.id, failure);
                instance.fail(now, failure);
            }
        }
        Ok(())
    }

    async fn abandon_checker(
        &self,
        checker_id: Uuid,
        attempt: u32,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let Some(mut checker) = self.instances.find_by_id(checker_id).await? else {
            return Ok(());
        };
        if checker.is_terminal() {
            return Ok(());
        }

        debug!("Abandoning checker {} of attempt {}", checker_id, attempt);
        checker.fail(now, OrchestrationFailure::Abandoned { attempt });
        self.instances.save(&checker).await?;
        Ok(())
    }

    // =========================================================================
    // Check instances
    // =========================================================================

    async fn await_signal(
        &self,
        instance: &mut OrchestrationInstance,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        match self.signals.take(instance.id, now).await? {
            Some(signal) => {
                info!(
                    "Checker {} received run id {} for pipeline '{}'",
                    instance.id,
                    signal.run_id,
                    instance.pipeline_name()
                );
                instance.run_id = Some(signal.run_id.clone());
                instance.record(
                    now,
                    OrchestrationEvent::SignalReceived {
                        run_id: signal.run_id,
                    },
                );
                self.poll.enter(instance, now);
            }
            None => {
                debug!("Checker {} has no signal yet", instance.id);
                instance.park(now);
            }
        }
        Ok(())
    }

    async fn poll_checker(&self, step: &mut Step, now: DateTime<Utc>) -> EngineResult<()> {
        let run = step
            .instance
            .run_request()
            .ok_or_else(|| EngineError::invalid(step.instance.id, "polling without a run id"))?;

        match self
            .poll
            .poll_once(self.adapter.as_ref(), &mut step.instance, &run, now)
            .await
        {
            Ok(PollOutcome::Terminal(status)) => {
                info!(
                    "Checker {} saw pipeline '{}' run {} finish as {}",
                    step.instance.id,
                    run.pipeline_name(),
                    run.run_id,
                    status.actual_status
                );
                step.instance.complete(now, status);
            }
            Ok(PollOutcome::Pending | PollOutcome::NotDue) => return Ok(()),
            Err(e) => {
                let message = e.to_string();
                let run_id = Some(run.run_id.clone());
                let failure = if e.is_transient() {
                    OrchestrationFailure::Transient { message, run_id }
                } else {
                    OrchestrationFailure::Adapter { message, run_id }
                };
                warn!("Checker {} failed: {}", step.instance.id, failure);
                step.instance.fail(now, failure);
            }
        }

        if let Some(parent) = step.instance.parent_id {
            step.wake.push(parent);
        }
        Ok(())
    }
}
