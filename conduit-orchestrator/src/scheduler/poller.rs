//! Instance poller
//!
//! Claims due instances from the store and advances each one in its own task.
//! A claim is a lease: if this process dies mid-step, the instance becomes
//! due again once the lease expires and is resumed from its persisted phase.

use conduit_core::domain::orchestration::OrchestrationInstance;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::clock::after;
use crate::engine::{Clock, Coordinator, EngineResult};
use crate::repository::{InstanceRepository, StoreResult};

/// Upper bound on back-to-back steps for one claim
///
/// Steps that need no waiting (attempt bookkeeping, signal hand-off) run
/// immediately; anything left after this many steps waits for the next tick.
const MAX_STEPS_PER_CLAIM: usize = 8;

pub struct InstancePoller {
    tick: Duration,
    lease: Duration,
    coordinator: Arc<Coordinator>,
    instances: Arc<dyn InstanceRepository>,
    clock: Arc<dyn Clock>,
    semaphore: Arc<Semaphore>,
}

impl InstancePoller {
    pub fn new(
        config: &Config,
        coordinator: Arc<Coordinator>,
        instances: Arc<dyn InstanceRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tick: config.scheduler_tick,
            lease: config.claim_lease,
            coordinator,
            instances,
            clock,
            semaphore: Arc::new(Semaphore::new(config.max_parallel_instances)),
        }
    }

    /// Starts the scheduling loop
    pub async fn run(&self) {
        info!(
            "Starting instance poller (tick: {:?}, lease: {:?})",
            self.tick, self.lease
        );

        let mut interval = time::interval(self.tick);

        loop {
            interval.tick().await;

            match self.run_once().await {
                Ok(advanced) => {
                    if advanced > 0 {
                        debug!("Advanced {} instance(s) this tick", advanced);
                    }
                }
                Err(e) => {
                    error!("Error during scheduler tick: {}", e);
                }
            }
        }
    }

    /// Performs a single scheduling cycle and waits for it to finish
    pub async fn run_once(&self) -> StoreResult<usize> {
        let capacity = self.semaphore.available_permits();
        if capacity == 0 {
            return Ok(0);
        }

        let now = self.clock.now();
        let claimed = self
            .instances
            .claim_due(now, after(now, self.lease), capacity)
            .await?;

        if claimed.is_empty() {
            return Ok(0);
        }

        debug!("Claimed {} due instance(s)", claimed.len());

        let mut handles = Vec::with_capacity(claimed.len());
        for instance in claimed {
            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                warn!("Scheduler semaphore closed, leaving instance {} to its lease", instance.id);
                break;
            };
            handles.push(self.spawn_instance_task(instance, permit));
        }

        let advanced = handles.len();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Instance task panicked: {}", e);
            }
        }

        Ok(advanced)
    }

    fn spawn_instance_task(
        &self,
        instance: OrchestrationInstance,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) -> tokio::task::JoinHandle<()> {
        let coordinator = Arc::clone(&self.coordinator);
        let instances = Arc::clone(&self.instances);
        let clock = Arc::clone(&self.clock);
        let lease = self.lease;

        tokio::spawn(async move {
            let id = instance.id;
            if let Err(e) = Self::drive(instance, coordinator, instances, clock, lease).await {
                // The claim stays until its lease runs out, then the step is retried
                error!("Failed to advance instance {}: {}", id, e);
            }
            drop(permit);
        })
    }

    /// Advances one claimed instance while it stays due
    ///
    /// Intermediate saves renew the claim; only the last save of the claim
    /// releases it.
    async fn drive(
        mut instance: OrchestrationInstance,
        coordinator: Arc<Coordinator>,
        instances: Arc<dyn InstanceRepository>,
        clock: Arc<dyn Clock>,
        lease: Duration,
    ) -> EngineResult<()> {
        for remaining in (0..MAX_STEPS_PER_CLAIM).rev() {
            let now = clock.now();
            let step = coordinator.advance(instance, now).await?;

            let after_step = clock.now();
            let keep_going = remaining > 0 && step.instance.is_due(after_step);
            if keep_going {
                instances
                    .save_claimed(&step.instance, after(after_step, lease))
                    .await?;
            } else {
                instances.save(&step.instance).await?;
            }

            for id in &step.wake {
                if !instances.wake(*id, now).await? {
                    debug!("Instance {} is already terminal, not waking it", id);
                }
            }

            if !keep_going {
                return Ok(());
            }
            instance = step.instance;
        }

        Ok(())
    }
}
