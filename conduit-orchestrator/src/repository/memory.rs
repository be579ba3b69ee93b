//! In-memory repositories
//!
//! Used when the orchestrator runs without `DATABASE_URL` and by the engine
//! tests. State lives only as long as the process; semantics match the
//! Postgres implementations, including claim leases.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit_core::domain::orchestration::{OrchestrationInstance, RunStartedSignal};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Delivery, InstanceRepository, SignalRepository, StoreError, StoreResult};

struct StoredInstance {
    instance: OrchestrationInstance,
    claimed_until: Option<DateTime<Utc>>,
}

/// Instance store backed by a map
#[derive(Default)]
pub struct InMemoryInstanceRepository {
    instances: Mutex<HashMap<Uuid, StoredInstance>>,
}

impl InMemoryInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update(
        &self,
        instance: &OrchestrationInstance,
        claimed_until: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut instances = self.instances.lock().await;
        let stored = instances
            .get_mut(&instance.id)
            .ok_or(StoreError::NotFound(instance.id))?;
        stored.instance = instance.clone();
        stored.claimed_until = claimed_until;
        Ok(())
    }
}

#[async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn insert(&self, instance: &OrchestrationInstance) -> StoreResult<()> {
        // Same failure surface as a primary key violation would have
        if !self.insert_if_absent(instance).await? {
            return Err(StoreError::Database(sqlx::Error::Protocol(format!(
                "duplicate instance id {}",
                instance.id
            ))));
        }
        Ok(())
    }

    async fn insert_if_absent(&self, instance: &OrchestrationInstance) -> StoreResult<bool> {
        let mut instances = self.instances.lock().await;
        if instances.contains_key(&instance.id) {
            return Ok(false);
        }
        instances.insert(
            instance.id,
            StoredInstance {
                instance: instance.clone(),
                claimed_until: None,
            },
        );
        Ok(true)
    }

    async fn save(&self, instance: &OrchestrationInstance) -> StoreResult<()> {
        self.update(instance, None).await
    }

    async fn save_claimed(
        &self,
        instance: &OrchestrationInstance,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.update(instance, Some(lease_until)).await
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<OrchestrationInstance>> {
        let instances = self.instances.lock().await;
        Ok(instances.get(&id).map(|stored| stored.instance.clone()))
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<OrchestrationInstance>> {
        let instances = self.instances.lock().await;
        let mut all: Vec<OrchestrationInstance> =
            instances.values().map(|stored| stored.instance.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<OrchestrationInstance>> {
        let mut instances = self.instances.lock().await;

        let mut due: Vec<&mut StoredInstance> = instances
            .values_mut()
            .filter(|stored| {
                stored.instance.is_due(now)
                    && stored.claimed_until.is_none_or(|lease| lease <= now)
            })
            .collect();
        due.sort_by_key(|stored| stored.instance.next_wake_at);

        Ok(due
            .into_iter()
            .take(limit)
            .map(|stored| {
                stored.claimed_until = Some(lease_until);
                stored.instance.clone()
            })
            .collect())
    }

    async fn wake(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut instances = self.instances.lock().await;
        match instances.get_mut(&id) {
            Some(stored) if !stored.instance.is_terminal() => {
                let wake = stored.instance.next_wake_at.map_or(at, |current| current.min(at));
                stored.instance.next_wake_at = Some(wake);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Signal mailbox backed by a map
///
/// Only the first signal per instance is kept. Consumption is not tracked
/// separately; the receiving checker leaves its waiting phase exactly once.
#[derive(Default)]
pub struct InMemorySignalRepository {
    slots: Mutex<HashMap<Uuid, RunStartedSignal>>,
}

impl InMemorySignalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalRepository for InMemorySignalRepository {
    async fn deliver(
        &self,
        instance_id: Uuid,
        signal: &RunStartedSignal,
        _at: DateTime<Utc>,
    ) -> StoreResult<Delivery> {
        let mut slots = self.slots.lock().await;
        if slots.contains_key(&instance_id) {
            return Ok(Delivery::Duplicate);
        }
        slots.insert(instance_id, signal.clone());
        Ok(Delivery::Delivered)
    }

    async fn take(
        &self,
        instance_id: Uuid,
        _at: DateTime<Utc>,
    ) -> StoreResult<Option<RunStartedSignal>> {
        let slots = self.slots.lock().await;
        Ok(slots.get(&instance_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_request as request;
    use conduit_core::domain::orchestration::CorrelationMode;

    #[tokio::test]
    async fn test_claimed_instance_is_not_claimed_twice() {
        let repo = InMemoryInstanceRepository::new();
        let now = Utc::now();
        let instance = OrchestrationInstance::execute(request(), CorrelationMode::Inline, now);
        repo.insert(&instance).await.unwrap();

        let lease = now + chrono::Duration::seconds(60);
        assert_eq!(repo.claim_due(now, lease, 10).await.unwrap().len(), 1);
        assert!(repo.claim_due(now, lease, 10).await.unwrap().is_empty());

        // Lease expiry makes it claimable again
        let later = lease + chrono::Duration::seconds(1);
        assert_eq!(repo.claim_due(later, later, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_releases_claim() {
        let repo = InMemoryInstanceRepository::new();
        let now = Utc::now();
        let instance = OrchestrationInstance::execute(request(), CorrelationMode::Inline, now);
        repo.insert(&instance).await.unwrap();

        let claimed = repo
            .claim_due(now, now + chrono::Duration::seconds(60), 10)
            .await
            .unwrap();
        repo.save(&claimed[0]).await.unwrap();

        assert_eq!(
            repo.claim_due(now, now + chrono::Duration::seconds(60), 10)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_save_claimed_keeps_claim() {
        let repo = InMemoryInstanceRepository::new();
        let now = Utc::now();
        let instance = OrchestrationInstance::execute(request(), CorrelationMode::Inline, now);
        repo.insert(&instance).await.unwrap();

        let lease = now + chrono::Duration::seconds(60);
        let claimed = repo.claim_due(now, lease, 10).await.unwrap();
        repo.save_claimed(&claimed[0], lease).await.unwrap();

        assert!(repo.claim_due(now, lease, 10).await.unwrap().is_empty());
        let later = lease + chrono::Duration::seconds(1);
        assert_eq!(repo.claim_due(later, later, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let repo = InMemoryInstanceRepository::new();
        let instance =
            OrchestrationInstance::execute(request(), CorrelationMode::Inline, Utc::now());
        repo.insert(&instance).await.unwrap();

        assert!(!repo.insert_if_absent(&instance).await.unwrap());
        assert!(repo.insert(&instance).await.is_err());
    }

    #[tokio::test]
    async fn test_wake_unparks_and_never_delays() {
        let repo = InMemoryInstanceRepository::new();
        let now = Utc::now();
        let checker = OrchestrationInstance::checker(Uuid::new_v4(), request(), None, now);
        repo.insert(&checker).await.unwrap();

        assert!(repo.wake(checker.id, now).await.unwrap());
        let woken = repo.find_by_id(checker.id).await.unwrap().unwrap();
        assert_eq!(woken.next_wake_at, Some(now));

        repo.wake(checker.id, now + chrono::Duration::seconds(30))
            .await
            .unwrap();
        let still = repo.find_by_id(checker.id).await.unwrap().unwrap();
        assert_eq!(still.next_wake_at, Some(now));
    }

    #[tokio::test]
    async fn test_wake_ignores_unknown_instances() {
        let repo = InMemoryInstanceRepository::new();
        assert!(!repo.wake(Uuid::new_v4(), Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_first_signal_wins() {
        let mailbox = InMemorySignalRepository::new();
        let id = Uuid::new_v4();
        let now = Utc::now();

        let first = RunStartedSignal {
            run_id: "z9".to_string(),
        };
        let late = RunStartedSignal {
            run_id: "other".to_string(),
        };
        assert_eq!(
            mailbox.deliver(id, &first, now).await.unwrap(),
            Delivery::Delivered
        );
        assert_eq!(
            mailbox.deliver(id, &late, now).await.unwrap(),
            Delivery::Duplicate
        );

        assert_eq!(mailbox.take(id, now).await.unwrap(), Some(first.clone()));
        assert_eq!(mailbox.take(id, now).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_take_without_signal() {
        let mailbox = InMemorySignalRepository::new();
        assert!(mailbox.take(Uuid::new_v4(), Utc::now()).await.unwrap().is_none());
    }
}
