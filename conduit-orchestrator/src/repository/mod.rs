//! Repository Module
//!
//! Durable state for the orchestrator: instance records and the signal
//! mailbox. Each concern has a trait, a Postgres implementation and an
//! in-memory implementation used when no database is configured and in tests.

pub mod instance;
pub mod memory;
pub mod signal;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit_core::domain::orchestration::{OrchestrationInstance, RunStartedSignal};
use thiserror::Error;
use uuid::Uuid;

pub use instance::PgInstanceRepository;
pub use memory::{InMemoryInstanceRepository, InMemorySignalRepository};
pub use signal::PgSignalRepository;

/// Errors raised by the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to (de)serialize instance: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Instance not found: {0}")]
    NotFound(Uuid),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence for orchestration instances
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Inserts a new instance; fails if the id exists
    async fn insert(&self, instance: &OrchestrationInstance) -> StoreResult<()>;

    /// Inserts unless an instance with the same id exists
    ///
    /// Returns `true` when the record was created by this call.
    async fn insert_if_absent(&self, instance: &OrchestrationInstance) -> StoreResult<bool>;

    /// Overwrites an existing instance and releases its claim
    async fn save(&self, instance: &OrchestrationInstance) -> StoreResult<()>;

    /// Overwrites an existing instance and keeps it claimed until `lease_until`
    ///
    /// Used between steps of one claim so no other scheduler can pick the
    /// instance up while it is still being advanced.
    async fn save_claimed(
        &self,
        instance: &OrchestrationInstance,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<OrchestrationInstance>>;

    /// Most recently created instances first
    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<OrchestrationInstance>>;

    /// Claims up to `limit` due instances until `lease_until`
    ///
    /// A claimed instance is not returned again before its lease expires or
    /// it is released by [`save`](Self::save), so two schedulers never
    /// advance the same instance.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<OrchestrationInstance>>;

    /// Makes a non-terminal instance due no later than `at`
    ///
    /// Returns `false` when the instance is missing or already terminal.
    async fn wake(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;
}

/// Whether a delivered signal was new
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Duplicate,
}

/// One-shot mailbox keyed by the receiving instance id
#[async_trait]
pub trait SignalRepository: Send + Sync {
    /// Stores the signal unless one was already delivered to this instance
    async fn deliver(
        &self,
        instance_id: Uuid,
        signal: &RunStartedSignal,
        at: DateTime<Utc>,
    ) -> StoreResult<Delivery>;

    /// Returns the signal delivered to this instance, marking it consumed
    ///
    /// The first delivered signal always wins. Reading it again after a crash
    /// returns the same value, so a checker that consumed it but was not yet
    /// saved can safely resume.
    async fn take(
        &self,
        instance_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RunStartedSignal>>;
}
