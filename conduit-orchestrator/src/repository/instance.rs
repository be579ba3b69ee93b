//! Instance Repository (Postgres)
//!
//! The full record is stored as JSONB in `body`; the scalar columns next to it
//! exist for querying. `next_wake_at` is the one column that can change
//! without a full save (see [`InstanceRepository::wake`]), so it always wins
//! over the copy inside `body` when a row is loaded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit_core::domain::orchestration::{InstanceKind, OrchestrationInstance};
use sqlx::PgPool;
use uuid::Uuid;

use super::{InstanceRepository, StoreResult};

#[derive(Clone)]
pub struct PgInstanceRepository {
    pool: PgPool,
}

impl PgInstanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Writes the instance and sets (or clears) its claim in one statement
    async fn update(
        &self,
        instance: &OrchestrationInstance,
        claimed_until: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orchestration_instances
            SET phase = $2, run_id = $3, attempt = $4, next_wake_at = $5,
                claimed_until = $6, body = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(instance.id)
        .bind(instance.phase.to_string())
        .bind(&instance.run_id)
        .bind(instance.attempt as i32)
        .bind(instance.next_wake_at)
        .bind(claimed_until)
        .bind(serde_json::to_value(instance)?)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(super::StoreError::NotFound(instance.id));
        }

        Ok(())
    }
}

#[async_trait]
impl InstanceRepository for PgInstanceRepository {
    async fn insert(&self, instance: &OrchestrationInstance) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orchestration_instances
                (id, kind, parent_id, pipeline_name, phase, run_id, attempt,
                 next_wake_at, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(instance.id)
        .bind(kind_to_string(instance.kind))
        .bind(instance.parent_id)
        .bind(instance.pipeline_name())
        .bind(instance.phase.to_string())
        .bind(&instance.run_id)
        .bind(instance.attempt as i32)
        .bind(instance.next_wake_at)
        .bind(serde_json::to_value(instance)?)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_if_absent(&self, instance: &OrchestrationInstance) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO orchestration_instances
                (id, kind, parent_id, pipeline_name, phase, run_id, attempt,
                 next_wake_at, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(instance.id)
        .bind(kind_to_string(instance.kind))
        .bind(instance.parent_id)
        .bind(instance.pipeline_name())
        .bind(instance.phase.to_string())
        .bind(&instance.run_id)
        .bind(instance.attempt as i32)
        .bind(instance.next_wake_at)
        .bind(serde_json::to_value(instance)?)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
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
        let row = sqlx::query_as::<_, InstanceRow>(
            r#"
            SELECT body, next_wake_at
            FROM orchestration_instances
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrchestrationInstance::try_from).transpose()
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<OrchestrationInstance>> {
        let rows = sqlx::query_as::<_, InstanceRow>(
            r#"
            SELECT body, next_wake_at
            FROM orchestration_instances
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrchestrationInstance::try_from).collect()
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<OrchestrationInstance>> {
        let rows = sqlx::query_as::<_, InstanceRow>(
            r#"
            UPDATE orchestration_instances
            SET claimed_until = $2
            WHERE id IN (
                SELECT id FROM orchestration_instances
                WHERE phase <> 'Terminal'
                  AND next_wake_at <= $1
                  AND (claimed_until IS NULL OR claimed_until <= $1)
                ORDER BY next_wake_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING body, next_wake_at
            "#,
        )
        .bind(now)
        .bind(lease_until)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrchestrationInstance::try_from).collect()
    }

    async fn wake(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orchestration_instances
            SET next_wake_at = LEAST(COALESCE(next_wake_at, $2), $2)
            WHERE id = $1 AND phase <> 'Terminal'
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn kind_to_string(kind: InstanceKind) -> &'static str {
    match kind {
        InstanceKind::Execute => "Execute",
        InstanceKind::Check => "Check",
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct InstanceRow {
    body: serde_json::Value,
    next_wake_at: Option<DateTime<Utc>>,
}

impl TryFrom<InstanceRow> for OrchestrationInstance {
    type Error = super::StoreError;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        let mut instance: OrchestrationInstance = serde_json::from_value(row.body)?;
        instance.next_wake_at = row.next_wake_at;
        Ok(instance)
    }
}
