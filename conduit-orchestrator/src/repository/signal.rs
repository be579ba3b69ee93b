//! Signal mailbox (Postgres)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit_core::domain::orchestration::RunStartedSignal;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Delivery, SignalRepository, StoreResult};

#[derive(Clone)]
pub struct PgSignalRepository {
    pool: PgPool,
}

impl PgSignalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalRepository for PgSignalRepository {
    async fn deliver(
        &self,
        instance_id: Uuid,
        signal: &RunStartedSignal,
        at: DateTime<Utc>,
    ) -> StoreResult<Delivery> {
        let result = sqlx::query(
            r#"
            INSERT INTO orchestration_signals (instance_id, run_id, delivered_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (instance_id) DO NOTHING
            "#,
        )
        .bind(instance_id)
        .bind(&signal.run_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() > 0 {
            Delivery::Delivered
        } else {
            Delivery::Duplicate
        })
    }

    async fn take(
        &self,
        instance_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RunStartedSignal>> {
        let run_id: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE orchestration_signals
            SET consumed_at = COALESCE(consumed_at, $2)
            WHERE instance_id = $1
            RETURNING run_id
            "#,
        )
        .bind(instance_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(run_id.map(|run_id| RunStartedSignal { run_id }))
    }
}
