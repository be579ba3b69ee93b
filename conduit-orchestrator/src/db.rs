use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Orchestration state; `body` holds the full instance, the other columns
    // are what the scheduler filters on
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orchestration_instances (
            id UUID PRIMARY KEY,
            kind VARCHAR(20) NOT NULL,
            parent_id UUID,
            pipeline_name VARCHAR(255) NOT NULL,
            phase VARCHAR(20) NOT NULL,
            run_id VARCHAR(255),
            attempt INTEGER NOT NULL DEFAULT 0,
            next_wake_at TIMESTAMPTZ,
            claimed_until TIMESTAMPTZ,
            body JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One correlation signal per check instance
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orchestration_signals (
            instance_id UUID PRIMARY KEY REFERENCES orchestration_instances(id) ON DELETE CASCADE,
            run_id VARCHAR(255) NOT NULL,
            delivered_at TIMESTAMPTZ NOT NULL,
            consumed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_instances_due
            ON orchestration_instances(next_wake_at) WHERE phase <> 'Terminal'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_instances_created_at
            ON orchestration_instances(created_at DESC)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_instances_parent_id ON orchestration_instances(parent_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
