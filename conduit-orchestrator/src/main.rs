use anyhow::Context;
use conduit_client::{ExecutionAdapter, HttpExecutionAdapter};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod repository;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod testing;

use config::Config;
use engine::{Clock, Coordinator, SystemClock};
use repository::{
    InMemoryInstanceRepository, InMemorySignalRepository, InstanceRepository,
    PgInstanceRepository, PgSignalRepository, SignalRepository,
};
use scheduler::InstancePoller;
use service::ExecutionService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conduit_orchestrator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Conduit Orchestrator...");

    let config = Config::from_env()?;
    config.validate()?;

    let http_client = reqwest::Client::builder()
        .timeout(config.adapter_timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let adapter: Arc<dyn ExecutionAdapter> = Arc::new(HttpExecutionAdapter::with_client(
        &config.execution_service_url,
        http_client,
    ));

    tracing::info!("Execution service: {}", config.execution_service_url);

    let instances: Arc<dyn InstanceRepository>;
    let signals: Arc<dyn SignalRepository>;
    match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url)
                .await
                .context("Failed to create database pool")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            instances = Arc::new(PgInstanceRepository::new(pool.clone()));
            signals = Arc::new(PgSignalRepository::new(pool));
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orchestration state is kept in memory only");
            instances = Arc::new(InMemoryInstanceRepository::new());
            signals = Arc::new(InMemorySignalRepository::new());
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let coordinator = Arc::new(Coordinator::new(
        adapter.clone(),
        instances.clone(),
        signals.clone(),
        config.poll_loop(),
        config.retry_policy(),
    ));

    let poller = InstancePoller::new(&config, coordinator, instances.clone(), clock.clone());
    tokio::spawn(async move { poller.run().await });

    let service = Arc::new(ExecutionService::new(adapter, instances, signals, clock));

    // Build router with all API endpoints
    let app = api::create_router(service);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
