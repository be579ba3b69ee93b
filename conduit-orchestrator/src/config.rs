//! Orchestrator configuration
//!
//! Everything is read from environment variables with defaults suitable for
//! local development.

use std::time::Duration;

use crate::engine::{PollLoop, RetryPolicy};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string; `None` keeps all state in memory
    pub database_url: Option<String>,

    /// Address the HTTP API binds to
    pub bind_addr: String,

    /// Base URL of the execution service (e.g., "http://localhost:7071")
    pub execution_service_url: String,

    /// Wait between two Checks of the same run
    pub poll_interval: Duration,

    /// Attempts per execution, including the first
    pub retry_count: u32,

    /// Wait before a failed attempt is retried
    pub retry_backoff: Duration,

    /// How often the scheduler looks for due instances
    pub scheduler_tick: Duration,

    /// Instances advanced concurrently per tick
    pub max_parallel_instances: usize,

    /// How long a claimed instance is hidden from other schedulers
    pub claim_lease: Duration,

    /// Timeout of a single call to the execution service
    pub adapter_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(execution_service_url: String) -> Self {
        Self {
            database_url: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            execution_service_url,
            poll_interval: Duration::from_secs(5),
            retry_count: 5,
            retry_backoff: Duration::from_secs(10),
            scheduler_tick: Duration::from_millis(1000),
            max_parallel_instances: 8,
            claim_lease: Duration::from_secs(60),
            adapter_timeout: Duration::from_secs(30),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - DATABASE_URL (no default; in-memory state when unset)
    /// - ORCHESTRATOR_BIND_ADDR (default: 0.0.0.0:8080)
    /// - EXECUTION_SERVICE_URL (default: http://localhost:7071)
    /// - POLL_INTERVAL (seconds, default: 5)
    /// - RETRY_COUNT (default: 5)
    /// - RETRY_BACKOFF (seconds, default: 10)
    /// - SCHEDULER_TICK_MS (milliseconds, default: 1000)
    /// - MAX_PARALLEL_INSTANCES (default: 8)
    /// - CLAIM_LEASE (seconds, default: 60)
    /// - ADAPTER_TIMEOUT (seconds, default: 30)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let execution_service_url = std::env::var("EXECUTION_SERVICE_URL")
            .unwrap_or(defaults.execution_service_url);

        let bind_addr = std::env::var("ORCHESTRATOR_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let retry_count = std::env::var("RETRY_COUNT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.retry_count);

        let max_parallel_instances = std::env::var("MAX_PARALLEL_INSTANCES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.max_parallel_instances);

        let scheduler_tick = std::env::var("SCHEDULER_TICK_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.scheduler_tick);

        Ok(Self {
            database_url,
            bind_addr,
            execution_service_url,
            poll_interval: env_secs("POLL_INTERVAL").unwrap_or(defaults.poll_interval),
            retry_count,
            retry_backoff: env_secs("RETRY_BACKOFF").unwrap_or(defaults.retry_backoff),
            scheduler_tick,
            max_parallel_instances,
            claim_lease: env_secs("CLAIM_LEASE").unwrap_or(defaults.claim_lease),
            adapter_timeout: env_secs("ADAPTER_TIMEOUT").unwrap_or(defaults.adapter_timeout),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.execution_service_url.starts_with("http://")
            && !self.execution_service_url.starts_with("https://")
        {
            anyhow::bail!("execution_service_url must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.retry_count == 0 {
            anyhow::bail!("retry_count must be at least 1");
        }

        if self.scheduler_tick.is_zero() {
            anyhow::bail!("scheduler_tick must be greater than 0");
        }

        if self.max_parallel_instances == 0 {
            anyhow::bail!("max_parallel_instances must be greater than 0");
        }

        // A lease shorter than one adapter call lets a second scheduler take
        // over an instance that is still being advanced.
        if self.claim_lease <= self.adapter_timeout {
            anyhow::bail!("claim_lease must be longer than adapter_timeout");
        }

        Ok(())
    }

    pub fn poll_loop(&self) -> PollLoop {
        PollLoop::new(self.poll_interval)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, self.retry_backoff)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://localhost:7071".to_string())
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.retry_count, 5);
        assert_eq!(config.retry_backoff, Duration::from_secs(10));
        assert!(config.database_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.execution_service_url = "localhost:7071".to_string();
        assert!(config.validate().is_err());
        config.execution_service_url = "https://runs.example.com".to_string();
        assert!(config.validate().is_ok());

        config.retry_count = 0;
        assert!(config.validate().is_err());
        config.retry_count = 1;

        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.poll_interval = Duration::from_secs(1);

        config.claim_lease = config.adapter_timeout;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_engine_settings() {
        let mut config = Config::default();
        config.retry_count = 3;
        config.poll_interval = Duration::from_secs(2);

        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.poll_loop().interval(), Duration::from_secs(2));
    }
}
