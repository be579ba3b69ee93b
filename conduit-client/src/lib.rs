//! Conduit Execution Adapter
//!
//! The boundary between the orchestrator and the external service that owns
//! pipeline runs. The orchestration engine only ever sees the
//! [`ExecutionAdapter`] trait; [`HttpExecutionAdapter`] is the production
//! implementation talking to the service's REST front door.
//!
//! # Example
//!
//! ```no_run
//! use conduit_client::{ExecutionAdapter, HttpExecutionAdapter};
//! use conduit_core::domain::pipeline::{OrchestratorType, PipelineRequest};
//!
//! #[tokio::main]
//! async fn main() -> conduit_client::Result<()> {
//!     let adapter = HttpExecutionAdapter::new("http://localhost:7071");
//!
//!     let status = adapter.start(&PipelineRequest {
//!         tenant_id: "tenant".to_string(),
//!         application_id: None,
//!         authentication_key: None,
//!         subscription_id: "subscription".to_string(),
//!         resource_group_name: "rg".to_string(),
//!         orchestrator_type: OrchestratorType::DataFactory,
//!         orchestrator_name: "factory".to_string(),
//!         pipeline_name: "Ingest".to_string(),
//!         pipeline_parameters: Default::default(),
//!     }).await?;
//!
//!     println!("Started run: {}", status.run_id);
//!     Ok(())
//! }
//! ```

pub mod error;
mod runs;

// Re-export commonly used types
pub use error::{AdapterError, Result};

use async_trait::async_trait;
use conduit_core::domain::error_detail::PipelineErrorDetail;
use conduit_core::domain::pipeline::{PipelineDescription, PipelineRequest, PipelineRunRequest};
use conduit_core::domain::run::PipelineRunStatus;
use reqwest::Client;
use serde::de::DeserializeOwned;

/// Operations the orchestrator needs from the execution service
///
/// Every call is a single request/response; none of them retry internally.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Starts a pipeline run; the returned status carries a non-empty run id
    async fn start(&self, request: &PipelineRequest) -> Result<PipelineRunStatus>;

    /// Reads the current status of a run without side effects
    async fn check(&self, request: &PipelineRunRequest) -> Result<PipelineRunStatus>;

    /// Requests cancellation of a run and returns the post-cancel status
    async fn cancel(&self, request: &PipelineRunRequest) -> Result<PipelineRunStatus>;

    /// Fetches activity-level errors for a finished run
    async fn errors(&self, request: &PipelineRunRequest) -> Result<PipelineErrorDetail>;

    /// Describes the pipeline definition without running it
    async fn validate(&self, request: &PipelineRequest) -> Result<PipelineDescription>;
}

/// HTTP implementation of [`ExecutionAdapter`]
#[derive(Debug, Clone)]
pub struct HttpExecutionAdapter {
    /// Base URL of the execution service (e.g., "http://localhost:7071")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl HttpExecutionAdapter {
    /// Create a new adapter for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new adapter with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use conduit_client::HttpExecutionAdapter;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let adapter = HttpExecutionAdapter::with_client("http://localhost:7071", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the execution service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/api/pipelines/{}", self.base_url, operation)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Checks the status code and deserializes the JSON body
    ///
    /// `run_id` lets 404 and 409 responses be reported as run-specific errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        run_id: Option<&str>,
    ) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status.as_u16(), error_text, run_id));
        }

        response
            .json()
            .await
            .map_err(|e| AdapterError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Maps a non-success status to the most specific adapter error
fn status_error(status: u16, message: String, run_id: Option<&str>) -> AdapterError {
    match (status, run_id) {
        (401 | 403, _) => AdapterError::Unauthorized(message),
        (404, Some(run_id)) => AdapterError::UnknownRun(run_id.to_string()),
        (409, Some(run_id)) => AdapterError::AlreadyTerminal(run_id.to_string()),
        _ => AdapterError::api_error(status, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_creation() {
        let adapter = HttpExecutionAdapter::new("http://localhost:7071");
        assert_eq!(adapter.base_url(), "http://localhost:7071");
    }

    #[test]
    fn test_adapter_trims_trailing_slash() {
        let adapter = HttpExecutionAdapter::new("http://localhost:7071/");
        assert_eq!(adapter.endpoint("start"), "http://localhost:7071/api/pipelines/start");
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(404, "gone".to_string(), Some("abc")),
            AdapterError::UnknownRun(id) if id == "abc"
        ));
        assert!(matches!(
            status_error(409, "done".to_string(), Some("abc")),
            AdapterError::AlreadyTerminal(_)
        ));
        assert!(matches!(
            status_error(403, "denied".to_string(), None),
            AdapterError::Unauthorized(_)
        ));
        assert!(matches!(
            status_error(404, "no pipeline".to_string(), None),
            AdapterError::ApiError { status: 404, .. }
        ));
        assert!(status_error(503, "busy".to_string(), Some("abc")).is_transient());
    }
}
