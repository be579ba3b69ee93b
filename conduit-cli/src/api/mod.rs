//! API client module
//!
//! HTTP client for communicating with the Conduit orchestrator API.

use anyhow::{Context, Result};
use conduit_core::domain::error_detail::PipelineErrorDetail;
use conduit_core::domain::orchestration::RunStartedSignal;
use conduit_core::domain::pipeline::{PipelineDescription, PipelineRequest, PipelineRunRequest};
use conduit_core::domain::run::PipelineRunStatus;
use conduit_core::dto::execution::{
    ExecutionAccepted, ExecutionDetail, ExecutionSummary, SignalOutcome, StartExecution,
};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// HTTP client for the Conduit orchestrator API
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Submit an execution
    pub async fn start_execution(&self, req: StartExecution) -> Result<ExecutionAccepted> {
        self.post("/executions", &req)
            .await
            .context("Failed to send start execution request")
    }

    /// Submit a standalone checker that waits for a run-started signal
    pub async fn start_check(&self, req: PipelineRequest) -> Result<ExecutionAccepted> {
        self.post("/executions/checks", &req)
            .await
            .context("Failed to send start check request")
    }

    pub async fn list_executions(&self, limit: usize) -> Result<Vec<ExecutionSummary>> {
        let response = self
            .client
            .get(self.url("/executions"))
            .query(&[("limit", limit)])
            .send()
            .await
            .context("Failed to send list executions request")?;

        self.handle_response(response).await
    }

    pub async fn get_execution(&self, id: Uuid) -> Result<ExecutionDetail> {
        self.get(&format!("/executions/{}", id))
            .await
            .context("Failed to send get execution request")
    }

    pub async fn raise_signal(&self, id: Uuid, run_id: &str) -> Result<SignalOutcome> {
        let signal = RunStartedSignal {
            run_id: run_id.to_string(),
        };
        self.post(&format!("/executions/{}/signal", id), &signal)
            .await
            .context("Failed to send signal request")
    }

    pub async fn cancel_execution(&self, id: Uuid) -> Result<PipelineRunStatus> {
        let response = self
            .client
            .post(self.url(&format!("/executions/{}/cancel", id)))
            .send()
            .await
            .context("Failed to send cancel request")?;

        self.handle_response(response).await
    }

    pub async fn execution_errors(&self, id: Uuid) -> Result<PipelineErrorDetail> {
        self.get(&format!("/executions/{}/errors", id))
            .await
            .context("Failed to send errors request")
    }

    pub async fn validate_pipeline(&self, req: &PipelineRequest) -> Result<PipelineDescription> {
        self.post("/pipelines/validate", req)
            .await
            .context("Failed to send validate request")
    }

    pub async fn run_status(&self, req: &PipelineRunRequest) -> Result<PipelineRunStatus> {
        self.post("/pipelines/status", req)
            .await
            .context("Failed to send run status request")
    }

    pub async fn cancel_run(&self, req: &PipelineRunRequest) -> Result<PipelineRunStatus> {
        self.post("/pipelines/cancel", req)
            .await
            .context("Failed to send cancel run request")
    }

    pub async fn run_errors(&self, req: &PipelineRunRequest) -> Result<PipelineErrorDetail> {
        self.post("/pipelines/errors", req)
            .await
            .context("Failed to send run errors request")
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.get(self.url(path)).send().await?;
        self.handle_response(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        self.handle_response(response).await
    }

    /// Handle API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Request failed with status {}: {}", status, error_text);
        }

        response
            .json()
            .await
            .context("Failed to parse response JSON")
    }
}
