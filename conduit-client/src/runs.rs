//! Pipeline run endpoints

use async_trait::async_trait;
use conduit_core::domain::error_detail::PipelineErrorDetail;
use conduit_core::domain::pipeline::{PipelineDescription, PipelineRequest, PipelineRunRequest};
use conduit_core::domain::run::PipelineRunStatus;
use tracing::debug;

use crate::error::{AdapterError, Result};
use crate::{ExecutionAdapter, HttpExecutionAdapter};

#[async_trait]
impl ExecutionAdapter for HttpExecutionAdapter {
    async fn start(&self, request: &PipelineRequest) -> Result<PipelineRunStatus> {
        debug!("Starting pipeline '{}'", request.pipeline_name);

        let response = self
            .client
            .post(self.endpoint("start"))
            .json(request)
            .send()
            .await?;

        let status: PipelineRunStatus = self.handle_response(response, None).await?;
        if status.run_id.trim().is_empty() {
            return Err(AdapterError::EmptyRunId(request.pipeline_name.clone()));
        }

        Ok(status)
    }

    async fn check(&self, request: &PipelineRunRequest) -> Result<PipelineRunStatus> {
        debug!(
            "Checking pipeline '{}' run {}",
            request.pipeline_name(),
            request.run_id
        );

        let response = self
            .client
            .post(self.endpoint("status"))
            .json(request)
            .send()
            .await?;

        self.handle_response(response, Some(&request.run_id)).await
    }

    async fn cancel(&self, request: &PipelineRunRequest) -> Result<PipelineRunStatus> {
        debug!(
            "Cancelling pipeline '{}' run {}",
            request.pipeline_name(),
            request.run_id
        );

        let response = self
            .client
            .post(self.endpoint("cancel"))
            .json(request)
            .send()
            .await?;

        self.handle_response(response, Some(&request.run_id)).await
    }

    async fn errors(&self, request: &PipelineRunRequest) -> Result<PipelineErrorDetail> {
        let response = self
            .client
            .post(self.endpoint("errors"))
            .json(request)
            .send()
            .await?;

        self.handle_response(response, Some(&request.run_id)).await
    }

    async fn validate(&self, request: &PipelineRequest) -> Result<PipelineDescription> {
        let response = self
            .client
            .post(self.endpoint("validate"))
            .json(request)
            .send()
            .await?;

        self.handle_response(response, None).await
    }
}
