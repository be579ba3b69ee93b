//! Pipeline request domain types
//!
//! A [`PipelineRequest`] identifies a pipeline and the execution service
//! instance that owns it. Once Start has produced a run id the request is
//! wrapped into a [`PipelineRunRequest`] for every later Check, Cancel and
//! error lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{ValidationError, ValidationResult};

/// Kind of execution service hosting the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrchestratorType {
    /// Azure Data Factory
    #[serde(rename = "ADF", alias = "adf")]
    DataFactory,

    /// Azure Synapse Analytics
    #[serde(rename = "SYN", alias = "syn")]
    Synapse,
}

impl std::fmt::Display for OrchestratorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestratorType::DataFactory => write!(f, "ADF"),
            OrchestratorType::Synapse => write!(f, "SYN"),
        }
    }
}

/// Request identifying a pipeline to run
///
/// Field names are part of the wire contract and stay PascalCase.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineRequest {
    pub tenant_id: String,

    /// Service principal used against the execution service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,

    /// Secret for the service principal; never logged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_key: Option<String>,

    pub subscription_id: String,
    pub resource_group_name: String,
    pub orchestrator_type: OrchestratorType,
    pub orchestrator_name: String,
    pub pipeline_name: String,

    #[serde(default)]
    pub pipeline_parameters: HashMap<String, String>,
}

impl PipelineRequest {
    /// Checks that every field the execution service needs is present
    pub fn validate(&self) -> ValidationResult<()> {
        require("TenantId", &self.tenant_id)?;
        require("SubscriptionId", &self.subscription_id)?;
        require("ResourceGroupName", &self.resource_group_name)?;
        require("OrchestratorName", &self.orchestrator_name)?;
        require("PipelineName", &self.pipeline_name)?;

        if self
            .pipeline_parameters
            .keys()
            .any(|name| name.trim().is_empty())
        {
            return Err(ValidationError::EmptyParameterName);
        }

        Ok(())
    }

    /// Copy without the authentication key, for responses and listings
    pub fn redacted(&self) -> Self {
        Self {
            authentication_key: None,
            ..self.clone()
        }
    }
}

// Hand-written so the authentication key never reaches a log line.
impl std::fmt::Debug for PipelineRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRequest")
            .field("tenant_id", &self.tenant_id)
            .field("application_id", &self.application_id)
            .field(
                "authentication_key",
                &self.authentication_key.as_ref().map(|_| "<redacted>"),
            )
            .field("subscription_id", &self.subscription_id)
            .field("resource_group_name", &self.resource_group_name)
            .field("orchestrator_type", &self.orchestrator_type)
            .field("orchestrator_name", &self.orchestrator_name)
            .field("pipeline_name", &self.pipeline_name)
            .field("pipeline_parameters", &self.pipeline_parameters)
            .finish()
    }
}

fn require(field: &'static str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

/// A pipeline request bound to a specific run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineRunRequest {
    #[serde(flatten)]
    pub request: PipelineRequest,

    pub run_id: String,

    /// Checker instance that should receive the run-started signal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_orchestrator_instance_id: Option<Uuid>,
}

impl PipelineRunRequest {
    /// Attaches a run id to a request
    pub fn new(request: PipelineRequest, run_id: impl Into<String>) -> Self {
        Self {
            request,
            run_id: run_id.into(),
            check_orchestrator_instance_id: None,
        }
    }

    /// Routes the run-started signal to the given checker instance
    pub fn with_check_instance(mut self, instance_id: Uuid) -> Self {
        self.check_orchestrator_instance_id = Some(instance_id);
        self
    }

    pub fn pipeline_name(&self) -> &str {
        &self.request.pipeline_name
    }

    /// Validates the wrapped request and the presence of a run id
    pub fn validate(&self) -> ValidationResult<()> {
        self.request.validate()?;
        if self.run_id.trim().is_empty() {
            return Err(ValidationError::MissingRunId(
                self.request.pipeline_name.clone(),
            ));
        }
        Ok(())
    }
}

/// What the execution service knows about a pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineDescription {
    pub pipeline_exists: bool,
    pub pipeline_name: String,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub pipeline_type: Option<String>,
    #[serde(default)]
    pub activity_count: u32,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_request() -> PipelineRequest {
        PipelineRequest {
            tenant_id: "tenant".to_string(),
            application_id: Some("app".to_string()),
            authentication_key: Some("s3cret".to_string()),
            subscription_id: "sub".to_string(),
            resource_group_name: "rg".to_string(),
            orchestrator_type: OrchestratorType::DataFactory,
            orchestrator_name: "factory".to_string(),
            pipeline_name: "Ingest".to_string(),
            pipeline_parameters: HashMap::from([("date".to_string(), "2024-01-01".to_string())]),
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(sample_request().validate().is_ok());
    }

    #[test]
    fn test_blank_pipeline_name_rejected() {
        let mut request = sample_request();
        request.pipeline_name = "  ".to_string();
        assert_eq!(
            request.validate(),
            Err(ValidationError::MissingField("PipelineName"))
        );
    }

    #[test]
    fn test_empty_parameter_name_rejected() {
        let mut request = sample_request();
        request
            .pipeline_parameters
            .insert(String::new(), "x".to_string());
        assert_eq!(request.validate(), Err(ValidationError::EmptyParameterName));
    }

    #[test]
    fn test_debug_redacts_authentication_key() {
        let rendered = format!("{:?}", sample_request());
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_redacted_drops_key() {
        let redacted = sample_request().redacted();
        assert!(redacted.authentication_key.is_none());
        let json = serde_json::to_value(&redacted).unwrap();
        assert!(json.get("AuthenticationKey").is_none());
        assert_eq!(json["ApplicationId"], "app");
    }

    #[test]
    fn test_wire_field_names() {
        let run = PipelineRunRequest::new(sample_request(), "abc");
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["RunId"], "abc");
        assert_eq!(json["PipelineName"], "Ingest");
        assert_eq!(json["OrchestratorType"], "ADF");
        assert!(json.get("CheckOrchestratorInstanceId").is_none());
    }

    #[test]
    fn test_run_request_round_trips_check_instance() {
        let checker = Uuid::new_v4();
        let run = PipelineRunRequest::new(sample_request(), "abc").with_check_instance(checker);
        let json = serde_json::to_string(&run).unwrap();
        let parsed: PipelineRunRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.check_orchestrator_instance_id, Some(checker));
        assert_eq!(parsed.request, run.request);
    }

    #[test]
    fn test_run_request_requires_run_id() {
        let run = PipelineRunRequest::new(sample_request(), "");
        assert_eq!(
            run.validate(),
            Err(ValidationError::MissingRunId("Ingest".to_string()))
        );
    }

    #[test]
    fn test_orchestrator_type_accepts_lowercase_alias() {
        let parsed: OrchestratorType = serde_json::from_str("\"syn\"").unwrap();
        assert_eq!(parsed, OrchestratorType::Synapse);
    }
}
