//! Activity error domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::run::RunStatus;

/// A single failed activity inside a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivityError {
    pub activity_name: String,
    #[serde(default)]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    pub error_message: String,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
}

/// Activity failures recorded for a terminal pipeline run
///
/// Fetched on demand, separately from [`PipelineRunStatus`](crate::domain::run::PipelineRunStatus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineErrorDetail {
    pub pipeline_name: String,
    pub run_id: String,
    pub actual_status: RunStatus,
    #[serde(default)]
    pub errors: Vec<ActivityError>,
}

impl PipelineErrorDetail {
    /// Detail with no recorded activity errors
    pub fn empty(
        pipeline_name: impl Into<String>,
        run_id: impl Into<String>,
        actual_status: RunStatus,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            run_id: run_id.into(),
            actual_status,
            errors: Vec::new(),
        }
    }

    pub fn response_count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
