//! Pipeline run status types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Status reported by the execution service for a pipeline run
///
/// Only `Queued` and `InProgress` keep a run alive. Any string the service
/// returns that is not recognised maps to [`RunStatus::Unknown`], which is
/// terminal so that an unexpected value can never cause endless polling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
    Unknown(String),
}

impl RunStatus {
    /// Maps the raw status string returned by the execution service
    ///
    /// Matching is exact: `"inprogress"` is not `InProgress`.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "Queued" => RunStatus::Queued,
            "InProgress" => RunStatus::InProgress,
            "Succeeded" => RunStatus::Succeeded,
            "Failed" => RunStatus::Failed,
            "Cancelled" => RunStatus::Cancelled,
            other => RunStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "Queued",
            RunStatus::InProgress => "InProgress",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::Cancelled => "Cancelled",
            RunStatus::Unknown(raw) => raw,
        }
    }

    /// Whether polling should stop at this status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Queued | RunStatus::InProgress)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RunStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RunStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(RunStatus::from_raw(&raw))
    }
}

/// Coarse status for callers that only care whether a run is still going
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimpleStatus {
    Running,
    Complete,
}

impl From<&RunStatus> for SimpleStatus {
    fn from(status: &RunStatus) -> Self {
        if status.is_terminal() {
            SimpleStatus::Complete
        } else {
            SimpleStatus::Running
        }
    }
}

/// Result of a Start, Check or Cancel call
///
/// A new value is produced on every call; nothing mutates an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineRunStatus {
    pub pipeline_name: String,
    pub run_id: String,
    pub actual_status: RunStatus,
    #[serde(default)]
    pub run_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineRunStatus {
    /// Builds a status without timestamps or error payload
    pub fn new(
        pipeline_name: impl Into<String>,
        run_id: impl Into<String>,
        actual_status: RunStatus,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            run_id: run_id.into(),
            actual_status,
            run_start: None,
            run_end: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.actual_status.is_terminal()
    }

    pub fn simple_status(&self) -> SimpleStatus {
        SimpleStatus::from(&self.actual_status)
    }
}
