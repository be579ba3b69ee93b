//! Common types used across CLI modules

use anyhow::{Context, Result};
use conduit_core::domain::pipeline::PipelineRequest;
use std::path::Path;
use uuid::Uuid;

/// Identifier that can be either a full UUID or an unambiguous prefix
#[derive(Debug, Clone)]
pub enum IdOrPrefix {
    Full(Uuid),
    Prefix(String),
}

impl IdOrPrefix {
    /// Parses as a full UUID first, otherwise treats the input as a prefix
    pub fn parse(input: &str) -> Self {
        match Uuid::parse_str(input) {
            Ok(uuid) => IdOrPrefix::Full(uuid),
            Err(_) => IdOrPrefix::Prefix(input.to_lowercase()),
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            IdOrPrefix::Full(uuid) => Some(*uuid),
            IdOrPrefix::Prefix(_) => None,
        }
    }

    /// Whether `id` is this identifier or starts with this prefix
    pub fn matches(&self, id: Uuid) -> bool {
        match self {
            IdOrPrefix::Full(uuid) => *uuid == id,
            IdOrPrefix::Prefix(prefix) => id.to_string().starts_with(prefix.as_str()),
        }
    }
}

impl std::fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdOrPrefix::Full(uuid) => write!(f, "{}", uuid),
            IdOrPrefix::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}

/// Reads a pipeline request from a JSON file
pub fn read_request(path: &Path) -> Result<PipelineRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {}", path.display()))?;
    parse_request(&content).with_context(|| format!("Invalid request in {}", path.display()))
}

fn parse_request(content: &str) -> Result<PipelineRequest> {
    let request: PipelineRequest = serde_json::from_str(content)?;
    request.validate()?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_id_and_prefix() {
        let id = Uuid::new_v4();
        assert!(IdOrPrefix::parse(&id.to_string()).as_uuid().is_some());

        let prefix = IdOrPrefix::parse(&id.to_string()[..8].to_uppercase());
        assert!(prefix.as_uuid().is_none());
        assert!(prefix.matches(id));
        assert!(!IdOrPrefix::parse("zzzz").matches(id));
    }

    #[test]
    fn test_parse_request_validates() {
        let ok = r#"{
            "TenantId": "t",
            "SubscriptionId": "s",
            "ResourceGroupName": "rg",
            "OrchestratorType": "ADF",
            "OrchestratorName": "factory",
            "PipelineName": "Ingest"
        }"#;
        assert_eq!(parse_request(ok).unwrap().pipeline_name, "Ingest");

        let blank_name = ok.replace("\"Ingest\"", "\"\"");
        assert!(parse_request(&blank_name).is_err());
    }
}
