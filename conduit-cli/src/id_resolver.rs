//! ID resolver module
//!
//! Resolves execution id prefixes to full UUIDs by listing recent executions.

use anyhow::{Context, Result, anyhow};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::types::IdOrPrefix;

/// How many recent executions a prefix is matched against
const RESOLVE_WINDOW: usize = 500;

/// Resolve an execution ID or prefix to a full UUID
///
/// # Errors
/// Returns an error if no execution matches the prefix, if several do, or if
/// the API call fails.
pub async fn resolve_execution_id(client: &ApiClient, id_or_prefix: &IdOrPrefix) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let executions = client
        .list_executions(RESOLVE_WINDOW)
        .await
        .context("Failed to fetch executions for ID resolution")?;

    let ids: Vec<Uuid> = executions.iter().map(|e| e.id).collect();
    pick_unique(id_or_prefix, &ids)
}

fn pick_unique(id_or_prefix: &IdOrPrefix, ids: &[Uuid]) -> Result<Uuid> {
    let matches: Vec<&Uuid> = ids.iter().filter(|id| id_or_prefix.matches(**id)).collect();

    match matches.as_slice() {
        [] => Err(anyhow!(
            "No execution found with ID starting with '{}'",
            id_or_prefix
        )),
        [id] => Ok(**id),
        _ => {
            let ids: Vec<String> = matches.iter().map(|id| id.to_string()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple executions: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_unique() {
        let a = Uuid::parse_str("aaaaaaaa-0000-0000-0000-000000000001").unwrap();
        let b = Uuid::parse_str("aaaabbbb-0000-0000-0000-000000000002").unwrap();
        let ids = [a, b];

        assert_eq!(pick_unique(&IdOrPrefix::parse("aaaaa"), &ids).unwrap(), a);
        assert!(pick_unique(&IdOrPrefix::parse("aaaa"), &ids).is_err());
        assert!(pick_unique(&IdOrPrefix::parse("cc"), &ids).is_err());
    }
}
