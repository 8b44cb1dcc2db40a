//! Knowledge graph nodes: identifiers, property rules and content hashing.

pub mod model;

use sha2::{Digest, Sha256};

use crate::error::{DevgraphError, DevgraphResult};
use model::{NodeType, Properties};

/// Maximum accepted identifier length.
const MAX_ID_LEN: usize = 256;

/// Validate a node identifier.
///
/// Identifiers start and end with an alphanumeric character and contain only
/// alphanumerics and `-`, `_`, `.`, `:`. A value truncated to a trailing
/// separator (`SPRINT-2025-11-10-`) is rejected.
pub fn validate_node_id(id: &str) -> DevgraphResult<()> {
    let malformed = || DevgraphError::MalformedId(id.to_string());

    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(malformed());
    }

    let first = id.chars().next().ok_or_else(malformed)?;
    let last = id.chars().last().ok_or_else(malformed)?;
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(malformed());
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(malformed());
    }

    Ok(())
}

/// Validate a tenant identifier. Absent or blank values are `MissingGraphId`.
pub fn validate_graph_id(graph_id: &str) -> DevgraphResult<()> {
    if graph_id.trim().is_empty() {
        return Err(DevgraphError::MissingGraphId);
    }
    validate_node_id(graph_id).map_err(|_| {
        DevgraphError::validation(format!("Malformed graphId '{}'", graph_id))
    })
}

/// Generate an identifier for a new node of the given type.
pub fn generate_node_id(node_type: NodeType) -> String {
    format!("{}-{}", node_type.id_prefix(), uuid::Uuid::new_v4())
}

/// Check that every property is a scalar or a list of scalars.
pub fn validate_properties(properties: &Properties) -> DevgraphResult<()> {
    for (key, value) in properties {
        if key.trim().is_empty() {
            return Err(DevgraphError::validation("Property keys must not be empty"));
        }
        let ok = match value {
            serde_json::Value::Object(_) => false,
            serde_json::Value::Array(items) => items
                .iter()
                .all(|v| !matches!(v, serde_json::Value::Object(_) | serde_json::Value::Array(_))),
            _ => true,
        };
        if !ok {
            return Err(DevgraphError::validation(format!(
                "Property '{}' must be a scalar or a list of scalars",
                key
            )));
        }
    }
    Ok(())
}

/// Merge a patch into existing properties. `null` removes the key.
pub fn apply_patch(properties: &mut Properties, patch: &Properties) {
    for (key, value) in patch {
        if value.is_null() {
            properties.remove(key);
        } else {
            properties.insert(key.clone(), value.clone());
        }
    }
}

/// SHA-256 of the canonical (key-sorted) JSON encoding of the properties.
///
/// Local files and cloud nodes hash the same way, so equal hashes mean equal
/// content on both sides.
pub fn content_hash(properties: &Properties) -> String {
    let canonical = serde_json::to_string(properties).unwrap_or_default();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
