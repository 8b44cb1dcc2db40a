//! Knowledge graph node and relationship models.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DevgraphError;

/// Node properties, ordered by key.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Kind of development artifact a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    Task,
    #[serde(rename = "ADR")]
    Adr,
    #[serde(rename = "PRD")]
    Prd,
    Sprint,
    Epic,
    Pattern,
    Gotcha,
    Principle,
    Event,
    Session,
}

impl NodeType {
    pub const ALL: [NodeType; 10] = [
        Self::Task,
        Self::Adr,
        Self::Prd,
        Self::Sprint,
        Self::Epic,
        Self::Pattern,
        Self::Gotcha,
        Self::Principle,
        Self::Event,
        Self::Session,
    ];

    /// The Neo4j node label for this type.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Task => "Task",
            Self::Adr => "ADR",
            Self::Prd => "PRD",
            Self::Sprint => "Sprint",
            Self::Epic => "Epic",
            Self::Pattern => "Pattern",
            Self::Gotcha => "Gotcha",
            Self::Principle => "Principle",
            Self::Event => "Event",
            Self::Session => "Session",
        }
    }

    /// Prefix used for generated identifiers (`TASK-<uuid>`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Task => "TASK",
            Self::Adr => "ADR",
            Self::Prd => "PRD",
            Self::Sprint => "SPRINT",
            Self::Epic => "EPIC",
            Self::Pattern => "PATTERN",
            Self::Gotcha => "GOTCHA",
            Self::Principle => "PRINCIPLE",
            Self::Event => "EVENT",
            Self::Session => "SESSION",
        }
    }
}

impl FromStr for NodeType {
    type Err = DevgraphError;

    /// Parse from string (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "adr" => Ok(Self::Adr),
            "prd" => Ok(Self::Prd),
            "sprint" => Ok(Self::Sprint),
            "epic" => Ok(Self::Epic),
            "pattern" => Ok(Self::Pattern),
            "gotcha" => Ok(Self::Gotcha),
            "principle" => Ok(Self::Principle),
            "event" => Ok(Self::Event),
            "session" => Ok(Self::Session),
            _ => Err(DevgraphError::InvalidNodeType(s.to_string())),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of directed edge between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    AppliesPattern,
    AppliedIn,
    References,
    Implements,
    DependsOn,
    BelongsTo,
    Mitigates,
    Supersedes,
}

impl RelationshipType {
    /// The Neo4j relationship type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppliesPattern => "APPLIES_PATTERN",
            Self::AppliedIn => "APPLIED_IN",
            Self::References => "REFERENCES",
            Self::Implements => "IMPLEMENTS",
            Self::DependsOn => "DEPENDS_ON",
            Self::BelongsTo => "BELONGS_TO",
            Self::Mitigates => "MITIGATES",
            Self::Supersedes => "SUPERSEDES",
        }
    }
}

impl FromStr for RelationshipType {
    type Err = DevgraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "APPLIES_PATTERN" => Ok(Self::AppliesPattern),
            "APPLIED_IN" => Ok(Self::AppliedIn),
            "REFERENCES" => Ok(Self::References),
            "IMPLEMENTS" => Ok(Self::Implements),
            "DEPENDS_ON" => Ok(Self::DependsOn),
            "BELONGS_TO" => Ok(Self::BelongsTo),
            "MITIGATES" => Ok(Self::Mitigates),
            "SUPERSEDES" => Ok(Self::Supersedes),
            _ => Err(DevgraphError::InvalidRelationshipType(s.to_string())),
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in a tenant's knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub graph_id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub edited_by: Option<String>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

impl Node {
    fn string_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    pub fn title(&self) -> Option<&str> {
        self.string_property("title")
    }

    pub fn status(&self) -> Option<&str> {
        self.string_property("status")
    }

    pub fn content(&self) -> Option<&str> {
        self.string_property("content")
    }

    /// Text fed to the embedding model: title and content.
    pub fn embedding_text(&self) -> Option<String> {
        let parts: Vec<&str> = [self.title(), self.content()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Whether the node carries an embedding produced by `model`.
    pub fn is_embedded_with(&self, model: &str) -> bool {
        self.embedding.is_some() && self.embedding_model.as_deref() == Some(model)
    }
}

/// Input for node creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNode {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub edited_by: Option<String>,
}

/// Partial update of a node's properties. A `null` value removes the key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    pub properties: Properties,
    #[serde(default)]
    pub edited_by: Option<String>,
}

/// A directed, typed edge between two nodes of the same graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub graph_id: String,
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
}

/// Input for relationship creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRelationship {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub properties: Properties,
}

/// Node and relationship counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphCounts {
    pub nodes: usize,
    pub relationships: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_parse_is_case_insensitive() {
        assert_eq!("task".parse::<NodeType>().unwrap(), NodeType::Task);
        assert_eq!("ADR".parse::<NodeType>().unwrap(), NodeType::Adr);
        assert_eq!(" Sprint ".parse::<NodeType>().unwrap(), NodeType::Sprint);
        assert!(matches!(
            "Widget".parse::<NodeType>(),
            Err(DevgraphError::InvalidNodeType(_))
        ));
    }

    #[test]
    fn test_node_type_serializes_as_label() {
        assert_eq!(serde_json::to_string(&NodeType::Adr).unwrap(), "\"ADR\"");
        assert_eq!(serde_json::to_string(&NodeType::Gotcha).unwrap(), "\"Gotcha\"");
        for t in NodeType::ALL {
            assert_eq!(t.label().parse::<NodeType>().unwrap(), t);
        }
    }

    #[test]
    fn test_relationship_type_parse() {
        assert_eq!(
            "applies-pattern".parse::<RelationshipType>().unwrap(),
            RelationshipType::AppliesPattern
        );
        assert_eq!(RelationshipType::DependsOn.to_string(), "DEPENDS_ON");
        assert!("KNOWS".parse::<RelationshipType>().is_err());
    }
}
