//! Status event models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable record of one status transition of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub id: String,
    pub graph_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub old_status: String,
    pub new_status: String,
    pub changed_by: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl StatusEvent {
    /// Whether both events record the same `old -> new` move of the same entity.
    pub fn repeats(&self, other: &StatusEvent) -> bool {
        self.entity_type == other.entity_type
            && self.entity_id == other.entity_id
            && self.old_status == other.old_status
            && self.new_status == other.new_status
    }
}

/// Input for recording a transition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub entity_type: String,
    pub entity_id: String,
    pub old_status: String,
    pub new_status: String,
    pub changed_by: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.old_status == self.new_status
    }

    /// Build the event to append.
    pub fn into_event(self, graph_id: &str) -> StatusEvent {
        StatusEvent {
            id: uuid::Uuid::new_v4().to_string(),
            graph_id: graph_id.to_string(),
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            old_status: self.old_status,
            new_status: self.new_status,
            changed_by: self.changed_by,
            timestamp: Utc::now(),
            reason: self.reason,
        }
    }
}
