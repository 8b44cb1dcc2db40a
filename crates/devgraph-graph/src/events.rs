//! Append-only log of entity status transitions.

use std::sync::Arc;

use tracing::{debug, info};

use devgraph_core::event::clamp_history_limit;
use devgraph_core::node::validate_graph_id;
use devgraph_core::{DevgraphError, DevgraphResult, StatusEvent, Transition};

use crate::backend::GraphBackend;

pub struct StatusEventLog {
    backend: Arc<dyn GraphBackend>,
}

impl StatusEventLog {
    pub fn new(backend: Arc<dyn GraphBackend>) -> Self {
        Self { backend }
    }

    /// Record a status transition.
    ///
    /// Returns `None` without writing when the status did not change, or when
    /// the entity's latest event already records the same transition.
    pub async fn record_transition(
        &self,
        graph_id: &str,
        transition: Transition,
    ) -> DevgraphResult<Option<StatusEvent>> {
        validate_graph_id(graph_id)?;
        for (name, value) in [
            ("entityType", &transition.entity_type),
            ("entityId", &transition.entity_id),
            ("changedBy", &transition.changed_by),
        ] {
            if value.trim().is_empty() {
                return Err(DevgraphError::validation(format!(
                    "Parameter '{}' is required",
                    name
                )));
            }
        }

        if transition.is_noop() {
            debug!(graph_id, entity_id = %transition.entity_id, "Status unchanged, no event");
            return Ok(None);
        }

        let event = transition.into_event(graph_id);
        if !self.backend.append_event(&event).await? {
            debug!(graph_id, entity_id = %event.entity_id, "Replayed transition ignored");
            return Ok(None);
        }

        info!(
            graph_id,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            old_status = %event.old_status,
            new_status = %event.new_status,
            "Status transition recorded"
        );
        Ok(Some(event))
    }

    /// Events for one entity, most recent first. Unknown entities yield an
    /// empty history.
    pub async fn get_history(
        &self,
        graph_id: &str,
        entity_type: &str,
        entity_id: &str,
        limit: Option<i64>,
    ) -> DevgraphResult<Vec<StatusEvent>> {
        validate_graph_id(graph_id)?;
        let limit = clamp_history_limit(limit);
        self.backend
            .event_history(graph_id, entity_type, entity_id, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn log() -> StatusEventLog {
        StatusEventLog::new(Arc::new(MemoryBackend::new()))
    }

    fn transition(old: &str, new: &str) -> Transition {
        Transition {
            entity_type: "Task".to_string(),
            entity_id: "T1".to_string(),
            old_status: old.to_string(),
            new_status: new.to_string(),
            changed_by: "alice".to_string(),
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_noop_transition_writes_nothing() {
        let log = log();
        log.record_transition("g1", transition("todo", "in_progress")).await.unwrap();
        let noop = log
            .record_transition("g1", transition("in_progress", "in_progress"))
            .await
            .unwrap();
        assert!(noop.is_none());

        let history = log.get_history("g1", "Task", "T1", None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_status, "todo");
        assert_eq!(history[0].new_status, "in_progress");
    }

    #[tokio::test]
    async fn test_replayed_transition_is_ignored() {
        let log = log();
        assert!(log.record_transition("g1", transition("todo", "done")).await.unwrap().is_some());
        assert!(log.record_transition("g1", transition("todo", "done")).await.unwrap().is_none());
        assert!(log.record_transition("g1", transition("done", "todo")).await.unwrap().is_some());
        assert!(log.record_transition("g1", transition("todo", "done")).await.unwrap().is_some());

        assert_eq!(log.get_history("g1", "Task", "T1", None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_history_is_most_recent_first_and_clamped() {
        let log = log();
        let statuses = ["todo", "in_progress", "review", "done"];
        for pair in statuses.windows(2) {
            log.record_transition("g1", transition(pair[0], pair[1])).await.unwrap();
        }

        let history = log.get_history("g1", "Task", "T1", Some(2)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].new_status, "done");
        assert_eq!(history[1].new_status, "review");

        let all = log.get_history("g1", "Task", "T1", Some(10_000)).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_events_are_tenant_scoped() {
        let log = log();
        log.record_transition("g1", transition("todo", "done")).await.unwrap();

        assert!(log.get_history("g2", "Task", "T1", None).await.unwrap().is_empty());
        assert!(log.get_history("g1", "Task", "unknown", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requires_graph_id_and_actor() {
        let log = log();
        let err = log.record_transition("", transition("a", "b")).await.unwrap_err();
        assert_eq!(err.code(), "MISSING_GRAPH_ID");

        let mut t = transition("a", "b");
        t.changed_by = " ".to_string();
        assert_eq!(log.record_transition("g1", t).await.unwrap_err().code(), "VALIDATION");
    }
}
