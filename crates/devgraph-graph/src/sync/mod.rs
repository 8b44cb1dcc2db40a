//! Reconciliation between git-tracked local files and the cloud graph.
//!
//! Each node is classified into a [`SyncState`] from both sides' content
//! hashes and modification times. Pull and push only ever move nodes in the
//! direction their state allows; conflicts are reported, never merged.

pub mod markdown;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use devgraph_core::node::{content_hash, validate_graph_id, validate_node_id};
use devgraph_core::sync::classify;
use devgraph_core::{DevgraphResult, Node, NodeType, Properties, SideSnapshot, SyncState};

use crate::store::GraphStore;

pub use markdown::MarkdownDirSource;

/// A node as read from the local working tree. The id has not been
/// validated yet.
#[derive(Debug, Clone)]
pub struct LocalNode {
    pub id: String,
    pub node_type: NodeType,
    pub properties: Properties,
    pub updated_at: DateTime<Utc>,
}

impl LocalNode {
    fn snapshot(&self) -> SideSnapshot {
        SideSnapshot::new(content_hash(&self.properties), self.updated_at)
    }
}

/// An entry that could not be considered for sync.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub id: String,
    pub reason: String,
}

/// Everything a local source produced in one scan.
#[derive(Debug, Clone, Default)]
pub struct LocalSnapshot {
    pub nodes: Vec<LocalNode>,
    pub skipped: Vec<SkippedEntry>,
}

/// The local side of the sync: usually a directory of markdown files.
#[async_trait]
pub trait LocalNodeSource: Send + Sync {
    async fn load(&self) -> DevgraphResult<LocalSnapshot>;

    /// Write a cloud node to the local tree.
    async fn write(&self, node: &Node) -> DevgraphResult<()>;
}

/// One node that is not in sync.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsyncedEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub state: SyncState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_updated_at: Option<DateTime<Utc>>,
    pub synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UnsyncedReport {
    pub nodes: Vec<UnsyncedEntry>,
    pub skipped: Vec<SkippedEntry>,
}

impl UnsyncedReport {
    pub fn count(&self, state: SyncState) -> usize {
        self.nodes.iter().filter(|n| n.state == state).count()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub pulled: Vec<String>,
    pub pushed: Vec<String>,
    pub conflicts: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
}

struct Classified {
    local: Option<LocalNode>,
    cloud: Option<Node>,
    state: SyncState,
}

pub struct SyncEngine {
    store: Arc<GraphStore>,
}

impl SyncEngine {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Split cloud nodes with ids that do not validate off into `skipped`.
    fn valid_cloud_nodes(nodes: Vec<Node>, skipped: &mut Vec<SkippedEntry>) -> Vec<Node> {
        nodes
            .into_iter()
            .filter(|node| match validate_node_id(&node.id) {
                Ok(()) => true,
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "Skipping cloud node with malformed id");
                    skipped.push(SkippedEntry {
                        id: node.id.clone(),
                        reason: e.to_string(),
                    });
                    false
                }
            })
            .collect()
    }

    async fn classify_all(
        &self,
        graph_id: &str,
        local: &dyn LocalNodeSource,
    ) -> DevgraphResult<(Vec<Classified>, Vec<SkippedEntry>)> {
        validate_graph_id(graph_id)?;
        let snapshot = local.load().await?;
        let mut skipped = snapshot.skipped;

        let mut local_nodes: BTreeMap<String, LocalNode> = BTreeMap::new();
        for node in snapshot.nodes {
            if let Err(e) = validate_node_id(&node.id) {
                warn!(node_id = %node.id, error = %e, "Skipping local node with malformed id");
                skipped.push(SkippedEntry {
                    id: node.id,
                    reason: e.to_string(),
                });
                continue;
            }
            local_nodes.insert(node.id.clone(), node);
        }

        let cloud_nodes = Self::valid_cloud_nodes(self.store.all_nodes(graph_id).await?, &mut skipped);
        let mut cloud: HashMap<String, Node> =
            cloud_nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        let mut classified = Vec::new();
        for (id, local_node) in local_nodes {
            let cloud_node = cloud.remove(&id);
            let state = classify(
                Some(&local_node.snapshot()),
                cloud_node.as_ref().map(cloud_snapshot).as_ref(),
                cloud_node.as_ref().and_then(|n| n.synced_at),
            );
            classified.push(Classified {
                local: Some(local_node),
                cloud: cloud_node,
                state,
            });
        }
        let mut remaining: Vec<Node> = cloud.into_values().collect();
        remaining.sort_by(|a, b| a.id.cmp(&b.id));
        for cloud_node in remaining {
            let state = classify(None, Some(&cloud_snapshot(&cloud_node)), cloud_node.synced_at);
            classified.push(Classified {
                local: None,
                cloud: Some(cloud_node),
                state,
            });
        }

        Ok((classified, skipped))
    }

    /// Every node that is not `synced`, compared against a local snapshot.
    pub async fn status(
        &self,
        graph_id: &str,
        local: &dyn LocalNodeSource,
    ) -> DevgraphResult<UnsyncedReport> {
        let (classified, skipped) = self.classify_all(graph_id, local).await?;
        let nodes = classified
            .into_iter()
            .filter(|c| c.state != SyncState::Synced)
            .filter_map(|c| {
                let node_type = c
                    .local
                    .as_ref()
                    .map(|l| l.node_type)
                    .or(c.cloud.as_ref().map(|n| n.node_type))?;
                let id = c
                    .local
                    .as_ref()
                    .map(|l| l.id.clone())
                    .or(c.cloud.as_ref().map(|n| n.id.clone()))?;
                Some(UnsyncedEntry {
                    id,
                    node_type,
                    state: c.state,
                    local_updated_at: c.local.as_ref().map(|l| l.updated_at),
                    cloud_updated_at: c.cloud.as_ref().map(|n| n.updated_at),
                    synced_at: c.cloud.as_ref().and_then(|n| n.synced_at),
                })
            })
            .collect();
        Ok(UnsyncedReport { nodes, skipped })
    }

    /// Server-side listing without a local snapshot: a cloud node is
    /// unsynced when it changed after its last sync or was never synced.
    pub async fn list_unsynced(&self, graph_id: &str) -> DevgraphResult<UnsyncedReport> {
        validate_graph_id(graph_id)?;
        let mut report = UnsyncedReport::default();
        let nodes = Self::valid_cloud_nodes(self.store.all_nodes(graph_id).await?, &mut report.skipped);

        for node in nodes {
            let state = classify(None, Some(&cloud_snapshot(&node)), node.synced_at);
            if state == SyncState::Synced {
                continue;
            }
            report.nodes.push(UnsyncedEntry {
                id: node.id,
                node_type: node.node_type,
                state,
                local_updated_at: None,
                cloud_updated_at: Some(node.updated_at),
                synced_at: node.synced_at,
            });
        }
        Ok(report)
    }

    /// Write `cloud-only` nodes to the local tree.
    pub async fn pull(&self, graph_id: &str, local: &dyn LocalNodeSource) -> DevgraphResult<SyncReport> {
        let (classified, skipped) = self.classify_all(graph_id, local).await?;
        let mut report = SyncReport {
            skipped,
            ..Default::default()
        };

        for c in classified {
            match (c.state, c.cloud) {
                (state, Some(node)) if state.needs_pull() => {
                    local.write(&node).await?;
                    report.pulled.push(node.id);
                }
                (SyncState::Conflict, Some(node)) => report.conflicts.push(node.id),
                _ => {}
            }
        }

        self.store
            .mark_synced(graph_id, &report.pulled, Utc::now())
            .await?;
        info!(
            graph_id,
            pulled = report.pulled.len(),
            conflicts = report.conflicts.len(),
            "Pull complete"
        );
        Ok(report)
    }

    /// Write `local-only` nodes to the cloud graph.
    pub async fn push(&self, graph_id: &str, local: &dyn LocalNodeSource) -> DevgraphResult<SyncReport> {
        let (classified, skipped) = self.classify_all(graph_id, local).await?;
        let mut report = SyncReport {
            skipped,
            ..Default::default()
        };

        for c in classified {
            match (c.state, c.local) {
                (state, Some(local_node)) if state.needs_push() => {
                    let node = to_cloud_node(graph_id, local_node, c.cloud.as_ref());
                    let id = node.id.clone();
                    self.store.upsert_node(node).await?;
                    report.pushed.push(id);
                }
                (SyncState::Conflict, Some(local_node)) => report.conflicts.push(local_node.id),
                _ => {}
            }
        }

        self.store
            .mark_synced(graph_id, &report.pushed, Utc::now())
            .await?;
        info!(
            graph_id,
            pushed = report.pushed.len(),
            conflicts = report.conflicts.len(),
            "Push complete"
        );
        Ok(report)
    }
}

fn cloud_snapshot(node: &Node) -> SideSnapshot {
    SideSnapshot::new(node.content_hash.clone(), node.updated_at)
}

fn to_cloud_node(graph_id: &str, local: LocalNode, existing: Option<&Node>) -> Node {
    let now = Utc::now();
    Node {
        content_hash: content_hash(&local.properties),
        id: local.id,
        graph_id: graph_id.to_string(),
        node_type: local.node_type,
        properties: local.properties,
        embedding: None,
        embedding_model: None,
        created_at: existing.map(|n| n.created_at).unwrap_or(now),
        updated_at: now,
        edited_by: existing.and_then(|n| n.edited_by.clone()),
        synced_at: existing.and_then(|n| n.synced_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_store, new_node};
    use chrono::Duration;
    use serde_json::json;
    use tokio::sync::Mutex;

    /// Local source backed by a vector, recording writes.
    #[derive(Default)]
    struct FakeSource {
        nodes: Mutex<Vec<LocalNode>>,
    }

    #[async_trait]
    impl LocalNodeSource for FakeSource {
        async fn load(&self) -> DevgraphResult<LocalSnapshot> {
            Ok(LocalSnapshot {
                nodes: self.nodes.lock().await.clone(),
                skipped: Vec::new(),
            })
        }

        async fn write(&self, node: &Node) -> DevgraphResult<()> {
            let mut nodes = self.nodes.lock().await;
            nodes.retain(|n| n.id != node.id);
            nodes.push(LocalNode {
                id: node.id.clone(),
                node_type: node.node_type,
                properties: node.properties.clone(),
                updated_at: Utc::now(),
            });
            Ok(())
        }
    }

    fn local(id: &str, title: &str, updated_at: DateTime<Utc>) -> LocalNode {
        LocalNode {
            id: id.to_string(),
            node_type: NodeType::Task,
            properties: serde_json::from_value(json!({ "title": title })).unwrap(),
            updated_at,
        }
    }

    fn engine() -> (SyncEngine, Arc<GraphStore>) {
        let (_, store) = memory_store();
        let store = Arc::new(store);
        (SyncEngine::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_push_then_everything_synced() {
        let (engine, store) = engine();
        let source = FakeSource::default();
        source.nodes.lock().await.push(local("T1", "Login", Utc::now() - Duration::minutes(5)));

        let before = engine.status("g1", &source).await.unwrap();
        assert_eq!(before.count(SyncState::LocalOnly), 1);

        let report = engine.push("g1", &source).await.unwrap();
        assert_eq!(report.pushed, vec!["T1"]);
        assert!(store.get_node("g1", "T1").await.unwrap().synced_at.is_some());

        let after = engine.status("g1", &source).await.unwrap();
        assert!(after.nodes.is_empty());
    }

    #[tokio::test]
    async fn test_pull_writes_cloud_only_nodes() {
        let (engine, store) = engine();
        store
            .create_node("g1", new_node("Task", Some("T9"), json!({"title": "From the dashboard"})))
            .await
            .unwrap();
        let source = FakeSource::default();

        let report = engine.pull("g1", &source).await.unwrap();
        assert_eq!(report.pulled, vec!["T9"]);
        assert_eq!(source.nodes.lock().await.len(), 1);

        assert!(engine.status("g1", &source).await.unwrap().nodes.is_empty());
        assert!(engine.list_unsynced("g1").await.unwrap().nodes.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_reported_never_merged() {
        let (engine, store) = engine();
        let source = FakeSource::default();
        source.nodes.lock().await.push(local("T1", "v1", Utc::now() - Duration::minutes(10)));
        engine.push("g1", &source).await.unwrap();

        // Both sides change after the sync.
        let patch = devgraph_core::NodePatch {
            properties: serde_json::from_value(json!({"title": "cloud edit"})).unwrap(),
            edited_by: None,
        };
        store.update_node("g1", "T1", patch).await.unwrap();
        source.nodes.lock().await[0] = local("T1", "local edit", Utc::now() + Duration::seconds(1));

        let status = engine.status("g1", &source).await.unwrap();
        assert_eq!(status.count(SyncState::Conflict), 1);

        let pulled = engine.pull("g1", &source).await.unwrap();
        assert!(pulled.pulled.is_empty());
        assert_eq!(pulled.conflicts, vec!["T1"]);
        let pushed = engine.push("g1", &source).await.unwrap();
        assert!(pushed.pushed.is_empty());

        assert_eq!(store.get_node("g1", "T1").await.unwrap().title(), Some("cloud edit"));
        assert_eq!(
            source.nodes.lock().await[0].properties["title"],
            json!("local edit")
        );
    }

    #[tokio::test]
    async fn test_malformed_ids_are_skipped_not_fatal() {
        let (engine, _) = engine();
        let source = FakeSource::default();
        {
            let mut nodes = source.nodes.lock().await;
            nodes.push(local("SPRINT-2025-11-10-", "truncated", Utc::now()));
            nodes.push(local("T1", "fine", Utc::now()));
        }

        let report = engine.status("g1", &source).await.unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, "SPRINT-2025-11-10-");
        assert_eq!(report.nodes.len(), 1);
        assert_eq!(report.nodes[0].id, "T1");
    }

    #[tokio::test]
    async fn test_server_side_listing_uses_synced_at() {
        let (engine, store) = engine();
        store.create_node("g1", new_node("Task", Some("T1"), json!({}))).await.unwrap();
        store.create_node("g1", new_node("Task", Some("T2"), json!({}))).await.unwrap();
        store
            .mark_synced("g1", &["T1".to_string()], Utc::now() + Duration::seconds(1))
            .await
            .unwrap();

        let report = engine.list_unsynced("g1").await.unwrap();
        assert_eq!(report.nodes.len(), 1);
        assert_eq!(report.nodes[0].id, "T2");
        assert_eq!(report.nodes[0].state, SyncState::CloudOnly);
    }
}
