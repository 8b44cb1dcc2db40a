//! In-memory backend.
//!
//! Tenant-keyed maps behind a `tokio::sync::RwLock`. Used by tests and by
//! `devgraph serve --memory`.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use devgraph_core::{
    DevgraphError, DevgraphResult, GraphCounts, Node, NodeType, Pagination, Project, Relationship,
    StatusEvent,
};

use super::{is_active_status, GraphBackend, ScoredNode};

#[derive(Default)]
struct Tenant {
    nodes: HashMap<String, Node>,
    relationships: Vec<Relationship>,
    events: Vec<StatusEvent>,
}

/// Ephemeral, process-local graph storage.
#[derive(Default)]
pub struct MemoryBackend {
    tenants: RwLock<HashMap<String, Tenant>>,
    projects: RwLock<HashMap<String, Project>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Cosine similarity of two vectors. Zero for mismatched lengths or zero norms.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Copy of a stored node as reads return it: without the vector.
fn read_view(node: &Node) -> Node {
    let mut out = node.clone();
    if out.embedding.take().is_none() {
        out.embedding_model = None;
    }
    out
}

fn by_creation(a: &Node, b: &Node) -> Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl GraphBackend for MemoryBackend {
    async fn ping(&self) -> DevgraphResult<()> {
        Ok(())
    }

    async fn counts(&self, graph_id: Option<&str>) -> DevgraphResult<GraphCounts> {
        let tenants = self.tenants.read().await;
        let mut counts = GraphCounts::default();
        for (id, tenant) in tenants.iter() {
            if graph_id.is_some_and(|g| g != id) {
                continue;
            }
            counts.nodes += tenant.nodes.len();
            counts.relationships += tenant.relationships.len();
        }
        Ok(counts)
    }

    async fn insert_node(&self, node: &Node) -> DevgraphResult<()> {
        let mut tenants = self.tenants.write().await;
        let tenant = tenants.entry(node.graph_id.clone()).or_default();
        if tenant.nodes.contains_key(&node.id) {
            return Err(DevgraphError::validation(format!(
                "Node '{}' already exists in graph '{}'",
                node.id, node.graph_id
            )));
        }
        tenant.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn replace_node(&self, node: &Node) -> DevgraphResult<()> {
        let mut tenants = self.tenants.write().await;
        let stored = tenants
            .get_mut(&node.graph_id)
            .and_then(|t| t.nodes.get_mut(&node.id))
            .ok_or_else(|| DevgraphError::not_found("Node", &node.id))?;

        let embedding = stored.embedding.take();
        let embedding_model = stored.embedding_model.take();
        *stored = node.clone();
        stored.embedding = embedding;
        stored.embedding_model = embedding_model;
        Ok(())
    }

    async fn upsert_node(&self, node: &Node) -> DevgraphResult<()> {
        let mut tenants = self.tenants.write().await;
        let tenant = tenants.entry(node.graph_id.clone()).or_default();
        match tenant.nodes.get_mut(&node.id) {
            Some(stored) => {
                let embedding = stored.embedding.take();
                let embedding_model = stored.embedding_model.take();
                *stored = node.clone();
                if stored.embedding.is_none() {
                    stored.embedding = embedding;
                    stored.embedding_model = embedding_model;
                }
            }
            None => {
                tenant.nodes.insert(node.id.clone(), node.clone());
            }
        }
        Ok(())
    }

    async fn get_node(&self, graph_id: &str, id: &str) -> DevgraphResult<Option<Node>> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(graph_id)
            .and_then(|t| t.nodes.get(id))
            .map(read_view))
    }

    async fn get_nodes(&self, graph_id: &str, ids: &[String]) -> DevgraphResult<Vec<Node>> {
        let tenants = self.tenants.read().await;
        let Some(tenant) = tenants.get(graph_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| tenant.nodes.get(id))
            .map(read_view)
            .collect())
    }

    async fn list_nodes(
        &self,
        graph_id: &str,
        types: &[NodeType],
        page: Pagination,
    ) -> DevgraphResult<(Vec<Node>, usize)> {
        let tenants = self.tenants.read().await;
        let Some(tenant) = tenants.get(graph_id) else {
            return Ok((Vec::new(), 0));
        };

        let mut matching: Vec<&Node> = tenant
            .nodes
            .values()
            .filter(|n| types.is_empty() || types.contains(&n.node_type))
            .collect();
        matching.sort_by(|a, b| by_creation(a, b));

        let total = matching.len();
        let items = matching[page.range(total)].iter().map(|n| read_view(n)).collect();
        Ok((items, total))
    }

    async fn all_nodes(&self, graph_id: &str) -> DevgraphResult<Vec<Node>> {
        let tenants = self.tenants.read().await;
        let mut nodes: Vec<Node> = tenants
            .get(graph_id)
            .map(|t| t.nodes.values().map(read_view).collect())
            .unwrap_or_default();
        nodes.sort_by(by_creation);
        Ok(nodes)
    }

    async fn delete_node(&self, graph_id: &str, id: &str) -> DevgraphResult<bool> {
        let mut tenants = self.tenants.write().await;
        let Some(tenant) = tenants.get_mut(graph_id) else {
            return Ok(false);
        };
        if tenant.nodes.remove(id).is_none() {
            return Ok(false);
        }
        tenant
            .relationships
            .retain(|r| r.source_id != id && r.target_id != id);
        Ok(true)
    }

    async fn insert_relationship(&self, rel: &Relationship) -> DevgraphResult<()> {
        let mut tenants = self.tenants.write().await;
        let tenant = tenants.entry(rel.graph_id.clone()).or_default();
        for endpoint in [&rel.source_id, &rel.target_id] {
            if !tenant.nodes.contains_key(endpoint) {
                return Err(DevgraphError::validation(format!(
                    "Relationship endpoint '{}' does not exist in graph '{}'",
                    endpoint, rel.graph_id
                )));
            }
        }
        tenant.relationships.push(rel.clone());
        Ok(())
    }

    async fn neighbor_ids(&self, graph_id: &str, ids: &[String]) -> DevgraphResult<Vec<String>> {
        let tenants = self.tenants.read().await;
        let Some(tenant) = tenants.get(graph_id) else {
            return Ok(Vec::new());
        };

        let frontier: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        for rel in &tenant.relationships {
            if frontier.contains(rel.source_id.as_str()) && seen.insert(rel.target_id.as_str()) {
                out.push(rel.target_id.clone());
            }
            if frontier.contains(rel.target_id.as_str()) && seen.insert(rel.source_id.as_str()) {
                out.push(rel.source_id.clone());
            }
        }
        Ok(out)
    }

    async fn set_embedding(
        &self,
        graph_id: &str,
        id: &str,
        embedding: &[f32],
        model: &str,
    ) -> DevgraphResult<()> {
        let mut tenants = self.tenants.write().await;
        let node = tenants
            .get_mut(graph_id)
            .and_then(|t| t.nodes.get_mut(id))
            .ok_or_else(|| DevgraphError::not_found("Node", id))?;
        node.embedding = Some(embedding.to_vec());
        node.embedding_model = Some(model.to_string());
        Ok(())
    }

    async fn vector_search(
        &self,
        graph_id: &str,
        query: &[f32],
        model: &str,
        types: &[NodeType],
        candidates: usize,
    ) -> DevgraphResult<Vec<ScoredNode>> {
        let tenants = self.tenants.read().await;
        let Some(tenant) = tenants.get(graph_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredNode> = tenant
            .nodes
            .values()
            .filter(|n| n.is_embedded_with(model))
            .filter(|n| types.is_empty() || types.contains(&n.node_type))
            .filter_map(|n| {
                let vector = n.embedding.as_deref()?;
                Some(ScoredNode {
                    similarity: cosine_similarity(query, vector),
                    node: read_view(n),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.node.id.cmp(&b.node.id))
        });
        scored.truncate(candidates);
        Ok(scored)
    }

    async fn count_embedded(&self, graph_id: &str, model: &str) -> DevgraphResult<usize> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(graph_id)
            .map(|t| t.nodes.values().filter(|n| n.is_embedded_with(model)).count())
            .unwrap_or(0))
    }

    async fn nodes_needing_embedding(
        &self,
        graph_id: &str,
        model: &str,
        limit: usize,
    ) -> DevgraphResult<Vec<Node>> {
        let tenants = self.tenants.read().await;
        let Some(tenant) = tenants.get(graph_id) else {
            return Ok(Vec::new());
        };
        let mut nodes: Vec<&Node> = tenant
            .nodes
            .values()
            .filter(|n| !n.is_embedded_with(model))
            .collect();
        nodes.sort_by(|a, b| by_creation(a, b));
        Ok(nodes.into_iter().take(limit).map(read_view).collect())
    }

    async fn mark_synced(
        &self,
        graph_id: &str,
        ids: &[String],
        at: DateTime<Utc>,
    ) -> DevgraphResult<()> {
        let mut tenants = self.tenants.write().await;
        if let Some(tenant) = tenants.get_mut(graph_id) {
            for id in ids {
                if let Some(node) = tenant.nodes.get_mut(id) {
                    node.synced_at = Some(at);
                }
            }
        }
        Ok(())
    }

    async fn find_active_sprint(&self, graph_id: &str) -> DevgraphResult<Option<Node>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(graph_id).and_then(|t| {
            t.nodes
                .values()
                .filter(|n| n.node_type == NodeType::Sprint && is_active_status(n.status()))
                .max_by(|a, b| {
                    a.updated_at
                        .cmp(&b.updated_at)
                        .then_with(|| b.id.cmp(&a.id))
                })
                .map(read_view)
        }))
    }

    async fn append_event(&self, event: &StatusEvent) -> DevgraphResult<bool> {
        let mut tenants = self.tenants.write().await;
        let tenant = tenants.entry(event.graph_id.clone()).or_default();
        let latest = tenant
            .events
            .iter()
            .rev()
            .find(|e| e.entity_type == event.entity_type && e.entity_id == event.entity_id);
        if latest.is_some_and(|e| e.repeats(event)) {
            return Ok(false);
        }
        tenant.events.push(event.clone());
        Ok(true)
    }

    async fn event_history(
        &self,
        graph_id: &str,
        entity_type: &str,
        entity_id: &str,
        limit: usize,
    ) -> DevgraphResult<Vec<StatusEvent>> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(graph_id)
            .map(|t| {
                t.events
                    .iter()
                    .rev()
                    .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_project(&self, id: &str) -> DevgraphResult<Option<Project>> {
        Ok(self.projects.read().await.get(id).cloned())
    }

    async fn save_project(&self, project: &Project) -> DevgraphResult<()> {
        self.projects
            .write()
            .await
            .insert(project.id.clone(), project.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
