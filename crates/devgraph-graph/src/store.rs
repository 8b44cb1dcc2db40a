//! Typed CRUD and traversal over the knowledge graph.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use devgraph_core::node::{
    apply_patch, content_hash, generate_node_id, validate_graph_id, validate_node_id,
    validate_properties,
};
use devgraph_core::{
    DevgraphError, DevgraphResult, GraphCounts, NewNode, NewRelationship, Node, NodePatch,
    NodeType, Page, Pagination, Properties, Relationship, RelationshipType,
};
use devgraph_embedding::EmbeddingsService;

use crate::backend::GraphBackend;

/// Result of a single write that may also embed the node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingested {
    pub node: Node,
    /// Whether the node carries a vector for its current content.
    pub embedded: bool,
}

/// Result of a partial update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Updated {
    pub node: Node,
    pub previous_status: Option<String>,
    pub embedded: bool,
}

/// Error attached to one item of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct ItemError {
    pub code: String,
    pub message: String,
}

impl From<&DevgraphError> for ItemError {
    fn from(e: &DevgraphError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.public_message(),
        }
    }
}

/// Outcome of one item of a batch ingest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub embedded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub created: usize,
    pub failed: usize,
    pub items: Vec<BatchItem>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub embedded: usize,
    pub failed: usize,
    /// Nodes with no text to embed.
    pub skipped: usize,
}

/// Parse a list of type names, failing on the first unknown one.
pub fn parse_types(labels: &[String]) -> DevgraphResult<Vec<NodeType>> {
    labels
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.parse())
        .collect()
}

/// Node and relationship storage with validation, traversal and best-effort
/// embedding.
pub struct GraphStore {
    backend: Arc<dyn GraphBackend>,
    embeddings: Arc<EmbeddingsService>,
    max_depth: u32,
}

impl GraphStore {
    pub fn new(
        backend: Arc<dyn GraphBackend>,
        embeddings: Arc<EmbeddingsService>,
        max_depth: u32,
    ) -> Self {
        Self {
            backend,
            embeddings,
            max_depth,
        }
    }

    pub fn backend(&self) -> &Arc<dyn GraphBackend> {
        &self.backend
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingsService> {
        &self.embeddings
    }

    pub async fn ping(&self) -> DevgraphResult<()> {
        self.backend.ping().await
    }

    pub async fn counts(&self, graph_id: Option<&str>) -> DevgraphResult<GraphCounts> {
        self.backend.counts(graph_id).await
    }

    fn build_node(&self, graph_id: &str, new: NewNode) -> DevgraphResult<Node> {
        validate_graph_id(graph_id)?;
        let node_type: NodeType = new.node_type.parse()?;
        let id = match new.id {
            Some(id) => {
                validate_node_id(&id)?;
                id
            }
            None => generate_node_id(node_type),
        };

        validate_properties(&new.properties)?;
        let mut properties = Properties::new();
        apply_patch(&mut properties, &new.properties);

        let embedding_model = match &new.embedding {
            Some(vector) => Some(self.supplied_model(vector, new.embedding_model)?),
            None => None,
        };

        let now = Utc::now();
        Ok(Node {
            id,
            graph_id: graph_id.to_string(),
            node_type,
            content_hash: content_hash(&properties),
            properties,
            embedding: new.embedding,
            embedding_model,
            created_at: now,
            updated_at: now,
            edited_by: new.edited_by,
            synced_at: None,
        })
    }

    /// Model tag for a caller-supplied vector.
    fn supplied_model(&self, vector: &[f32], model: Option<String>) -> DevgraphResult<String> {
        if self.embeddings.is_configured() {
            self.embeddings.check_dimension(vector)?;
            return Ok(model.unwrap_or_else(|| self.embeddings.model_version().to_string()));
        }
        model.ok_or_else(|| {
            DevgraphError::validation("'embeddingModel' is required with a supplied embedding")
        })
    }

    /// Create a node. A supplied vector is stored with it; nothing is
    /// computed here.
    pub async fn create_node(&self, graph_id: &str, new: NewNode) -> DevgraphResult<Node> {
        let mut node = self.build_node(graph_id, new)?;
        self.backend.insert_node(&node).await?;

        if let (Some(vector), Some(model)) = (node.embedding.take(), node.embedding_model.as_deref()) {
            self.backend
                .set_embedding(graph_id, &node.id, &vector, model)
                .await?;
        }

        info!(graph_id, node_id = %node.id, node_type = %node.node_type, "Node created");
        Ok(node)
    }

    /// Create a node, then try to embed it.
    ///
    /// Embedding is not atomic with the write: the node is stored either way
    /// and `embedded` reports whether a vector was attached.
    pub async fn ingest(&self, graph_id: &str, new: NewNode) -> DevgraphResult<Ingested> {
        let supplied = new.embedding.is_some();
        let mut node = self.create_node(graph_id, new).await?;
        let embedded = supplied || self.try_embed(&mut node).await;
        Ok(Ingested { node, embedded })
    }

    /// Create many nodes. Each item succeeds or fails on its own; the texts
    /// of the created nodes are then embedded in one batch.
    pub async fn ingest_batch(&self, graph_id: &str, items: Vec<NewNode>) -> DevgraphResult<BatchReport> {
        validate_graph_id(graph_id)?;

        let mut report = BatchReport::default();
        let mut pending: Vec<(usize, Node)> = Vec::new();

        for (index, new) in items.into_iter().enumerate() {
            let supplied = new.embedding.is_some();
            match self.create_node(graph_id, new).await {
                Ok(node) => {
                    report.created += 1;
                    report.items.push(BatchItem {
                        index,
                        id: Some(node.id.clone()),
                        embedded: supplied,
                        error: None,
                    });
                    if !supplied {
                        pending.push((index, node));
                    }
                }
                Err(e) => {
                    debug!(graph_id, index, error = %e, "Batch item rejected");
                    report.failed += 1;
                    report.items.push(BatchItem {
                        index,
                        id: None,
                        embedded: false,
                        error: Some(ItemError::from(&e)),
                    });
                }
            }
        }

        let embedded = self.embed_nodes(graph_id, &pending).await;
        for item in report.items.iter_mut() {
            if embedded.contains(&item.index) {
                item.embedded = true;
            }
        }

        info!(
            graph_id,
            created = report.created,
            failed = report.failed,
            embedded = embedded.len(),
            "Batch ingested"
        );
        Ok(report)
    }

    /// Embed `(key, node)` pairs in one batch. Returns the keys that got a
    /// vector. Failures are logged, never raised.
    async fn embed_nodes(&self, graph_id: &str, nodes: &[(usize, Node)]) -> HashSet<usize> {
        let mut done = HashSet::new();
        if !self.embeddings.is_configured() {
            return done;
        }

        let with_text: Vec<(usize, &Node, String)> = nodes
            .iter()
            .filter_map(|(key, node)| node.embedding_text().map(|t| (*key, node, t)))
            .collect();
        if with_text.is_empty() {
            return done;
        }

        let texts: Vec<String> = with_text.iter().map(|(_, _, t)| t.clone()).collect();
        let results = match self.embeddings.embed_batch(&texts).await {
            Ok(results) => results,
            Err(e) => {
                warn!(graph_id, error = %e, "Embeddings unavailable; nodes stored without vectors");
                return done;
            }
        };

        let model = self.embeddings.model_version();
        for ((key, node, _), result) in with_text.into_iter().zip(results) {
            let stored = match result {
                Ok(vector) => self.backend.set_embedding(graph_id, &node.id, &vector, model).await,
                Err(e) => Err(e),
            };
            match stored {
                Ok(()) => {
                    done.insert(key);
                }
                Err(e) => warn!(graph_id, node_id = %node.id, error = %e, "Embedding failed"),
            }
        }
        done
    }

    /// Best-effort embedding of one node. On success `embedding_model` is set.
    async fn try_embed(&self, node: &mut Node) -> bool {
        if !self.embeddings.is_configured() {
            return false;
        }
        let Some(text) = node.embedding_text() else {
            return false;
        };

        let model = self.embeddings.model_version();
        let result = match self.embeddings.embed(&text).await {
            Ok(vector) => {
                self.backend
                    .set_embedding(&node.graph_id, &node.id, &vector, model)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                node.embedding_model = Some(model.to_string());
                true
            }
            Err(e) => {
                warn!(
                    graph_id = %node.graph_id,
                    node_id = %node.id,
                    error = %e,
                    "Embedding failed; node stored without vector"
                );
                false
            }
        }
    }

    pub async fn get_node(&self, graph_id: &str, id: &str) -> DevgraphResult<Node> {
        validate_graph_id(graph_id)?;
        self.backend
            .get_node(graph_id, id)
            .await?
            .ok_or_else(|| DevgraphError::not_found("Node", id))
    }

    /// One page of nodes ordered by `(created_at, id)`.
    pub async fn list_nodes(
        &self,
        graph_id: &str,
        labels: &[String],
        page: Pagination,
    ) -> DevgraphResult<Page<Node>> {
        validate_graph_id(graph_id)?;
        let types = parse_types(labels)?;
        let (items, total) = self.backend.list_nodes(graph_id, &types, page).await?;
        Ok(Page {
            items,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }

    pub async fn all_nodes(&self, graph_id: &str) -> DevgraphResult<Vec<Node>> {
        validate_graph_id(graph_id)?;
        self.backend.all_nodes(graph_id).await
    }

    /// Merge a property patch into a node. `null` removes a key.
    ///
    /// `synced_at` is never touched. When the embedded text changes the node
    /// is re-embedded on a best-effort basis.
    pub async fn update_node(&self, graph_id: &str, id: &str, patch: NodePatch) -> DevgraphResult<Updated> {
        validate_properties(&patch.properties)?;
        let mut node = self.get_node(graph_id, id).await?;

        let previous_status = node.status().map(str::to_string);
        let previous_text = node.embedding_text();

        apply_patch(&mut node.properties, &patch.properties);
        node.content_hash = content_hash(&node.properties);
        node.updated_at = Utc::now();
        if patch.edited_by.is_some() {
            node.edited_by = patch.edited_by;
        }

        self.backend.replace_node(&node).await?;
        debug!(graph_id, node_id = id, "Node updated");

        let embedded = if node.embedding_text() != previous_text {
            node.embedding_model = None;
            self.try_embed(&mut node).await
        } else {
            node.embedding_model.is_some()
        };

        Ok(Updated {
            node,
            previous_status,
            embedded,
        })
    }

    /// Create or overwrite a node as-is, keeping `created_at` of an existing
    /// one, then try to embed it.
    pub async fn upsert_node(&self, mut node: Node) -> DevgraphResult<Ingested> {
        validate_graph_id(&node.graph_id)?;
        validate_node_id(&node.id)?;
        validate_properties(&node.properties)?;

        if let Some(existing) = self.backend.get_node(&node.graph_id, &node.id).await? {
            node.created_at = existing.created_at;
        }
        node.content_hash = content_hash(&node.properties);
        node.embedding = None;
        node.embedding_model = None;

        self.backend.upsert_node(&node).await?;
        let embedded = self.try_embed(&mut node).await;
        Ok(Ingested { node, embedded })
    }

    /// Delete a node and every relationship touching it.
    pub async fn delete_node(&self, graph_id: &str, id: &str) -> DevgraphResult<()> {
        validate_graph_id(graph_id)?;
        if !self.backend.delete_node(graph_id, id).await? {
            return Err(DevgraphError::not_found("Node", id));
        }
        info!(graph_id, node_id = id, "Node deleted");
        Ok(())
    }

    /// Create a relationship between two existing nodes of the same graph.
    pub async fn create_relationship(
        &self,
        graph_id: &str,
        new: NewRelationship,
    ) -> DevgraphResult<Relationship> {
        validate_graph_id(graph_id)?;
        let rel_type: RelationshipType = new.rel_type.parse()?;
        validate_node_id(&new.source_id)?;
        validate_node_id(&new.target_id)?;
        validate_properties(&new.properties)?;

        let rel = Relationship {
            graph_id: graph_id.to_string(),
            rel_type,
            source_id: new.source_id,
            target_id: new.target_id,
            properties: new.properties,
            created_at: Utc::now(),
        };
        self.backend.insert_relationship(&rel).await?;

        debug!(
            graph_id,
            rel_type = %rel.rel_type,
            source = %rel.source_id,
            target = %rel.target_id,
            "Relationship created"
        );
        Ok(rel)
    }

    /// Nodes within `depth` hops of `id`, in either direction, closest first.
    ///
    /// The start node is excluded and every node appears once. A depth
    /// outside `1..=max_depth` is rejected.
    pub async fn get_adjacencies(
        &self,
        graph_id: &str,
        id: &str,
        depth: Option<i64>,
    ) -> DevgraphResult<Vec<Node>> {
        let depth = depth.unwrap_or(1);
        if depth < 1 || depth > i64::from(self.max_depth) {
            return Err(DevgraphError::validation(format!(
                "Parameter 'depth' must be between 1 and {}, got {}",
                self.max_depth, depth
            )));
        }
        self.get_node(graph_id, id).await?;

        let mut visited: HashSet<String> = HashSet::from([id.to_string()]);
        let mut frontier = vec![id.to_string()];
        let mut order = Vec::new();

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let mut next = self.backend.neighbor_ids(graph_id, &frontier).await?;
            next.retain(|n| visited.insert(n.clone()));
            next.sort();
            order.extend(next.iter().cloned());
            frontier = next;
        }

        let mut by_id: HashMap<String, Node> = self
            .backend
            .get_nodes(graph_id, &order)
            .await?
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();

        Ok(order.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// The active sprint of a graph.
    pub async fn find_active_sprint(&self, graph_id: &str) -> DevgraphResult<Node> {
        validate_graph_id(graph_id)?;
        self.backend
            .find_active_sprint(graph_id)
            .await?
            .ok_or_else(|| DevgraphError::not_found("Active sprint", graph_id))
    }

    pub async fn mark_synced(
        &self,
        graph_id: &str,
        ids: &[String],
        at: DateTime<Utc>,
    ) -> DevgraphResult<()> {
        self.backend.mark_synced(graph_id, ids, at).await
    }

    /// Embed up to `limit` nodes that have no vector or one from another
    /// model version.
    pub async fn refresh_embeddings(&self, graph_id: &str, limit: usize) -> DevgraphResult<RefreshReport> {
        validate_graph_id(graph_id)?;
        let model = self.embeddings.model_version().to_string();
        self.embeddings.initialize().await?;

        let candidates = self
            .backend
            .nodes_needing_embedding(graph_id, &model, limit)
            .await?;

        let mut report = RefreshReport::default();
        let keyed: Vec<(usize, Node)> = candidates.into_iter().enumerate().collect();
        let with_text = keyed
            .iter()
            .filter(|(_, n)| n.embedding_text().is_some())
            .count();
        report.skipped = keyed.len() - with_text;

        let done = self.embed_nodes(graph_id, &keyed).await;
        report.embedded = done.len();
        report.failed = with_text - done.len();

        info!(
            graph_id,
            model = %model,
            embedded = report.embedded,
            failed = report.failed,
            skipped = report.skipped,
            "Embeddings refreshed"
        );
        Ok(report)
    }
}
