//! Storage backends for the knowledge graph.
//!
//! Every method takes the tenant's `graph_id` and never touches data of
//! another tenant. Node reads never carry the vector itself;
//! `embedding_model` is set only when a vector is stored.

pub mod memory;
pub mod neo4j;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use devgraph_core::{
    DevgraphResult, GraphCounts, Node, NodeType, Pagination, Project, Relationship, StatusEvent,
};

pub use memory::MemoryBackend;
pub use neo4j::Neo4jBackend;

/// A node with its cosine similarity to a query vector.
#[derive(Debug, Clone)]
pub struct ScoredNode {
    pub node: Node,
    pub similarity: f32,
}

#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Cheap reachability check.
    async fn ping(&self) -> DevgraphResult<()>;

    /// Node and relationship counts, for one graph or all of them.
    async fn counts(&self, graph_id: Option<&str>) -> DevgraphResult<GraphCounts>;

    /// Insert a new node. A node with the same id in the graph is `VALIDATION`.
    async fn insert_node(&self, node: &Node) -> DevgraphResult<()>;

    /// Overwrite an existing node's properties and bookkeeping fields.
    /// `NOT_FOUND` when absent. The stored vector is left alone.
    async fn replace_node(&self, node: &Node) -> DevgraphResult<()>;

    /// Create or overwrite.
    async fn upsert_node(&self, node: &Node) -> DevgraphResult<()>;

    async fn get_node(&self, graph_id: &str, id: &str) -> DevgraphResult<Option<Node>>;

    /// Nodes with the given ids, in no particular order. Unknown ids are skipped.
    async fn get_nodes(&self, graph_id: &str, ids: &[String]) -> DevgraphResult<Vec<Node>>;

    /// One page of nodes ordered by `(created_at, id)`, plus the total count.
    /// An empty `types` slice matches every type.
    async fn list_nodes(
        &self,
        graph_id: &str,
        types: &[NodeType],
        page: Pagination,
    ) -> DevgraphResult<(Vec<Node>, usize)>;

    /// Every node of a graph.
    async fn all_nodes(&self, graph_id: &str) -> DevgraphResult<Vec<Node>>;

    /// Delete a node and its incident relationships. Returns whether it existed.
    async fn delete_node(&self, graph_id: &str, id: &str) -> DevgraphResult<bool>;

    /// Insert a relationship. A missing endpoint is `VALIDATION`.
    async fn insert_relationship(&self, rel: &Relationship) -> DevgraphResult<()>;

    /// Ids of nodes adjacent to any of `ids`, in either direction.
    async fn neighbor_ids(&self, graph_id: &str, ids: &[String]) -> DevgraphResult<Vec<String>>;

    async fn set_embedding(
        &self,
        graph_id: &str,
        id: &str,
        embedding: &[f32],
        model: &str,
    ) -> DevgraphResult<()>;

    /// Up to `candidates` nodes embedded with `model`, most similar first.
    async fn vector_search(
        &self,
        graph_id: &str,
        query: &[f32],
        model: &str,
        types: &[NodeType],
        candidates: usize,
    ) -> DevgraphResult<Vec<ScoredNode>>;

    /// Number of nodes carrying a vector from `model`.
    async fn count_embedded(&self, graph_id: &str, model: &str) -> DevgraphResult<usize>;

    /// Nodes without a vector, or with a vector from another model.
    async fn nodes_needing_embedding(
        &self,
        graph_id: &str,
        model: &str,
        limit: usize,
    ) -> DevgraphResult<Vec<Node>>;

    async fn mark_synced(
        &self,
        graph_id: &str,
        ids: &[String],
        at: DateTime<Utc>,
    ) -> DevgraphResult<()>;

    /// The most recently updated Sprint whose status is `active`.
    async fn find_active_sprint(&self, graph_id: &str) -> DevgraphResult<Option<Node>>;

    /// Append an event unless the entity's latest event is the same
    /// `(old_status, new_status)` transition. Returns whether it was appended.
    async fn append_event(&self, event: &StatusEvent) -> DevgraphResult<bool>;

    /// Events for one entity, most recent first.
    async fn event_history(
        &self,
        graph_id: &str,
        entity_type: &str,
        entity_id: &str,
        limit: usize,
    ) -> DevgraphResult<Vec<StatusEvent>>;

    async fn get_project(&self, id: &str) -> DevgraphResult<Option<Project>>;

    async fn save_project(&self, project: &Project) -> DevgraphResult<()>;
}

/// Whether a node status counts as active.
pub(crate) fn is_active_status(status: Option<&str>) -> bool {
    status.is_some_and(|s| s.eq_ignore_ascii_case("active"))
}
