//! Semantic similarity search over embedded nodes.
//!
//! The query is embedded with the current model, the backend returns a
//! candidate pool whose size depends only on `limit`, and the threshold is
//! applied afterwards. Raising the threshold therefore only ever removes
//! results.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use devgraph_core::node::validate_graph_id;
use devgraph_core::{DevgraphError, DevgraphResult, Node};
use devgraph_embedding::EmbeddingsService;

use crate::backend::GraphBackend;
use crate::store::parse_types;

pub const DEFAULT_THRESHOLD: f32 = 0.7;
pub const DEFAULT_SEARCH_LIMIT: i64 = 10;
pub const MAX_SEARCH_LIMIT: i64 = 100;

/// Candidates fetched per requested result.
const CANDIDATE_FACTOR: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub threshold: Option<f32>,
    pub limit: Option<i64>,
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub node: Node,
    pub similarity: f32,
}

pub struct SemanticSearchEngine {
    backend: Arc<dyn GraphBackend>,
    embeddings: Arc<EmbeddingsService>,
}

impl SemanticSearchEngine {
    pub fn new(backend: Arc<dyn GraphBackend>, embeddings: Arc<EmbeddingsService>) -> Self {
        Self {
            backend,
            embeddings,
        }
    }

    pub async fn search(
        &self,
        graph_id: &str,
        query: &str,
        options: SearchOptions,
    ) -> DevgraphResult<Vec<RankedResult>> {
        validate_graph_id(graph_id)?;
        if query.trim().is_empty() {
            return Err(DevgraphError::validation("Parameter 'query' must not be empty"));
        }

        let threshold = options.threshold.unwrap_or(DEFAULT_THRESHOLD);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DevgraphError::validation(format!(
                "Parameter 'threshold' must be within [0, 1], got {}",
                threshold
            )));
        }

        let limit = options.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        if limit < 1 {
            return Err(DevgraphError::validation("Parameter 'limit' must be at least 1"));
        }
        let limit = limit.min(MAX_SEARCH_LIMIT) as usize;
        let types = parse_types(&options.types)?;

        if !self.embeddings.is_configured() {
            return Err(DevgraphError::unavailable("Semantic search requires embeddings"));
        }
        let model = self.embeddings.model_version();
        if self.backend.count_embedded(graph_id, model).await? == 0 {
            return Err(DevgraphError::unavailable(format!(
                "No nodes in graph '{}' are embedded with model '{}'",
                graph_id, model
            )));
        }

        let vector = self.embeddings.embed(query).await?;
        let mut results: Vec<RankedResult> = self
            .backend
            .vector_search(graph_id, &vector, model, &types, limit * CANDIDATE_FACTOR)
            .await?
            .into_iter()
            .filter(|c| c.similarity >= threshold)
            .map(|c| RankedResult {
                node: c.node,
                similarity: c.similarity,
            })
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.node.id.cmp(&b.node.id))
        });
        results.truncate(limit);

        debug!(graph_id, threshold, limit, results = results.len(), "Semantic search");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{keyword_embeddings, memory_store, new_node};
    use devgraph_core::NodeType;
    use serde_json::json;

    async fn seeded() -> (SemanticSearchEngine, crate::store::GraphStore) {
        let (backend, store) = memory_store();
        let docs = [
            ("P1", "Pattern", "auth auth token"),
            ("P2", "Pattern", "auth cache"),
            ("G1", "Gotcha", "cache cache eviction"),
            ("T1", "Task", "deploy pipeline"),
            ("T2", "Task", "auth test"),
        ];
        for (id, node_type, title) in docs {
            store
                .ingest("g1", new_node(node_type, Some(id), json!({ "title": title })))
                .await
                .unwrap();
        }
        (SemanticSearchEngine::new(backend, keyword_embeddings()), store)
    }

    fn opts(threshold: f32, limit: i64) -> SearchOptions {
        SearchOptions {
            threshold: Some(threshold),
            limit: Some(limit),
            types: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_results_ranked_by_similarity() {
        let (engine, _) = seeded().await;
        let results = engine.search("g1", "auth", opts(0.5, 10)).await.unwrap();
        assert_eq!(results[0].node.id, "P1");
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        assert!(results.iter().all(|r| r.similarity >= 0.5));
    }

    #[tokio::test]
    async fn test_threshold_monotonicity() {
        let (engine, _) = seeded().await;
        let thresholds = [0.0, 0.2, 0.5, 0.7, 0.9, 1.0];
        let mut previous: Option<Vec<String>> = None;
        for t in thresholds {
            let ids: Vec<String> = engine
                .search("g1", "auth cache", opts(t, 3))
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.node.id)
                .collect();
            if let Some(prev) = &previous {
                assert!(ids.iter().all(|id| prev.contains(id)), "{:?} not within {:?}", ids, prev);
            }
            previous = Some(ids);
        }
    }

    #[tokio::test]
    async fn test_type_filter_and_limit() {
        let (engine, _) = seeded().await;
        let results = engine
            .search(
                "g1",
                "auth",
                SearchOptions {
                    threshold: Some(0.0),
                    limit: Some(1),
                    types: vec!["task".to_string()],
                },
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node.node_type, NodeType::Task);
    }

    #[tokio::test]
    async fn test_validation() {
        let (engine, _) = seeded().await;
        for (threshold, limit) in [(1.5, 10), (-0.1, 10), (0.5, 0)] {
            let err = engine.search("g1", "auth", opts(threshold, limit)).await.unwrap_err();
            assert_eq!(err.code(), "VALIDATION");
        }
        let err = engine.search("g1", " ", SearchOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[tokio::test]
    async fn test_unavailable_without_embedded_nodes() {
        let (engine, store) = seeded().await;
        let err = engine.search("g2", "auth", SearchOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");

        // Nodes embedded by another model version do not count.
        store.create_node("g3", new_node("Task", Some("T1"), json!({"title": "auth"}))).await.unwrap();
        store
            .backend()
            .set_embedding("g3", "T1", &[1.0, 0.0, 0.0, 0.0], "old:v0")
            .await
            .unwrap();
        let err = engine.search("g3", "auth", SearchOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_search_is_tenant_scoped() {
        let (engine, store) = seeded().await;
        store
            .ingest("g2", new_node("Pattern", Some("X1"), json!({"title": "auth auth"})))
            .await
            .unwrap();
        let results = engine.search("g1", "auth", opts(0.0, 100)).await.unwrap();
        assert!(results.iter().all(|r| r.node.graph_id == "g1"));
        assert!(!results.iter().any(|r| r.node.id == "X1"));
    }
}
