//! Shared fixtures for this crate's tests.

use std::sync::Arc;

use async_trait::async_trait;

use devgraph_core::{DevgraphError, DevgraphResult, NewNode};
use devgraph_embedding::{Embedder, EmbedderFactory, EmbeddingsService};

use crate::backend::MemoryBackend;
use crate::store::GraphStore;

/// Keywords mapped onto the axes of the fake vector space.
const AXES: [&str; 4] = ["auth", "cache", "deploy", "test"];

/// Deterministic 4-dimensional embedder: one axis per keyword, plus a small
/// constant so that no vector is zero. Texts containing "unembeddable" fail.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn dimension(&self) -> usize {
        AXES.len()
    }

    async fn embed(&self, text: &str) -> DevgraphResult<Vec<f32>> {
        let text = text.to_lowercase();
        if text.contains("unembeddable") {
            return Err(DevgraphError::unavailable("fake model rejected input"));
        }
        Ok(AXES
            .iter()
            .map(|k| text.matches(k).count() as f32 + 0.01)
            .collect())
    }
}

pub struct KeywordFactory;

#[async_trait]
impl EmbedderFactory for KeywordFactory {
    async fn load(&self) -> DevgraphResult<Arc<dyn Embedder>> {
        Ok(Arc::new(KeywordEmbedder))
    }
}

pub fn keyword_embeddings() -> Arc<EmbeddingsService> {
    Arc::new(EmbeddingsService::new(Arc::new(KeywordFactory), "fake:v1", AXES.len()))
}

/// A store over a fresh in-memory backend with the keyword embedder.
pub fn memory_store() -> (Arc<MemoryBackend>, GraphStore) {
    let backend = Arc::new(MemoryBackend::new());
    let store = GraphStore::new(backend.clone(), keyword_embeddings(), 3);
    (backend, store)
}

pub fn store_without_embeddings() -> GraphStore {
    GraphStore::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(EmbeddingsService::unconfigured()),
        3,
    )
}

pub fn new_node(node_type: &str, id: Option<&str>, properties: serde_json::Value) -> NewNode {
    NewNode {
        id: id.map(str::to_string),
        node_type: node_type.to_string(),
        properties: serde_json::from_value(properties).unwrap_or_default(),
        ..Default::default()
    }
}
