//! Wiring of configured services for commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use devgraph_core::{DevgraphConfig, RetryPolicy};
use devgraph_embedding::EmbeddingsService;
use devgraph_graph::{GraphBackend, GraphStore, Neo4jBackend};

pub fn retry_policy(config: &DevgraphConfig) -> RetryPolicy {
    RetryPolicy::from_limits(&config.limits)
}

pub fn embeddings(config: &DevgraphConfig) -> Arc<EmbeddingsService> {
    Arc::new(EmbeddingsService::from_config(
        &config.embedding,
        retry_policy(config),
    ))
}

pub async fn neo4j(config: &DevgraphConfig) -> Result<Neo4jBackend> {
    let backend = Neo4jBackend::connect(&config.graph, retry_policy(config))
        .await
        .with_context(|| format!("Failed to connect to Neo4j at {}", config.graph.uri))?;
    info!(uri = %config.graph.uri, "Connected to Neo4j");
    Ok(backend)
}

/// A store over Neo4j with the configured embeddings.
pub async fn store(config: &DevgraphConfig) -> Result<Arc<GraphStore>> {
    let backend: Arc<dyn GraphBackend> = Arc::new(neo4j(config).await?);
    Ok(Arc::new(GraphStore::new(
        backend,
        embeddings(config),
        config.limits.max_traversal_depth,
    )))
}
