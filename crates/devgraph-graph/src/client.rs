//! Neo4j connection client.

use anyhow::{Context, Result};
use neo4rs::{ConfigBuilder, Graph, Query};
use serde::de::DeserializeOwned;

use devgraph_core::config::GraphConfig;
use devgraph_core::GraphCounts;

/// Client for Neo4j knowledge graph operations.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Create a new GraphClient from config.
    ///
    /// neo4rs builds its pool lazily, so `Graph::connect` alone does not reach
    /// the server. A `RETURN 1` ping forces the bolt handshake so callers get
    /// a fast failure when Neo4j is unreachable.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let neo4j_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.max_connections)
            .fetch_size(config.fetch_size)
            .build()
            .context("Failed to build Neo4j config")?;

        let graph = Graph::connect(neo4j_config)
            .await
            .context("Failed to create Neo4j connection pool")?;

        let client = Self { graph };
        client.ping().await?;
        Ok(client)
    }

    pub async fn ping(&self) -> Result<()> {
        self.graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .context("Neo4j is not responding to queries")
    }

    /// Execute a Cypher query that returns no results.
    pub async fn execute(&self, query: Query) -> Result<()> {
        self.graph.run(query).await.context("Neo4j query execution failed")?;
        Ok(())
    }

    /// Execute a Cypher query and return results as rows.
    pub async fn query(&self, query: Query) -> Result<Vec<neo4rs::Row>> {
        let mut result = self.graph.execute(query).await.context("Neo4j query failed")?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await.context("Failed to read Neo4j row")? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a Cypher query and return a single scalar value.
    pub async fn query_scalar<T: DeserializeOwned>(&self, query: Query, field: &str) -> Result<Option<T>> {
        let rows = self.query(query).await?;
        if let Some(row) = rows.into_iter().next() {
            let val: T = row
                .get(field)
                .map_err(|e| anyhow::anyhow!("Failed to get field '{}': {:?}", field, e))?;
            Ok(Some(val))
        } else {
            Ok(None)
        }
    }

    /// Node and relationship counts, optionally scoped to one graph.
    pub async fn get_counts(&self, graph_id: Option<&str>) -> Result<GraphCounts> {
        let (node_query, rel_query) = match graph_id {
            Some(graph_id) => (
                Query::new("MATCH (n:KnowledgeNode {graph_id: $graph_id}) RETURN count(n) AS count".to_string())
                    .param("graph_id", graph_id),
                Query::new(
                    "MATCH (:KnowledgeNode {graph_id: $graph_id})-[r]->(:KnowledgeNode) RETURN count(r) AS count"
                        .to_string(),
                )
                .param("graph_id", graph_id),
            ),
            None => (
                Query::new("MATCH (n:KnowledgeNode) RETURN count(n) AS count".to_string()),
                Query::new("MATCH (:KnowledgeNode)-[r]->(:KnowledgeNode) RETURN count(r) AS count".to_string()),
            ),
        };

        let node_count: i64 = self.query_scalar(node_query, "count").await?.unwrap_or(0);
        let rel_count: i64 = self.query_scalar(rel_query, "count").await?.unwrap_or(0);

        Ok(GraphCounts {
            nodes: node_count as usize,
            relationships: rel_count as usize,
        })
    }
}
