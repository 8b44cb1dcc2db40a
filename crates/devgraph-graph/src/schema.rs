//! Neo4j schema initialization (constraints and indexes).

use anyhow::Result;
use neo4rs::Query;
use tracing::{info, warn};

use crate::client::GraphClient;

/// Name of the vector index over node embeddings.
pub const VECTOR_INDEX: &str = "knowledge_embeddings";

/// Cypher statements for schema initialization.
const SCHEMA_STATEMENTS: &[&str] = &[
    // Node ids are unique per tenant, not globally.
    "CREATE CONSTRAINT knowledge_node_key IF NOT EXISTS FOR (n:KnowledgeNode) REQUIRE (n.graph_id, n.id) IS UNIQUE",
    "CREATE CONSTRAINT project_id IF NOT EXISTS FOR (p:Project) REQUIRE p.id IS UNIQUE",
    "CREATE CONSTRAINT status_event_id IF NOT EXISTS FOR (e:StatusEvent) REQUIRE e.id IS UNIQUE",
    "CREATE INDEX knowledge_node_type IF NOT EXISTS FOR (n:KnowledgeNode) ON (n.graph_id, n.node_type)",
    "CREATE INDEX knowledge_node_status IF NOT EXISTS FOR (n:KnowledgeNode) ON (n.graph_id, n.status)",
    "CREATE INDEX knowledge_node_created IF NOT EXISTS FOR (n:KnowledgeNode) ON (n.graph_id, n.created_at)",
    "CREATE INDEX status_event_entity IF NOT EXISTS FOR (e:StatusEvent) ON (e.graph_id, e.entity_type, e.entity_id)",
];

fn vector_index_statement(dimension: usize) -> String {
    format!(
        "CREATE VECTOR INDEX {} IF NOT EXISTS
         FOR (n:KnowledgeNode) ON (n.embedding)
         OPTIONS {{indexConfig: {{
             `vector.dimensions`: {},
             `vector.similarity_function`: 'cosine'
         }}}}",
        VECTOR_INDEX, dimension
    )
}

/// Initialize Neo4j schema with constraints and indexes.
///
/// Safe to run multiple times - uses IF NOT EXISTS clauses. The vector index
/// needs Neo4j 5.13+; it is skipped with a warning on older servers.
pub async fn initialize_schema(client: &GraphClient, dimension: usize) -> Result<()> {
    info!("Initializing Neo4j schema...");

    for statement in SCHEMA_STATEMENTS {
        client.execute(Query::new(statement.to_string())).await?;
    }

    if let Err(e) = client.execute(Query::new(vector_index_statement(dimension))).await {
        warn!(error = %e, "Vector index creation skipped (Neo4j may not support vector indexes)");
    }

    info!(
        statements = SCHEMA_STATEMENTS.len() + 1,
        dimension, "Neo4j schema initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_index_uses_configured_dimension() {
        let stmt = vector_index_statement(384);
        assert!(stmt.contains("`vector.dimensions`: 384"));
        assert!(stmt.contains("'cosine'"));
        assert!(stmt.contains(VECTOR_INDEX));
    }
}
