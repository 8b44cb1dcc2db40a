//! Status command.

use anyhow::Result;
use colored::Colorize;

use devgraph_core::DevgraphConfig;

use crate::runtime;

pub async fn execute(config: &DevgraphConfig, graph_id: Option<&str>) -> Result<()> {
    println!("{}", "Knowledge Graph Status".bold());
    println!("{}", "─".repeat(40));

    let store = runtime::store(config).await?;
    println!("  Neo4j:         {}", config.graph.uri.green());

    let counts = store.counts(graph_id).await?;
    let scope = graph_id.unwrap_or("all graphs");
    println!("  Scope:         {}", scope.cyan());
    println!("  Nodes:         {}", counts.nodes.to_string().cyan());
    println!("  Relationships: {}", counts.relationships.to_string().cyan());

    let embeddings = store.embeddings();
    if embeddings.is_configured() {
        match embeddings.initialize().await {
            Ok(_) => println!(
                "  Embeddings:    {} ({})",
                "ready".green(),
                embeddings.model_version()
            ),
            Err(e) => println!("  Embeddings:    {} {}", "unavailable".red(), e.to_string().dimmed()),
        }
    } else {
        println!("  Embeddings:    {}", "not configured".yellow());
    }

    println!("{}", "─".repeat(40));
    Ok(())
}
