//! Schema commands.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use devgraph_core::DevgraphConfig;

use crate::runtime;

#[derive(Subcommand)]
pub enum SchemaCommands {
    /// Create constraints, indexes and the vector index
    Init,
}

pub async fn execute(cmd: SchemaCommands, config: &DevgraphConfig) -> Result<()> {
    match cmd {
        SchemaCommands::Init => cmd_init(config).await,
    }
}

async fn cmd_init(config: &DevgraphConfig) -> Result<()> {
    println!("{}", "Initializing graph schema...".bold());
    let backend = runtime::neo4j(config).await?;
    devgraph_graph::initialize_schema(backend.client(), config.embedding.dimension).await?;

    println!("{} Schema ready", "✓".green());
    println!(
        "  Vector index: {} dimensions, cosine",
        config.embedding.dimension.to_string().cyan()
    );
    Ok(())
}
