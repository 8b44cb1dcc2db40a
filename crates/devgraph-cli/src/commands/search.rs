//! Semantic search command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use devgraph_core::DevgraphConfig;
use devgraph_graph::{SearchOptions, SemanticSearchEngine};

use crate::{output, runtime};

#[derive(Args)]
pub struct SearchArgs {
    /// Natural-language query
    pub query: String,

    /// Maximum number of results
    #[arg(long, default_value = "10")]
    pub limit: i64,

    /// Minimum cosine similarity in [0, 1]
    #[arg(long, default_value = "0.7")]
    pub threshold: f32,

    /// Restrict to node types (repeatable)
    #[arg(long = "type")]
    pub types: Vec<String>,
}

pub async fn execute(args: SearchArgs, config: &DevgraphConfig, graph_id: String) -> Result<()> {
    let store = runtime::store(config).await?;
    let engine = SemanticSearchEngine::new(store.backend().clone(), store.embeddings().clone());

    let options = SearchOptions {
        threshold: Some(args.threshold),
        limit: Some(args.limit),
        types: args.types,
    };
    let results = engine.search(&graph_id, &args.query, options).await?;

    println!("{} {}", "Results for".bold(), format!("\"{}\"", args.query).cyan());
    println!("{}", "─".repeat(60));
    output::print_ranked(&results);
    Ok(())
}
