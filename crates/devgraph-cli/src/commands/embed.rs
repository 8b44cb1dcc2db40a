//! Embedding maintenance command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use devgraph_core::DevgraphConfig;

use crate::runtime;

#[derive(Args)]
pub struct EmbedArgs {
    /// Maximum number of nodes to embed in this run
    #[arg(long, default_value = "500")]
    pub limit: usize,
}

pub async fn execute(args: EmbedArgs, config: &DevgraphConfig, graph_id: String) -> Result<()> {
    let store = runtime::store(config).await?;
    println!(
        "{} {} with {}",
        "Embedding".bold(),
        graph_id.cyan(),
        store.embeddings().model_version().yellow()
    );

    let report = store.refresh_embeddings(&graph_id, args.limit).await?;

    println!("\n{}", "Embedding complete:".green().bold());
    println!("  Embedded: {}", report.embedded.to_string().green());
    if report.failed > 0 {
        println!("  Failed:   {}", report.failed.to_string().red());
    }
    if report.skipped > 0 {
        println!("  Skipped:  {} {}", report.skipped, "(no text)".dimmed());
    }
    Ok(())
}
