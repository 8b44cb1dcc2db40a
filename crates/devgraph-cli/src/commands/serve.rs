//! Query API server command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use devgraph_core::DevgraphConfig;
use devgraph_graph::{GraphBackend, MemoryBackend};
use devgraph_web::AppState;

use crate::runtime;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on (defaults to the configured port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Host to bind to (defaults to the configured host)
    #[arg(long)]
    pub host: Option<String>,

    /// Keep the graph in memory instead of connecting to Neo4j
    #[arg(long)]
    pub memory: bool,

    /// Also write logs to a file
    #[arg(long)]
    pub log: bool,

    /// Log file path (defaults to .devgraph/serve.log)
    #[arg(long, requires = "log")]
    pub log_file: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs, config: &DevgraphConfig) -> Result<()> {
    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    let backend: Arc<dyn GraphBackend> = if args.memory {
        Arc::new(MemoryBackend::new())
    } else {
        Arc::new(runtime::neo4j(config).await?)
    };
    let state = AppState::new(backend, runtime::embeddings(config), config);

    println!();
    println!("  {} {}", "devgraph".cyan().bold(), "Query API".bold());
    println!();
    println!("  {}      http://{}:{}/api", "API".green(), host, port);
    println!("  {}   http://{}:{}/api/status", "Health".green(), host, port);
    if args.memory {
        println!("  {}  {}", "Storage".yellow(), "in-memory (data is lost on exit)".dimmed());
    }
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();

    devgraph_web::run_server(state, &host, port).await?;

    Ok(())
}
