//! CLI command definitions and handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use devgraph_core::DevgraphConfig;

pub mod embed;
pub mod schema;
pub mod search;
pub mod serve;
pub mod status;
pub mod sync;

/// devgraph - Cloud knowledge graph for development projects
#[derive(Parser)]
#[command(name = "devgraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to project directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Graph (tenant) to operate on
    #[arg(short, long, global = true, env = "DEVGRAPH_GRAPH_ID")]
    pub graph: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the query API server
    Serve(serve::ServeArgs),

    /// Database schema commands
    #[command(subcommand)]
    Schema(schema::SchemaCommands),

    /// Reconcile local markdown files with the cloud graph
    #[command(subcommand)]
    Sync(sync::SyncCommands),

    /// Show graph and embedding status
    Status,

    /// Semantic search over embedded nodes
    Search(search::SearchArgs),

    /// Embed nodes that lack a vector for the current model
    Embed(embed::EmbedArgs),
}

impl Cli {
    pub fn project_dir(&self) -> Result<PathBuf> {
        match &self.project {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("Cannot determine the current directory"),
        }
    }

    pub async fn execute(self, project_dir: &Path) -> Result<()> {
        let config = DevgraphConfig::load(project_dir)?;
        let graph = self.graph;

        match self.command {
            Commands::Serve(args) => serve::execute(args, &config).await,
            Commands::Schema(cmd) => schema::execute(cmd, &config).await,
            Commands::Sync(cmd) => sync::execute(cmd, project_dir, &config, require_graph(graph)?).await,
            Commands::Status => status::execute(&config, graph.as_deref()).await,
            Commands::Search(args) => search::execute(args, &config, require_graph(graph)?).await,
            Commands::Embed(args) => embed::execute(args, &config, require_graph(graph)?).await,
        }
    }
}

fn require_graph(graph: Option<String>) -> Result<String> {
    graph.context("No graph selected. Pass --graph <ID> or set DEVGRAPH_GRAPH_ID")
}
