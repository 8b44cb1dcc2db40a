//! Sync commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use devgraph_core::DevgraphConfig;
use devgraph_graph::{MarkdownDirSource, SyncEngine};

use crate::{output, runtime};

#[derive(Args, Clone)]
pub struct SyncArgs {
    /// Directory holding node markdown files, relative to the project
    #[arg(long, default_value = ".devgraph/nodes")]
    pub dir: PathBuf,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List nodes that differ between local files and the cloud
    Status(SyncArgs),
    /// Upload locally changed nodes
    Push(SyncArgs),
    /// Download nodes changed in the cloud
    Pull(SyncArgs),
}

pub async fn execute(
    cmd: SyncCommands,
    project_dir: &Path,
    config: &DevgraphConfig,
    graph_id: String,
) -> Result<()> {
    let engine = SyncEngine::new(runtime::store(config).await?);
    let source = |args: &SyncArgs| MarkdownDirSource::new(project_dir.join(&args.dir));

    match cmd {
        SyncCommands::Status(args) => {
            let report = engine.status(&graph_id, &source(&args)).await?;
            output::print_unsynced(&report);
        }
        SyncCommands::Push(args) => {
            println!("{} {}", "Pushing to".bold(), graph_id.cyan());
            let report = engine.push(&graph_id, &source(&args)).await?;
            output::print_sync_report(&report);
        }
        SyncCommands::Pull(args) => {
            println!("{} {}", "Pulling from".bold(), graph_id.cyan());
            let report = engine.pull(&graph_id, &source(&args)).await?;
            output::print_sync_report(&report);
        }
    }
    Ok(())
}
