//! Terminal output formatting.

use colored::{ColoredString, Colorize};

use devgraph_core::SyncState;
use devgraph_graph::{RankedResult, SkippedEntry, SyncReport, UnsyncedReport};

fn state_colored(state: SyncState) -> ColoredString {
    match state {
        SyncState::Synced => state.as_str().green(),
        SyncState::LocalOnly => state.as_str().cyan(),
        SyncState::CloudOnly => state.as_str().blue(),
        SyncState::Conflict => state.as_str().red().bold(),
    }
}

/// Truncate to `max` characters, marking the cut.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn print_skipped(skipped: &[SkippedEntry]) {
    if skipped.is_empty() {
        return;
    }
    println!("\n{} ({}):", "Skipped".yellow().bold(), skipped.len());
    for entry in skipped {
        println!("  {} {} {}", "!".yellow(), entry.id, entry.reason.dimmed());
    }
}

pub fn print_unsynced(report: &UnsyncedReport) {
    if report.nodes.is_empty() {
        println!("{}", "Everything is in sync.".green());
    } else {
        println!("{:<40} {:<10} {:<12}", "ID", "Type", "State");
        println!("{}", "─".repeat(64));
        for entry in &report.nodes {
            println!(
                "{:<40} {:<10} {:<12}",
                truncate(&entry.id, 38),
                entry.node_type.label(),
                state_colored(entry.state)
            );
        }
        println!(
            "\n{} to push, {} to pull, {} in conflict",
            report.count(SyncState::LocalOnly).to_string().cyan(),
            report.count(SyncState::CloudOnly).to_string().blue(),
            report.count(SyncState::Conflict).to_string().red()
        );
    }
    print_skipped(&report.skipped);
}

pub fn print_sync_report(report: &SyncReport) {
    for id in &report.pushed {
        println!("  {} {}", "↑".cyan(), id);
    }
    for id in &report.pulled {
        println!("  {} {}", "↓".blue(), id);
    }
    for id in &report.conflicts {
        println!("  {} {} {}", "✗".red(), id, "(conflict, resolve manually)".dimmed());
    }
    println!(
        "\n{} pushed, {} pulled, {} conflicts",
        report.pushed.len().to_string().bold(),
        report.pulled.len().to_string().bold(),
        report.conflicts.len().to_string().bold()
    );
    print_skipped(&report.skipped);
}

pub fn print_ranked(results: &[RankedResult]) {
    if results.is_empty() {
        println!("{}", "No results above the threshold.".dimmed());
        return;
    }
    for result in results {
        let title = result.node.title().unwrap_or("(untitled)");
        println!(
            "  {} [{}] {} {}",
            format!("{:.3}", result.similarity).green(),
            result.node.node_type.label().dimmed(),
            truncate(title, 50),
            result.node.id.dimmed()
        );
    }
}
