//! # devgraph graph
//!
//! Tenant-scoped knowledge graph over Neo4j: node storage and traversal,
//! status event history, semantic search, project authorization and
//! reconciliation with git-tracked markdown files.

pub mod auth;
pub mod backend;
pub mod client;
pub mod events;
pub mod schema;
pub mod semantic;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

pub use auth::{Access, AuthorizationGateway};
pub use backend::{GraphBackend, MemoryBackend, Neo4jBackend, ScoredNode};
pub use client::GraphClient;
pub use events::StatusEventLog;
pub use schema::initialize_schema;
pub use semantic::{RankedResult, SearchOptions, SemanticSearchEngine};
pub use store::{BatchItem, BatchReport, GraphStore, Ingested, ItemError, RefreshReport, Updated};
pub use sync::{
    LocalNodeSource, LocalSnapshot, MarkdownDirSource, SkippedEntry, SyncEngine, SyncReport,
    UnsyncedReport,
};
