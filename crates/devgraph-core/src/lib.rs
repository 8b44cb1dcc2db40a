//! devgraph Core Library
//!
//! Domain models, error taxonomy and policy rules for the devgraph
//! knowledge graph.

pub mod config;
pub mod error;
pub mod event;
pub mod node;
pub mod pagination;
pub mod project;
pub mod retry;
pub mod sync;

pub use config::DevgraphConfig;
pub use error::{DevgraphError, DevgraphResult, ErrorKind};
pub use event::model::{StatusEvent, Transition};
pub use node::model::{
    GraphCounts, NewNode, NewRelationship, Node, NodePatch, NodeType, Properties, Relationship,
    RelationshipType,
};
pub use pagination::{IntegerParam, Page, Pagination};
pub use project::model::{Project, Visibility};
pub use retry::RetryPolicy;
pub use sync::{SideSnapshot, SyncState};
