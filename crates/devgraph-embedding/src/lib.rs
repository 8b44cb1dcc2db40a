//! # devgraph Embedding
//!
//! Text-to-vector encoding for devgraph nodes and search queries.
//!
//! The model is acquired lazily through an [`EmbedderFactory`] the first time
//! it is needed and shared by every caller in the process.

pub mod ollama;
pub mod service;

pub use ollama::{OllamaEmbedder, OllamaFactory};
pub use service::{Embedder, EmbedderFactory, EmbeddingsService};
