//! Health route handler.

use axum::{extract::State, Json};
use serde::Serialize;

use devgraph_core::GraphCounts;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct EmbeddingStatus {
    pub configured: bool,
    pub ready: bool,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub graph: GraphCounts,
    pub embeddings: EmbeddingStatus,
}

/// Unauthenticated. Fails with 503 when the graph store is unreachable.
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<Health>> {
    state.store.ping().await?;
    let graph = state.store.counts(None).await?;
    let embeddings = state.store.embeddings();

    Ok(Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        graph,
        embeddings: EmbeddingStatus {
            configured: embeddings.is_configured(),
            ready: embeddings.is_ready(),
            model: embeddings.model_version().to_string(),
        },
    }))
}
