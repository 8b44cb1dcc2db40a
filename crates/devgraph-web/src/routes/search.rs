//! Semantic query route handler.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use devgraph_core::IntegerParam;
use devgraph_graph::{Access, RankedResult, SearchOptions};

use crate::auth::Principal;
use crate::error::{ApiJson, ApiResult};
use crate::routes::authorize_graph;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub graph_id: Option<String>,
    pub query: String,
    pub limit: Option<IntegerParam>,
    pub threshold: Option<f32>,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results: Vec<RankedResult>,
}

pub async fn query(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(req): ApiJson<QueryRequest>,
) -> ApiResult<Json<QueryResponse>> {
    let graph_id = authorize_graph(&state, &principal, req.graph_id, Access::Read).await?;
    let options = SearchOptions {
        threshold: req.threshold,
        limit: req.limit.map(|l| l.0),
        types: req.types,
    };
    let results = state.search.search(&graph_id, &req.query, options).await?;
    Ok(Json(QueryResponse { results }))
}
