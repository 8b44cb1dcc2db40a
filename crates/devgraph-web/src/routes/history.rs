//! Status history route handler.

use axum::{extract::State, Json};
use serde::Deserialize;

use devgraph_core::pagination::coerce_integer;
use devgraph_core::{DevgraphError, StatusEvent};
use devgraph_graph::Access;

use crate::auth::Principal;
use crate::error::{ApiQuery, ApiResult};
use crate::routes::authorize_graph;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub graph_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub limit: Option<String>,
}

fn required(name: &str, value: Option<String>) -> Result<String, DevgraphError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| DevgraphError::validation(format!("Parameter '{}' is required", name)))
}

/// Most recent transitions first. The limit is clamped, never rejected.
pub async fn get_history(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> ApiResult<Json<Vec<StatusEvent>>> {
    let graph_id = authorize_graph(&state, &principal, params.graph_id, Access::Read).await?;
    let entity_type = required("entityType", params.entity_type)?;
    let entity_id = required("entityId", params.entity_id)?;
    let limit = params
        .limit
        .as_deref()
        .map(|l| coerce_integer("limit", l))
        .transpose()?;

    let events = state
        .events
        .get_history(&graph_id, &entity_type, &entity_id, limit)
        .await?;
    Ok(Json(events))
}
