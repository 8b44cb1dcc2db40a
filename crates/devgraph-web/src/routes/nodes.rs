//! Node, relationship and traversal route handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use devgraph_core::pagination::coerce_integer;
use devgraph_core::{
    NewNode, NewRelationship, Node, NodePatch, Pagination, Properties, Relationship, StatusEvent,
    Transition,
};
use devgraph_graph::{Access, BatchReport, Ingested, UnsyncedReport, Updated};

use crate::auth::Principal;
use crate::error::{ApiJson, ApiQuery, ApiResult};
use crate::routes::{authorize_graph, GraphParams};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub graph_id: Option<String>,
    /// Comma-separated node types.
    pub labels: Option<String>,
    pub offset: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NodeList {
    pub nodes: Vec<Node>,
    pub total: usize,
    pub offset: i64,
    pub limit: i64,
}

pub async fn list_nodes(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Json<NodeList>> {
    let graph_id = authorize_graph(&state, &principal, params.graph_id, Access::Read).await?;
    let page = Pagination::from_params(params.offset.as_deref(), params.limit.as_deref())?;
    let labels: Vec<String> = params
        .labels
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    let page = state.store.list_nodes(&graph_id, &labels, page).await?;
    Ok(Json(NodeList {
        nodes: page.items,
        total: page.total,
        offset: page.offset,
        limit: page.limit,
    }))
}

pub async fn get_node(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    ApiQuery(params): ApiQuery<GraphParams>,
) -> ApiResult<Json<Node>> {
    let graph_id = authorize_graph(&state, &principal, params.graph_id, Access::Read).await?;
    Ok(Json(state.store.get_node(&graph_id, &id).await?))
}

pub async fn create_node(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(params): ApiQuery<GraphParams>,
    ApiJson(mut new): ApiJson<NewNode>,
) -> ApiResult<(StatusCode, Json<Ingested>)> {
    let graph_id = authorize_graph(&state, &principal, params.graph_id, Access::Write).await?;
    new.edited_by = Some(principal.user);
    let ingested = state.store.ingest(&graph_id, new).await?;
    Ok((StatusCode::CREATED, Json(ingested)))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub nodes: Vec<NewNode>,
}

pub async fn create_nodes_batch(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(params): ApiQuery<GraphParams>,
    ApiJson(req): ApiJson<BatchRequest>,
) -> ApiResult<Json<BatchReport>> {
    let graph_id = authorize_graph(&state, &principal, params.graph_id, Access::Write).await?;
    let nodes = req
        .nodes
        .into_iter()
        .map(|mut n| {
            n.edited_by = Some(principal.user.clone());
            n
        })
        .collect();
    Ok(Json(state.store.ingest_batch(&graph_id, nodes).await?))
}

#[derive(Debug, Deserialize)]
pub struct PatchRequest {
    pub properties: Properties,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchResponse {
    #[serde(flatten)]
    pub updated: Updated,
    pub status_event: Option<StatusEvent>,
}

/// Merge properties into a node. A changed `status` is recorded in the
/// status event log.
pub async fn update_node(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    ApiQuery(params): ApiQuery<GraphParams>,
    ApiJson(req): ApiJson<PatchRequest>,
) -> ApiResult<Json<PatchResponse>> {
    let graph_id = authorize_graph(&state, &principal, params.graph_id, Access::Write).await?;
    let patch = NodePatch {
        properties: req.properties,
        edited_by: Some(principal.user.clone()),
    };
    let updated = state.store.update_node(&graph_id, &id, patch).await?;

    let mut status_event = None;
    if let Some(new_status) = updated.node.status() {
        let transition = Transition {
            entity_type: updated.node.node_type.label().to_string(),
            entity_id: updated.node.id.clone(),
            old_status: updated.previous_status.clone().unwrap_or_default(),
            new_status: new_status.to_string(),
            changed_by: principal.user.clone(),
            reason: req.reason,
        };
        // The update itself has already been applied.
        match state.events.record_transition(&graph_id, transition).await {
            Ok(event) => status_event = event,
            Err(e) => error!(graph_id = %graph_id, node_id = %id, error = %e, "Failed to record status transition"),
        }
    }

    Ok(Json(PatchResponse {
        updated,
        status_event,
    }))
}

pub async fn delete_node(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    ApiQuery(params): ApiQuery<GraphParams>,
) -> ApiResult<StatusCode> {
    let graph_id = authorize_graph(&state, &principal, params.graph_id, Access::Write).await?;
    state.store.delete_node(&graph_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_unsynced(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(params): ApiQuery<GraphParams>,
) -> ApiResult<Json<UnsyncedReport>> {
    let graph_id = authorize_graph(&state, &principal, params.graph_id, Access::Read).await?;
    Ok(Json(state.sync.list_unsynced(&graph_id).await?))
}

pub async fn create_relationship(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(params): ApiQuery<GraphParams>,
    ApiJson(new): ApiJson<NewRelationship>,
) -> ApiResult<(StatusCode, Json<Relationship>)> {
    let graph_id = authorize_graph(&state, &principal, params.graph_id, Access::Write).await?;
    let relationship = state.store.create_relationship(&graph_id, new).await?;
    info!(
        graph_id = %graph_id,
        source = %relationship.source_id,
        target = %relationship.target_id,
        "Relationship created"
    );
    Ok((StatusCode::CREATED, Json(relationship)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjacencyParams {
    pub graph_id: Option<String>,
    pub depth: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Adjacencies {
    pub id: String,
    pub depth: i64,
    pub nodes: Vec<Node>,
}

pub async fn get_adjacencies(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    ApiQuery(params): ApiQuery<AdjacencyParams>,
) -> ApiResult<Json<Adjacencies>> {
    let graph_id = authorize_graph(&state, &principal, params.graph_id, Access::Read).await?;
    let depth = params
        .depth
        .as_deref()
        .map(|d| coerce_integer("depth", d))
        .transpose()?;
    let nodes = state.store.get_adjacencies(&graph_id, &id, depth).await?;
    Ok(Json(Adjacencies {
        id,
        depth: depth.unwrap_or(1),
        nodes,
    }))
}

pub async fn active_sprint(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(params): ApiQuery<GraphParams>,
) -> ApiResult<Json<Node>> {
    let graph_id = authorize_graph(&state, &principal, params.graph_id, Access::Read).await?;
    Ok(Json(state.store.find_active_sprint(&graph_id).await?))
}
