//! Route handlers.

pub mod health;
pub mod history;
pub mod nodes;
pub mod projects;
pub mod search;

use serde::Deserialize;

use devgraph_core::node::validate_graph_id;
use devgraph_core::DevgraphError;
use devgraph_graph::Access;

use crate::auth::Principal;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphParams {
    pub graph_id: Option<String>,
}

/// Resolve the request's `graphId` and check the caller may access it.
///
/// Order: missing id, token scope, then the project's own rules.
pub async fn authorize_graph(
    state: &AppState,
    principal: &Principal,
    graph_id: Option<String>,
    access: Access,
) -> ApiResult<String> {
    let graph_id = graph_id
        .filter(|g| !g.trim().is_empty())
        .ok_or(DevgraphError::MissingGraphId)?;
    validate_graph_id(&graph_id)?;
    principal.ensure_graph(&graph_id)?;
    state
        .gateway
        .authorize_graph(Some(&principal.user), &graph_id, access)
        .await?;
    Ok(graph_id)
}
