//! Project administration route handlers.
//!
//! A project id is the `graphId` of the graph it governs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use devgraph_core::{DevgraphError, Project, Visibility};

use crate::auth::Principal;
use crate::error::{ApiJson, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub id: String,
    pub github_repo_url: Option<String>,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
}

fn default_visibility() -> Visibility {
    Visibility::Private
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Owner,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub visibility: Visibility,
}

pub async fn create_project(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(req): ApiJson<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    principal.ensure_graph(&req.id)?;
    let project = state
        .gateway
        .create_project(&principal.user, &req.id, req.github_repo_url, req.visibility)
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    principal.ensure_graph(&id)?;
    let project = state.gateway.get_project(&id).await?;
    if !devgraph_core::project::can_read(&project, Some(&principal.user)) {
        return Err(DevgraphError::Forbidden(format!(
            "'{}' may not read project '{}'",
            principal.user, id
        ))
        .into());
    }
    Ok(Json(project))
}

pub async fn add_member(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> ApiResult<Json<Project>> {
    principal.ensure_graph(&id)?;
    let project = match req.role {
        Role::Member => state.gateway.add_member(&principal.user, &id, &req.user).await?,
        Role::Owner => state.gateway.add_owner(&principal.user, &id, &req.user).await?,
    };
    Ok(Json(project))
}

pub async fn remove_member(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, user)): Path<(String, String)>,
) -> ApiResult<Json<Project>> {
    principal.ensure_graph(&id)?;
    Ok(Json(
        state.gateway.remove_member(&principal.user, &id, &user).await?,
    ))
}

pub async fn remove_owner(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, user)): Path<(String, String)>,
) -> ApiResult<Json<Project>> {
    principal.ensure_graph(&id)?;
    Ok(Json(
        state.gateway.remove_owner(&principal.user, &id, &user).await?,
    ))
}

pub async fn sync_repository_visibility(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<VisibilityRequest>,
) -> ApiResult<Json<Project>> {
    principal.ensure_graph(&id)?;
    let project = state
        .gateway
        .sync_repository_visibility(&principal.user, &id, req.visibility)
        .await?;
    Ok(Json(project))
}
