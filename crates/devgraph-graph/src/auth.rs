//! Project-level access control.
//!
//! Projects are persisted through the graph backend; the access rules
//! themselves live in `devgraph_core::project`.

use std::sync::Arc;

use tracing::info;

use devgraph_core::node::validate_graph_id;
use devgraph_core::project;
use devgraph_core::{DevgraphError, DevgraphResult, Project, Visibility};

use crate::backend::GraphBackend;

/// Kind of access a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

pub struct AuthorizationGateway {
    backend: Arc<dyn GraphBackend>,
}

impl AuthorizationGateway {
    pub fn new(backend: Arc<dyn GraphBackend>) -> Self {
        Self { backend }
    }

    pub async fn get_project(&self, project_id: &str) -> DevgraphResult<Project> {
        self.backend
            .get_project(project_id)
            .await?
            .ok_or_else(|| DevgraphError::not_found("Project", project_id))
    }

    pub async fn can_read(&self, user: Option<&str>, project_id: &str) -> DevgraphResult<bool> {
        Ok(project::can_read(&self.get_project(project_id).await?, user))
    }

    pub async fn can_write(&self, user: Option<&str>, project_id: &str) -> DevgraphResult<bool> {
        Ok(project::can_write(&self.get_project(project_id).await?, user))
    }

    /// Check access to a graph. A graph governed by a project follows the
    /// project's rules; a graph without one is left to token scoping.
    pub async fn authorize_graph(
        &self,
        user: Option<&str>,
        graph_id: &str,
        access: Access,
    ) -> DevgraphResult<()> {
        let Some(project) = self.backend.get_project(graph_id).await? else {
            return Ok(());
        };
        let allowed = match access {
            Access::Read => project::can_read(&project, user),
            Access::Write => project::can_write(&project, user),
        };
        if !allowed {
            return Err(DevgraphError::Forbidden(format!(
                "'{}' may not {} project '{}'",
                user.unwrap_or("anonymous"),
                match access {
                    Access::Read => "read",
                    Access::Write => "write to",
                },
                graph_id
            )));
        }
        Ok(())
    }

    pub async fn assert_owner_invariant(&self, project_id: &str) -> DevgraphResult<()> {
        project::check_owner_invariant(&self.get_project(project_id).await?)
    }

    pub async fn create_project(
        &self,
        actor: &str,
        project_id: &str,
        github_repo_url: Option<String>,
        visibility: Visibility,
    ) -> DevgraphResult<Project> {
        validate_graph_id(project_id)?;
        if actor.trim().is_empty() {
            return Err(DevgraphError::Unauthorized("Creating a project requires a user".into()));
        }
        if self.backend.get_project(project_id).await?.is_some() {
            return Err(DevgraphError::validation(format!(
                "Project '{}' already exists",
                project_id
            )));
        }

        let project = Project::new(project_id, github_repo_url, visibility, actor);
        self.backend.save_project(&project).await?;
        info!(project_id, owner = actor, visibility = visibility.as_str(), "Project created");
        Ok(project)
    }

    /// Load, mutate and persist a project. Nothing is written when `change`
    /// fails.
    async fn modify<F>(&self, project_id: &str, change: F) -> DevgraphResult<Project>
    where
        F: FnOnce(&mut Project) -> DevgraphResult<()>,
    {
        let mut project = self.get_project(project_id).await?;
        change(&mut project)?;
        project::check_owner_invariant(&project)?;
        self.backend.save_project(&project).await?;
        Ok(project)
    }

    pub async fn add_member(&self, actor: &str, project_id: &str, user: &str) -> DevgraphResult<Project> {
        let project = self
            .modify(project_id, |p| project::add_member(p, actor, user))
            .await?;
        info!(project_id, actor, user, "Member added");
        Ok(project)
    }

    pub async fn add_owner(&self, actor: &str, project_id: &str, user: &str) -> DevgraphResult<Project> {
        let project = self
            .modify(project_id, |p| project::add_owner(p, actor, user))
            .await?;
        info!(project_id, actor, user, "Owner added");
        Ok(project)
    }

    pub async fn remove_member(&self, actor: &str, project_id: &str, user: &str) -> DevgraphResult<Project> {
        let project = self
            .modify(project_id, |p| project::remove_member(p, actor, user))
            .await?;
        info!(project_id, actor, user, "Member removed");
        Ok(project)
    }

    pub async fn remove_owner(&self, actor: &str, project_id: &str, user: &str) -> DevgraphResult<Project> {
        let project = self
            .modify(project_id, |p| project::remove_owner(p, actor, user))
            .await?;
        info!(project_id, actor, user, "Owner removed");
        Ok(project)
    }

    /// Mirror the linked repository's visibility. Only owners may trigger it.
    pub async fn sync_repository_visibility(
        &self,
        actor: &str,
        project_id: &str,
        repository: Visibility,
    ) -> DevgraphResult<Project> {
        let mut project = self.get_project(project_id).await?;
        if !project.is_owner(actor) {
            return Err(DevgraphError::Forbidden(format!(
                "'{}' is not an owner of project '{}'",
                actor, project_id
            )));
        }
        if project::apply_repository_visibility(&mut project, repository) {
            self.backend.save_project(&project).await?;
            info!(project_id, "Project made private to match its repository");
        }
        Ok(project)
    }
}
