//! Project access policy and membership rules.
//!
//! These are pure functions over a [`Project`]; loading and persisting
//! projects is the graph layer's job.

pub mod model;

use chrono::Utc;

use crate::error::{DevgraphError, DevgraphResult};
use model::{Project, Visibility};

/// Read access: anyone for public projects, members for private ones.
pub fn can_read(project: &Project, user: Option<&str>) -> bool {
    match project.visibility {
        Visibility::Public => true,
        Visibility::Private => user.is_some_and(|u| project.is_member(u)),
    }
}

/// Write access: members only, whatever the visibility.
pub fn can_write(project: &Project, user: Option<&str>) -> bool {
    user.is_some_and(|u| project.is_member(u))
}

/// Fail when the project has no owner left.
pub fn check_owner_invariant(project: &Project) -> DevgraphResult<()> {
    if project.owners.is_empty() {
        return Err(DevgraphError::OwnerInvariant(project.id.clone()));
    }
    Ok(())
}

fn require_owner(project: &Project, actor: &str) -> DevgraphResult<()> {
    if !project.is_owner(actor) {
        return Err(DevgraphError::Forbidden(format!(
            "'{}' is not an owner of project '{}'",
            actor, project.id
        )));
    }
    Ok(())
}

pub fn add_member(project: &mut Project, actor: &str, user: &str) -> DevgraphResult<()> {
    require_owner(project, actor)?;
    if !project.is_owner(user) {
        project.members.insert(user.to_string());
    }
    project.updated_at = Utc::now();
    Ok(())
}

pub fn add_owner(project: &mut Project, actor: &str, user: &str) -> DevgraphResult<()> {
    require_owner(project, actor)?;
    project.members.remove(user);
    project.owners.insert(user.to_string());
    project.updated_at = Utc::now();
    Ok(())
}

/// Remove ownership, keeping the user as a plain member.
///
/// Fails with `OwnerInvariant` when `user` is the last owner; the project is
/// left untouched in that case.
pub fn remove_owner(project: &mut Project, actor: &str, user: &str) -> DevgraphResult<()> {
    require_owner(project, actor)?;
    if !project.is_owner(user) {
        return Err(DevgraphError::not_found("Owner", user));
    }
    if project.owners.len() == 1 {
        return Err(DevgraphError::OwnerInvariant(project.id.clone()));
    }
    project.owners.remove(user);
    project.members.insert(user.to_string());
    project.updated_at = Utc::now();
    Ok(())
}

/// Remove a user entirely (membership and ownership).
///
/// Members may remove themselves; removing anyone else requires an owner.
pub fn remove_member(project: &mut Project, actor: &str, user: &str) -> DevgraphResult<()> {
    if actor != user {
        require_owner(project, actor)?;
    }
    if !project.is_member(user) {
        return Err(DevgraphError::not_found("Member", user));
    }
    if project.is_owner(user) && project.owners.len() == 1 {
        return Err(DevgraphError::OwnerInvariant(project.id.clone()));
    }
    project.owners.remove(user);
    project.members.remove(user);
    project.updated_at = Utc::now();
    Ok(())
}

/// Mirror the linked repository's visibility onto the project.
///
/// Only a private repository has an effect (it forces the project private);
/// the project's visibility never flows back to the repository and a public
/// repository never makes a private project public. Returns whether the
/// project changed.
pub fn apply_repository_visibility(project: &mut Project, repo: Visibility) -> bool {
    if repo == Visibility::Private && project.visibility != Visibility::Private {
        project.visibility = Visibility::Private;
        project.updated_at = Utc::now();
        return true;
    }
    false
}
