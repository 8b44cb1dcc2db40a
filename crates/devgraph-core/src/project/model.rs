//! Project domain models.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DevgraphError;

/// Project visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = DevgraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            _ => Err(DevgraphError::validation(format!(
                "Invalid visibility '{}'. Valid values: public, private",
                s
            ))),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project: the authorization scope of one graph.
///
/// The project id is the `graphId` of the graph it guards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub github_repo_url: Option<String>,
    pub visibility: Visibility,
    pub owners: BTreeSet<String>,
    #[serde(default)]
    pub members: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a project owned by its creator.
    pub fn new(
        id: impl Into<String>,
        github_repo_url: Option<String>,
        visibility: Visibility,
        creator: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            github_repo_url,
            visibility,
            owners: BTreeSet::from([creator.to_string()]),
            members: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owner(&self, user: &str) -> bool {
        self.owners.contains(user)
    }

    /// Owners count as members.
    pub fn is_member(&self, user: &str) -> bool {
        self.is_owner(user) || self.members.contains(user)
    }
}
