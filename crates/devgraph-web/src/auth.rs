//! Bearer token authentication.

use std::collections::{HashMap, HashSet};

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use devgraph_core::config::{AuthConfig, ALL_GRAPHS};
use devgraph_core::DevgraphError;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: String,
    graphs: HashSet<String>,
}

impl Principal {
    pub fn new(user: impl Into<String>, graphs: impl IntoIterator<Item = String>) -> Self {
        Self {
            user: user.into(),
            graphs: graphs.into_iter().collect(),
        }
    }

    pub fn can_access(&self, graph_id: &str) -> bool {
        self.graphs.contains(ALL_GRAPHS) || self.graphs.contains(graph_id)
    }

    /// Fail with `Forbidden` unless the token is scoped to `graph_id`.
    pub fn ensure_graph(&self, graph_id: &str) -> Result<(), DevgraphError> {
        if !self.can_access(graph_id) {
            return Err(DevgraphError::Forbidden(format!(
                "Token for '{}' is not scoped to graph '{}'",
                self.user, graph_id
            )));
        }
        Ok(())
    }
}

/// Tokens accepted by the server, keyed by token value.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    tokens: HashMap<String, Principal>,
}

impl TokenRegistry {
    pub fn from_config(config: &AuthConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|t| {
                (
                    t.token.clone(),
                    Principal::new(t.user.clone(), t.graphs.iter().cloned()),
                )
            })
            .collect();
        Self { tokens }
    }

    pub fn resolve(&self, token: &str) -> Option<&Principal> {
        self.tokens.get(token)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| DevgraphError::Unauthorized("Missing bearer token".to_string()))?;

        let principal = state
            .tokens
            .resolve(token)
            .cloned()
            .ok_or_else(|| DevgraphError::Unauthorized("Unknown token".to_string()))?;
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devgraph_core::config::TokenConfig;

    #[test]
    fn test_scopes() {
        let config = AuthConfig {
            tokens: vec![
                TokenConfig {
                    token: "t1".into(),
                    user: "alice".into(),
                    graphs: vec!["g1".into()],
                },
                TokenConfig {
                    token: "admin".into(),
                    user: "root".into(),
                    graphs: vec![ALL_GRAPHS.into()],
                },
            ],
        };
        let registry = TokenRegistry::from_config(&config);

        let alice = registry.resolve("t1").unwrap();
        assert!(alice.can_access("g1"));
        assert!(!alice.can_access("g2"));
        assert_eq!(alice.ensure_graph("g2").unwrap_err().code(), "FORBIDDEN");

        assert!(registry.resolve("admin").unwrap().can_access("anything"));
        assert!(registry.resolve("nope").is_none());
    }
}
