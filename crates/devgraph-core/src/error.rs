//! Centralized error types for devgraph.
//!
//! Every failure maps onto a small, stable taxonomy ([`ErrorKind`]) that the
//! QueryAPI turns into an HTTP status and a machine-readable code.

use std::time::Duration;

use thiserror::Error;

/// Main error type for devgraph operations.
#[derive(Error, Debug)]
pub enum DevgraphError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing required parameter 'graphId'")]
    MissingGraphId,

    #[error("Invalid node type '{0}'")]
    InvalidNodeType(String),

    #[error("Invalid relationship type '{0}'")]
    InvalidRelationshipType(String),

    #[error("Malformed identifier '{0}'")]
    MalformedId(String),

    #[error("Project '{0}' must keep at least one owner")]
    OwnerInvariant(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A retryable infrastructure failure (connection reset, 5xx, 429).
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Operation '{operation}' timed out after {elapsed:?}")]
    Timeout { operation: String, elapsed: Duration },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for devgraph operations.
pub type DevgraphResult<T> = Result<T, DevgraphError>;

/// The error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    ServiceUnavailable,
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::ServiceUnavailable => 503,
            Self::Internal => 500,
        }
    }
}

impl DevgraphError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-found error for an entity kind and id.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create a service-unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Create a retryable infrastructure error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error into the public taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_)
            | Self::MissingGraphId
            | Self::InvalidNodeType(_)
            | Self::InvalidRelationshipType(_)
            | Self::MalformedId(_)
            | Self::OwnerInvariant(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::ServiceUnavailable(_) | Self::Transient(_) | Self::Timeout { .. } => {
                ErrorKind::ServiceUnavailable
            }
            Self::Internal(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingGraphId => "MISSING_GRAPH_ID",
            _ => match self.kind() {
                ErrorKind::Validation => "VALIDATION",
                ErrorKind::Unauthorized => "UNAUTHORIZED",
                ErrorKind::Forbidden => "FORBIDDEN",
                ErrorKind::NotFound => "NOT_FOUND",
                ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
                ErrorKind::Internal => "INTERNAL",
            },
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout { .. })
    }

    /// Message safe to show to a caller. Internal details stay server-side.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "An internal error occurred".to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_graph_id_has_its_own_code() {
        let err = DevgraphError::MissingGraphId;
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.code(), "MISSING_GRAPH_ID");
        assert_eq!(err.kind().status_code(), 400);
    }

    #[test]
    fn test_owner_invariant_is_validation() {
        let err = DevgraphError::OwnerInvariant("g1".into());
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn test_transient_errors_surface_as_unavailable() {
        let err = DevgraphError::transient("connection reset");
        assert!(err.is_transient());
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
        assert_eq!(err.kind().status_code(), 503);
        assert!(!DevgraphError::unavailable("no model").is_transient());
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = DevgraphError::internal("/srv/app/secret.rs:42 panicked");
        assert_eq!(err.public_message(), "An internal error occurred");
        assert_eq!(err.kind().status_code(), 500);

        let not_found = DevgraphError::not_found("Node", "T1");
        assert_eq!(not_found.public_message(), "Node not found: T1");
    }
}
