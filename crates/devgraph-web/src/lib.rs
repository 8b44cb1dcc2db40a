//! devgraph Query API
//!
//! Axum-based HTTP server over the knowledge graph.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Nodes
        .route("/nodes", get(routes::nodes::list_nodes).post(routes::nodes::create_node))
        .route("/nodes/batch", post(routes::nodes::create_nodes_batch))
        .route("/nodes/unsynced", get(routes::nodes::list_unsynced))
        .route(
            "/nodes/{id}",
            get(routes::nodes::get_node)
                .patch(routes::nodes::update_node)
                .delete(routes::nodes::delete_node),
        )
        .route("/relationships", post(routes::nodes::create_relationship))
        .route("/adjacencies/{id}", get(routes::nodes::get_adjacencies))
        .route("/sprint/active", get(routes::nodes::active_sprint))
        // Search and history
        .route("/query", post(routes::search::query))
        .route("/status/history", get(routes::history::get_history))
        .route("/status", get(routes::health::status))
        // Projects
        .route("/projects", post(routes::projects::create_project))
        .route("/projects/{id}", get(routes::projects::get_project))
        .route("/projects/{id}/members", post(routes::projects::add_member))
        .route("/projects/{id}/members/{user}", delete(routes::projects::remove_member))
        .route("/projects/{id}/owners/{user}", delete(routes::projects::remove_owner))
        .route(
            "/projects/{id}/repository-visibility",
            post(routes::projects::sync_repository_visibility),
        );

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the web server.
pub async fn run_server(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    if state.tokens.is_empty() {
        tracing::warn!("No API tokens configured; every authenticated route will answer 401");
    }
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("Query API listening on http://{}:{}", host, port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use devgraph_core::config::TokenConfig;
    use devgraph_core::{DevgraphConfig, DevgraphResult};
    use devgraph_embedding::{Embedder, EmbedderFactory, EmbeddingsService};
    use devgraph_graph::MemoryBackend;

    /// Two-axis embedder: "graph" and everything else.
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        async fn embed(&self, text: &str) -> DevgraphResult<Vec<f32>> {
            let hits = text.matches("graph").count() as f32;
            Ok(vec![hits + 0.01, 1.0])
        }
    }

    struct AxisFactory;

    #[async_trait]
    impl EmbedderFactory for AxisFactory {
        async fn load(&self) -> DevgraphResult<Arc<dyn Embedder>> {
            Ok(Arc::new(AxisEmbedder))
        }
    }

    fn config() -> DevgraphConfig {
        let mut config = DevgraphConfig::default();
        config.auth.tokens = vec![
            TokenConfig {
                token: "alice-token".into(),
                user: "alice".into(),
                graphs: vec!["g1".into(), "g2".into()],
            },
            TokenConfig {
                token: "bob-token".into(),
                user: "bob".into(),
                graphs: vec!["g1".into(), "g2".into()],
            },
        ];
        config
    }

    fn app_with(embeddings: EmbeddingsService) -> Router {
        let state = AppState::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(embeddings),
            &config(),
        );
        create_router(state)
    }

    fn app() -> Router {
        app_with(EmbeddingsService::new(Arc::new(AxisFactory), "axis:v1", 2))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create(app: &Router, graph: &str, body: Value) -> Value {
        let (status, value) = send(
            app,
            Method::POST,
            &format!("/api/nodes?graphId={}", graph),
            Some("alice-token"),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", value);
        value
    }

    #[tokio::test]
    async fn test_missing_graph_id_is_400() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/api/nodes", Some("alice-token"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "MISSING_GRAPH_ID");
    }

    #[tokio::test]
    async fn test_missing_or_unknown_token_is_401() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/api/nodes?graphId=g1", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) = send(&app, Method::GET, "/api/nodes?graphId=g1", Some("forged"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_graph_outside_token_scope_is_403() {
        let app = app();
        let (status, body) =
            send(&app, Method::GET, "/api/nodes?graphId=g9", Some("alice-token"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_unknown_node_is_404() {
        let app = app();
        let (status, body) =
            send(&app, Method::GET, "/api/nodes/T404?graphId=g1", Some("alice-token"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_create_then_list_with_float_limit() {
        let app = app();
        for i in 0..3 {
            create(&app, "g1", json!({"id": format!("T{}", i), "type": "Task", "properties": {"title": "graph work"}})).await;
        }
        create(&app, "g2", json!({"id": "T9", "type": "Task", "properties": {}})).await;

        let (status, body) = send(
            &app,
            Method::GET,
            "/api/nodes?graphId=g1&limit=50.0&labels=Task",
            Some("alice-token"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["limit"], 50);
        assert_eq!(body["nodes"].as_array().unwrap().len(), 3);

        let (status, body) = send(
            &app,
            Method::GET,
            "/api/nodes?graphId=g1&limit=2.5",
            Some("alice-token"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION");
    }

    #[tokio::test]
    async fn test_batch_reports_each_item() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/nodes/batch?graphId=g1",
            Some("alice-token"),
            Some(json!({"nodes": [
                {"id": "TASK-1", "type": "Task", "properties": {"title": "graph store"}},
                {"type": "Bogus", "properties": {"title": "nope"}},
                {"type": "ADR", "properties": {"title": "Use a graph"}}
            ]})),
        )
        .await;

        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["created"], 2);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["items"][0]["id"], "TASK-1");
        assert_eq!(body["items"][0]["embedded"], true);
        assert_eq!(body["items"][1]["error"]["code"], "VALIDATION");
        assert_eq!(body["items"][2]["embedded"], true);

        let (status, _) = send(&app, Method::GET, "/api/nodes/TASK-1?graphId=g1", Some("bob-token"), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_patch_records_status_history_once() {
        let app = app();
        create(&app, "g1", json!({"id": "T1", "type": "Task", "properties": {"status": "todo"}})).await;

        let patch = json!({"properties": {"status": "in_progress"}});
        let (status, body) = send(
            &app,
            Method::PATCH,
            "/api/nodes/T1?graphId=g1",
            Some("alice-token"),
            Some(patch.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["statusEvent"]["newStatus"], "in_progress");

        let (_, body) = send(&app, Method::PATCH, "/api/nodes/T1?graphId=g1", Some("alice-token"), Some(patch)).await;
        assert!(body["statusEvent"].is_null());

        let (status, history) = send(
            &app,
            Method::GET,
            "/api/status/history?graphId=g1&entityType=Task&entityId=T1",
            Some("alice-token"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let events = history.as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["oldStatus"], "todo");
        assert_eq!(events[0]["changedBy"], "alice");
    }

    #[tokio::test]
    async fn test_adjacency_depth_is_bounded() {
        let app = app();
        create(&app, "g1", json!({"id": "T1", "type": "Task", "properties": {}})).await;
        create(&app, "g1", json!({"id": "T2", "type": "Task", "properties": {}})).await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/relationships?graphId=g1",
            Some("alice-token"),
            Some(json!({"type": "DEPENDS_ON", "sourceId": "T1", "targetId": "T2"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) =
            send(&app, Method::GET, "/api/adjacencies/T1?graphId=g1&depth=1", Some("alice-token"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nodes"][0]["id"], "T2");

        let (status, body) =
            send(&app, Method::GET, "/api/adjacencies/T1?graphId=g1&depth=4", Some("alice-token"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION");
    }

    #[tokio::test]
    async fn test_semantic_query() {
        let app = app();
        create(&app, "g1", json!({"id": "P1", "type": "Pattern", "properties": {"title": "graph graph"}})).await;
        create(&app, "g1", json!({"id": "P2", "type": "Pattern", "properties": {"title": "plain"}})).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/query",
            Some("alice-token"),
            Some(json!({"graphId": "g1", "query": "graph", "limit": 10.0, "threshold": 0.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["node"]["id"], "P1");
    }

    #[tokio::test]
    async fn test_query_without_embeddings_is_503() {
        let app = app_with(EmbeddingsService::unconfigured());
        create(&app, "g1", json!({"id": "P1", "type": "Pattern", "properties": {"title": "x"}})).await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/query",
            Some("alice-token"),
            Some(json!({"graphId": "g1", "query": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_private_project_gates_graph_access() {
        let app = app();
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/projects",
            Some("alice-token"),
            Some(json!({"id": "g2", "visibility": "private"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(&app, Method::GET, "/api/nodes?graphId=g2", Some("bob-token"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/projects/g2/members",
            Some("alice-token"),
            Some(json!({"user": "bob"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::GET, "/api/nodes?graphId=g2", Some("bob-token"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            Method::DELETE,
            "/api/projects/g2/owners/alice",
            Some("alice-token"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION");
    }

    #[tokio::test]
    async fn test_health_is_unauthenticated() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/api/status", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["embeddings"]["model"], "axis:v1");
    }

    #[tokio::test]
    async fn test_active_sprint_absent_is_404() {
        let app = app();
        let (status, _) = send(&app, Method::GET, "/api/sprint/active?graphId=g1", Some("alice-token"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
