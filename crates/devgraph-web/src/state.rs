//! Application state.

use std::sync::Arc;

use devgraph_core::DevgraphConfig;
use devgraph_embedding::EmbeddingsService;
use devgraph_graph::{
    AuthorizationGateway, GraphBackend, GraphStore, SemanticSearchEngine, StatusEventLog, SyncEngine,
};

use crate::auth::TokenRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<GraphStore>,
    pub events: Arc<StatusEventLog>,
    pub search: Arc<SemanticSearchEngine>,
    pub sync: Arc<SyncEngine>,
    pub gateway: Arc<AuthorizationGateway>,
    pub tokens: Arc<TokenRegistry>,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn GraphBackend>,
        embeddings: Arc<EmbeddingsService>,
        config: &DevgraphConfig,
    ) -> Self {
        let store = Arc::new(GraphStore::new(
            backend.clone(),
            embeddings.clone(),
            config.limits.max_traversal_depth,
        ));
        Self {
            events: Arc::new(StatusEventLog::new(backend.clone())),
            search: Arc::new(SemanticSearchEngine::new(backend.clone(), embeddings)),
            sync: Arc::new(SyncEngine::new(store.clone())),
            gateway: Arc::new(AuthorizationGateway::new(backend)),
            tokens: Arc::new(TokenRegistry::from_config(&config.auth)),
            store,
        }
    }
}
