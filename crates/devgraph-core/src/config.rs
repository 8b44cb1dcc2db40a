//! Configuration loaded from `.devgraph/config.toml` and the environment.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{DevgraphError, DevgraphResult};

/// Default location of the config file, relative to the project directory.
pub const CONFIG_FILE: &str = ".devgraph/config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DevgraphConfig {
    pub graph: GraphConfig,
    pub embedding: EmbeddingConfig,
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub auth: AuthConfig,
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: usize,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "devgraph_dev".to_string(),
            database: "neo4j".to_string(),
            max_connections: 16,
            fetch_size: 200,
        }
    }
}

/// Embedding backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub model: String,
    /// Tag stored next to every vector; vectors with different tags are never compared.
    pub model_version: String,
    pub dimension: usize,
    pub batch_concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: Some("http://localhost:11434".to_string()),
            model: "nomic-embed-text".to_string(),
            model_version: "nomic-embed-text:v1.5".to_string(),
            dimension: 768,
            batch_concurrency: 4,
        }
    }
}

impl EmbeddingConfig {
    /// Whether enough is configured to try loading a model.
    pub fn is_configured(&self) -> bool {
        self.enabled
            && self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
            && !self.model.trim().is_empty()
            && self.dimension > 0
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3040,
        }
    }
}

/// Bounds applied to traversals and infrastructure calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_traversal_depth: u32,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_traversal_depth: 3,
            request_timeout_ms: 3000,
            max_retries: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

/// Bearer tokens accepted by the API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenConfig>,
}

/// Graph scope entry granting access to every graph.
pub const ALL_GRAPHS: &str = "*";

/// One bearer token, the user it authenticates and the graphs it is scoped to.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub user: String,
    #[serde(default)]
    pub graphs: Vec<String>,
}

impl DevgraphConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> DevgraphResult<Self> {
        toml::from_str(text)
            .map_err(|e| DevgraphError::validation(format!("Invalid configuration: {}", e)))
    }

    /// Load `<project_dir>/.devgraph/config.toml` if it exists, then apply
    /// environment overrides.
    pub fn load(project_dir: &Path) -> DevgraphResult<Self> {
        let path = project_dir.join(CONFIG_FILE);
        let mut config = Self::load_file(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file(path: &PathBuf) -> DevgraphResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = lookup("NEO4J_URI") {
            self.graph.uri = uri;
        }
        if let Some(user) = lookup("NEO4J_USER") {
            self.graph.user = user;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            self.graph.password = password;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.embedding.url = Some(url);
        }
        if let Some(model) = lookup("DEVGRAPH_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(port) = lookup("DEVGRAPH_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(token) = lookup("DEVGRAPH_API_TOKEN") {
            let user = lookup("DEVGRAPH_API_USER").unwrap_or_else(|| "api".to_string());
            let graphs = lookup("DEVGRAPH_API_GRAPHS")
                .map(|g| g.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_else(|| vec![ALL_GRAPHS.to_string()]);
            self.auth.tokens.push(TokenConfig { token, user, graphs });
        }
    }
}
