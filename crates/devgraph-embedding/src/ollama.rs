//! Ollama HTTP backend for embedding generation.
//!
//! Uses the Ollama API at /api/embeddings, by default with the
//! nomic-embed-text model (768 dimensions).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use devgraph_core::retry::with_retry;
use devgraph_core::{DevgraphError, DevgraphResult, RetryPolicy};

use crate::service::{Embedder, EmbedderFactory};

/// Ollama embedding client.
#[derive(Clone)]
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    policy: RetryPolicy,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Map an HTTP status to an error. 5xx and 429 are worth retrying.
fn status_error(status: StatusCode, body: &str) -> DevgraphError {
    let msg = format!("Ollama API error ({}): {}", status, body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        DevgraphError::transient(msg)
    } else {
        DevgraphError::unavailable(msg)
    }
}

fn request_error(e: reqwest::Error) -> DevgraphError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        DevgraphError::transient(format!("Failed to connect to Ollama: {}", e))
    } else {
        DevgraphError::unavailable(format!("Ollama request failed: {}", e))
    }
}

/// Whether a `/api/tags` listing contains the model. `nomic-embed-text`
/// matches `nomic-embed-text:latest`.
fn has_model(tags: &TagsResponse, model: &str) -> bool {
    tags.models.iter().any(|m| {
        m.name == model || m.name.split(':').next() == Some(model)
    })
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, dimension: usize, policy: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(policy.timeout)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
            policy,
            client,
        }
    }

    async fn request_embedding(&self, text: &str) -> DevgraphResult<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let result: EmbeddingResponse = response.json().await.map_err(|e| {
            DevgraphError::unavailable(format!("Failed to parse Ollama response: {}", e))
        })?;

        debug!(dim = result.embedding.len(), "Generated embedding");
        Ok(result.embedding)
    }

    /// Check that the service is up and the model is pulled.
    pub async fn health_check(&self) -> DevgraphResult<bool> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            DevgraphError::unavailable(format!("Failed to parse Ollama tags: {}", e))
        })?;
        Ok(has_model(&tags, &self.model))
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> DevgraphResult<Vec<f32>> {
        with_retry(&self.policy, "ollama.embed", || self.request_embedding(text)).await
    }
}

/// Loads an [`OllamaEmbedder`] after confirming the model is available.
pub struct OllamaFactory {
    base_url: String,
    model: String,
    dimension: usize,
    policy: RetryPolicy,
}

impl OllamaFactory {
    pub fn new(base_url: &str, model: &str, dimension: usize, policy: RetryPolicy) -> Self {
        Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            dimension,
            policy,
        }
    }
}

#[async_trait]
impl EmbedderFactory for OllamaFactory {
    async fn load(&self) -> DevgraphResult<Arc<dyn Embedder>> {
        let embedder = OllamaEmbedder::new(&self.base_url, &self.model, self.dimension, self.policy.clone());

        let available = with_retry(&self.policy, "ollama.health", || embedder.health_check()).await?;
        if !available {
            return Err(DevgraphError::unavailable(format!(
                "Model '{}' is not available at {}. Run: ollama pull {}",
                self.model, self.base_url, self.model
            )));
        }

        info!(url = %self.base_url, model = %self.model, "Ollama embedder ready");
        Ok(Arc::new(embedder))
    }
}
