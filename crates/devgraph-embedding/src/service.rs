//! The process-wide embeddings service.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use devgraph_core::config::EmbeddingConfig;
use devgraph_core::{DevgraphError, DevgraphResult, RetryPolicy};

use crate::ollama::OllamaFactory;

/// A loaded text encoder.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this encoder produces.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> DevgraphResult<Vec<f32>>;
}

/// Acquires an [`Embedder`]. Only ever called from
/// [`EmbeddingsService::initialize`].
#[async_trait]
pub trait EmbedderFactory: Send + Sync {
    async fn load(&self) -> DevgraphResult<Arc<dyn Embedder>>;
}

/// Lazily-initialized embeddings service.
///
/// The first call to [`initialize`](Self::initialize) runs the factory;
/// concurrent callers wait on the same load. A failed load leaves the service
/// uninitialized so the next call tries again.
pub struct EmbeddingsService {
    factory: Option<Arc<dyn EmbedderFactory>>,
    model_version: String,
    dimension: usize,
    concurrency: usize,
    model: OnceCell<Arc<dyn Embedder>>,
}

impl EmbeddingsService {
    pub fn new(
        factory: Arc<dyn EmbedderFactory>,
        model_version: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            factory: Some(factory),
            model_version: model_version.into(),
            dimension,
            concurrency: 4,
            model: OnceCell::new(),
        }
    }

    /// A service with no backend. Every call fails with `SERVICE_UNAVAILABLE`.
    pub fn unconfigured() -> Self {
        Self {
            factory: None,
            model_version: String::new(),
            dimension: 0,
            concurrency: 1,
            model: OnceCell::new(),
        }
    }

    /// Build from configuration, backed by Ollama when configured.
    pub fn from_config(config: &EmbeddingConfig, policy: RetryPolicy) -> Self {
        let url = match config.url.as_deref() {
            Some(url) if config.is_configured() => url,
            _ => {
                info!("Embeddings not configured; semantic search disabled");
                return Self::unconfigured();
            }
        };
        let factory = OllamaFactory::new(url, &config.model, config.dimension, policy);
        Self::new(Arc::new(factory), &config.model_version, config.dimension)
            .with_concurrency(config.batch_concurrency)
    }

    /// Maximum number of in-flight requests during a batch.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.factory.is_some()
    }

    /// Whether the model has been loaded.
    pub fn is_ready(&self) -> bool {
        self.model.initialized()
    }

    /// Version tag stored with every vector produced here.
    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Load the model if it is not loaded yet.
    pub async fn initialize(&self) -> DevgraphResult<Arc<dyn Embedder>> {
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| DevgraphError::unavailable("Embeddings are not configured"))?;

        let embedder = self
            .model
            .get_or_try_init(|| async {
                info!(model = %self.model_version, "Loading embedding model");
                let embedder = factory.load().await.map_err(|e| {
                    warn!(error = %e, "Embedding model failed to load");
                    e
                })?;
                if embedder.dimension() != self.dimension {
                    return Err(DevgraphError::unavailable(format!(
                        "Embedding model produces {} dimensions, configured for {}",
                        embedder.dimension(),
                        self.dimension
                    )));
                }
                Ok(embedder)
            })
            .await?;

        Ok(Arc::clone(embedder))
    }

    /// Reject vectors that do not have the configured dimension.
    pub fn check_dimension(&self, vector: &[f32]) -> DevgraphResult<()> {
        if vector.len() != self.dimension {
            return Err(DevgraphError::validation(format!(
                "Embedding has {} dimensions, expected {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    /// Embed one text.
    pub async fn embed(&self, text: &str) -> DevgraphResult<Vec<f32>> {
        let embedder = self.initialize().await?;
        self.embed_with(embedder.as_ref(), text).await
    }

    /// Embed many texts. The outer result fails only when the model cannot
    /// be loaded; each item carries its own outcome.
    pub async fn embed_batch(&self, texts: &[String]) -> DevgraphResult<Vec<DevgraphResult<Vec<f32>>>> {
        let embedder = self.initialize().await?;

        let results: Vec<DevgraphResult<Vec<f32>>> = stream::iter(texts.iter().cloned())
            .map(|text| {
                let embedder = Arc::clone(&embedder);
                async move { self.embed_with(embedder.as_ref(), &text).await }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(total = texts.len(), failed, "Embedded batch");

        Ok(results)
    }

    async fn embed_with(&self, embedder: &dyn Embedder, text: &str) -> DevgraphResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(DevgraphError::validation("Cannot embed empty text"));
        }
        let vector = embedder.embed(text).await?;
        if vector.len() != self.dimension {
            return Err(DevgraphError::unavailable(format!(
                "Embedding model returned {} dimensions, expected {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn dimension(&self) -> usize {
            3
        }

        async fn embed(&self, text: &str) -> DevgraphResult<Vec<f32>> {
            if text.contains("boom") {
                return Err(DevgraphError::unavailable("model crashed"));
            }
            Ok(vec![text.len() as f32, 1.0, 0.0])
        }
    }

    /// Counts loads and fails the first `failures` of them.
    struct CountingFactory {
        loads: AtomicUsize,
        failures: usize,
    }

    impl CountingFactory {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                failures,
            })
        }
    }

    #[async_trait]
    impl EmbedderFactory for CountingFactory {
        async fn load(&self) -> DevgraphResult<Arc<dyn Embedder>> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if n < self.failures {
                return Err(DevgraphError::unavailable("model download failed"));
            }
            Ok(Arc::new(FakeEmbedder))
        }
    }

    #[tokio::test]
    async fn test_concurrent_initialize_loads_once() {
        let factory = CountingFactory::new(0);
        let service = EmbeddingsService::new(factory.clone(), "fake:v1", 3);

        let results = futures::future::join_all((0..8).map(|_| service.initialize())).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(factory.loads.load(Ordering::SeqCst), 1);
        assert!(service.is_ready());
    }

    #[tokio::test]
    async fn test_failed_initialize_is_retried() {
        let factory = CountingFactory::new(1);
        let service = EmbeddingsService::new(factory.clone(), "fake:v1", 3);

        assert!(service.initialize().await.is_err());
        assert!(!service.is_ready());
        assert!(service.initialize().await.is_ok());
        assert_eq!(factory.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unconfigured_fails_fast() {
        let service = EmbeddingsService::unconfigured();
        assert_eq!(service.embed("hello").await.unwrap_err().code(), "SERVICE_UNAVAILABLE");
        assert_eq!(
            service.embed_batch(&["a".to_string()]).await.unwrap_err().code(),
            "SERVICE_UNAVAILABLE"
        );
        assert!(service.initialize().await.is_err());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let service = EmbeddingsService::new(CountingFactory::new(0), "fake:v1", 768);
        match service.initialize().await {
            Err(err) => assert_eq!(err.code(), "SERVICE_UNAVAILABLE"),
            Ok(_) => panic!("a 3-dimensional model must not load for 768 dimensions"),
        }

        assert!(service.check_dimension(&[0.0; 768]).is_ok());
        assert_eq!(service.check_dimension(&[0.0; 3]).unwrap_err().code(), "VALIDATION");
    }

    #[tokio::test]
    async fn test_batch_reports_per_item_outcomes() {
        let service = EmbeddingsService::new(CountingFactory::new(0), "fake:v1", 3);
        let texts = vec!["first".to_string(), "boom".to_string(), "".to_string(), "last".to_string()];

        let results = service.embed_batch(&texts).await.unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap()[0], 5.0);
        assert_eq!(results[1].as_ref().unwrap_err().code(), "SERVICE_UNAVAILABLE");
        assert_eq!(results[2].as_ref().unwrap_err().code(), "VALIDATION");
        assert_eq!(results[3].as_ref().unwrap()[0], 4.0);
    }
}
