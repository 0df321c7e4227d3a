//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use lexcompare_rag::{ComparisonPipeline, GeminiEmbeddingProvider, GeminiGenerator, Result};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// State handed to every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pipeline: ComparisonPipeline,
    shutdown: CancellationToken,
    request_timeout: Duration,
}

impl AppState {
    /// Wrap an already built pipeline.
    pub fn new(
        pipeline: ComparisonPipeline,
        shutdown: CancellationToken,
        request_timeout: Duration,
    ) -> Self {
        Self { inner: Arc::new(AppStateInner { pipeline, shutdown, request_timeout }) }
    }

    /// Build the Gemini-backed pipeline described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`](lexcompare_rag::RagError::ConfigError)
    /// if the pipeline configuration is invalid.
    pub fn from_config(config: &ServerConfig, shutdown: CancellationToken) -> Result<Self> {
        let embedder =
            GeminiEmbeddingProvider::new(config.api_key.clone()).with_model(&config.embedding_model);
        let generator =
            GeminiGenerator::new(config.api_key.clone()).with_model(&config.generation_model);

        let pipeline = ComparisonPipeline::builder()
            .config(config.rag.clone())
            .embedding_provider(Arc::new(embedder))
            .generator(Arc::new(generator))
            .build()?;

        tracing::info!(
            embedding_model = %config.embedding_model,
            generation_model = %config.generation_model,
            chunk_size = config.rag.chunk_size,
            chunk_overlap = config.rag.chunk_overlap,
            top_k = config.rag.top_k,
            "pipeline initialised"
        );
        Ok(Self::new(pipeline, shutdown, config.request_timeout))
    }

    /// The comparison pipeline.
    pub fn pipeline(&self) -> &ComparisonPipeline {
        &self.inner.pipeline
    }

    /// A fresh token for one request, cancelled when the server shuts down.
    pub fn request_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }

    /// How long an analysis may run before it is cancelled.
    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }
}
