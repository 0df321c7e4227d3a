//! Query-side retrieval: embed → search → threshold.

use std::sync::Arc;

use tracing::{debug, error};

use crate::config::RagConfig;
use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::index::EmbeddingIndex;

/// Selects the chunks of an [`EmbeddingIndex`] most relevant to a question.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use lexcompare_rag::{HashingEmbeddingProvider, Retriever};
///
/// let retriever = Retriever::new(Arc::new(HashingEmbeddingProvider::default()), 10, 0.2);
/// let result = retriever.retrieve(&index, "governing law").await?;
/// ```
#[derive(Clone)]
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    min_score: f32,
}

impl Retriever {
    /// Create a retriever with fixed `top_k` and `min_score`.
    pub fn new(embedding_provider: Arc<dyn EmbeddingProvider>, top_k: usize, min_score: f32) -> Self {
        Self { embedding_provider, top_k, min_score }
    }

    /// Create a retriever using the `top_k` and `min_score` of a [`RagConfig`].
    pub fn from_config(embedding_provider: Arc<dyn EmbeddingProvider>, config: &RagConfig) -> Self {
        Self::new(embedding_provider, config.top_k, config.min_score)
    }

    /// Retrieve with the configured `top_k` and `min_score`.
    ///
    /// # Errors
    ///
    /// See [`Retriever::retrieve_with`].
    pub async fn retrieve(&self, index: &EmbeddingIndex, query: &str) -> Result<RetrievalResult> {
        self.retrieve_with(index, query, self.top_k, self.min_score).await
    }

    /// Embed `query`, take the `k` nearest chunks, and drop any scoring below `min_score`.
    ///
    /// `k == 0` returns an empty result without calling the embedding provider.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyIndex`](crate::RagError::EmptyIndex) if the index is empty.
    /// - [`RagError::EmbeddingError`](crate::RagError::EmbeddingError) if the
    ///   query cannot be embedded or has the wrong dimension.
    pub async fn retrieve_with(
        &self,
        index: &EmbeddingIndex,
        query: &str,
        k: usize,
        min_score: f32,
    ) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(RetrievalResult::empty());
        }

        let query_embedding = self.embedding_provider.embed_query(query).await.map_err(|e| {
            error!(provider = self.embedding_provider.name(), error = %e, "query embedding failed");
            e
        })?;

        let nearest = index.query(&query_embedding, k)?;
        let candidates = nearest.len();
        let kept: Vec<_> = nearest.into_iter().filter(|r| r.score >= min_score).collect();

        debug!(k, min_score, candidates, kept = kept.len(), "retrieval completed");
        Ok(RetrievalResult::new(kept))
    }
}
