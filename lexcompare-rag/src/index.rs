//! In-memory embedding index with exhaustive similarity search.
//!
//! [`EmbeddingIndex`] is an owned, request-scoped value: it is built from one
//! document's chunks, queried, and dropped with the request. Sharing across
//! requests goes through [`IndexCache`](crate::cache::IndexCache), which only
//! ever hands out fully built indexes behind an `Arc`.

use std::cmp::Ordering;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, TryStreamExt, stream};
use tracing::{debug, error, info};

use crate::config::{RagConfig, SimilarityMetric};
use crate::document::{Chunk, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Chunk vectors of a single, fixed dimension, searchable by similarity.
///
/// # Example
///
/// ```rust,ignore
/// use lexcompare_rag::{EmbeddingIndex, HashingEmbeddingProvider, RagConfig};
///
/// let provider = HashingEmbeddingProvider::new(256);
/// let index = EmbeddingIndex::build(&provider, chunks, &RagConfig::default()).await?;
/// let query = provider.embed_query("termination rights").await?;
/// let top = index.query(&query, 5)?;
/// ```
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    dimensions: usize,
    metric: SimilarityMetric,
    entries: Vec<IndexedChunk>,
}

impl EmbeddingIndex {
    /// Create an empty index for vectors of `dimensions` entries.
    pub fn new(dimensions: usize, metric: SimilarityMetric) -> Self {
        Self { dimensions, metric, entries: Vec::new() }
    }

    /// Embed `chunks` with `provider` and index them.
    ///
    /// Texts are sent in batches of `config.embedding_batch_size`, with up to
    /// `config.embedding_concurrency` batches in flight. Vectors are matched
    /// to chunks by position, so the result does not depend on completion order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the provider fails, returns the
    /// wrong number of vectors, or returns a vector of the wrong dimension.
    pub async fn build(
        provider: &dyn EmbeddingProvider,
        chunks: Vec<Chunk>,
        config: &RagConfig,
    ) -> Result<Self> {
        let mut index = Self::new(provider.dimensions(), config.similarity_metric);
        if chunks.is_empty() {
            return Ok(index);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let batch_size = config.embedding_batch_size.max(1);
        let concurrency = config.embedding_concurrency.max(1);
        debug!(
            provider = provider.name(),
            chunk_count = texts.len(),
            batch_size,
            concurrency,
            "embedding chunks"
        );

        // Type-erased so callers' futures can be proven `Send` (works around
        // rustc's higher-ranked lifetime limitation with stored closures).
        let embed: BoxFuture<'_, Result<Vec<Vec<Vec<f32>>>>> =
            stream::iter(texts.chunks(batch_size))
                .map(move |batch| provider.embed_batch(batch))
                .buffered(concurrency)
                .try_collect()
                .boxed();
        let batches = embed
            .await
            .map_err(|e| {
                error!(provider = provider.name(), error = %e, "embedding failed during index build");
                e
            })?;

        let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
        if vectors.len() != chunks.len() {
            return Err(RagError::embedding(
                provider.name(),
                format!("expected {} embeddings, got {}", chunks.len(), vectors.len()),
            ));
        }

        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            index.insert(chunk, vector).map_err(|e| match e {
                RagError::EmbeddingError { message, .. } => {
                    RagError::embedding(provider.name(), message)
                }
                other => other,
            })?;
        }

        info!(
            provider = provider.name(),
            chunk_count = index.len(),
            dimensions = index.dimensions,
            metric = %index.metric,
            "built embedding index"
        );
        Ok(index)
    }

    /// Add a chunk with its vector. A chunk with the same id replaces the old entry.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the vector has the wrong
    /// dimension or contains non-finite values.
    pub fn insert(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(RagError::embedding(
                "index",
                format!(
                    "dimension mismatch for chunk '{}': expected {}, got {}",
                    chunk.id(),
                    self.dimensions,
                    vector.len()
                ),
            ));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(RagError::embedding(
                "index",
                format!("non-finite value in embedding for chunk '{}'", chunk.id()),
            ));
        }

        let existing = self.entries.iter().position(|e| {
            e.chunk.source_id == chunk.source_id && e.chunk.sequence_index == chunk.sequence_index
        });
        let entry = IndexedChunk { chunk, vector };
        match existing {
            Some(pos) => self.entries[pos] = entry,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    /// Return the `k` chunks most similar to `vector`, best first.
    ///
    /// Equal scores are ordered by ascending `sequence_index` (then source id),
    /// so the output is deterministic. A `k` larger than the index returns
    /// every entry.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyIndex`] if nothing has been indexed.
    /// - [`RagError::EmbeddingError`] if `vector` has the wrong dimension.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if self.entries.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        if vector.len() != self.dimensions {
            return Err(RagError::embedding(
                "index",
                format!(
                    "query dimension mismatch: expected {}, got {}",
                    self.dimensions,
                    vector.len()
                ),
            ));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<SearchResult> = self
            .entries
            .iter()
            .map(|entry| SearchResult {
                chunk: entry.chunk.clone(),
                score: self.metric.score(&entry.vector, vector),
            })
            .collect();

        scored.sort_by(rank_order);
        scored.truncate(k);
        Ok(scored)
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension accepted by this index.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Similarity metric used for scoring.
    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// Indexed chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}

/// Descending score; ties broken by ascending sequence index, then source id.
pub(crate) fn rank_order(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
        .then_with(|| a.chunk.source_id.cmp(&b.chunk.source_id))
}
