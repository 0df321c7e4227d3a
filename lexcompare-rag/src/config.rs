//! Configuration for the retrieval pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Similarity function used to score chunks against a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Cosine similarity. Vectors do not need to be normalized.
    #[default]
    Cosine,
    /// Raw inner product. Intended for providers that return unit-length vectors.
    Dot,
}

impl SimilarityMetric {
    /// Score two vectors of equal length.
    ///
    /// Cosine returns 0.0 if either vector has zero magnitude.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        match self {
            Self::Dot => dot,
            Self::Cosine => {
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 0.0;
                }
                dot / (norm_a * norm_b)
            }
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Dot => write!(f, "dot"),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            other => Err(RagError::ConfigError(format!(
                "unknown similarity metric '{other}' (expected 'cosine' or 'dot')"
            ))),
        }
    }
}

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Window length in characters.
    pub chunk_size: usize,
    /// Number of characters repeated between adjacent windows.
    pub chunk_overlap: usize,
    /// Maximum number of chunks retrieved per query. Zero retrieves nothing.
    pub top_k: usize,
    /// Similarity floor; results scoring below it are dropped.
    pub min_score: f32,
    /// Character budget for the assembled context block.
    pub max_context_chars: usize,
    /// Similarity function used by the index.
    pub similarity_metric: SimilarityMetric,
    /// Number of chunk texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Number of embedding requests allowed in flight at once.
    pub embedding_concurrency: usize,
    /// Number of reference indexes kept in memory. Zero disables caching.
    pub index_cache_capacity: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 10,
            min_score: -1.0,
            max_context_chars: 30_000,
            similarity_metric: SimilarityMetric::Cosine,
            embedding_batch_size: 100,
            embedding_concurrency: 4,
            index_cache_capacity: 0,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are mutually consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `max_context_chars == 0`
    /// - `min_score` is not finite
    /// - `embedding_batch_size == 0` or `embedding_concurrency == 0`
    pub fn validate(&self) -> Result<()> {
        validate_chunking(self.chunk_size, self.chunk_overlap)?;
        if self.max_context_chars == 0 {
            return Err(RagError::ConfigError(
                "max_context_chars must be greater than zero".to_string(),
            ));
        }
        if !self.min_score.is_finite() {
            return Err(RagError::ConfigError(format!(
                "min_score must be a finite number, got {}",
                self.min_score
            )));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.embedding_concurrency == 0 {
            return Err(RagError::ConfigError(
                "embedding_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validate a chunk size / overlap pair.
pub(crate) fn validate_chunking(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::ConfigError(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the window length in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks to retrieve.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity score.
    pub fn min_score(mut self, score: f32) -> Self {
        self.config.min_score = score;
        self
    }

    /// Set the context budget in characters.
    pub fn max_context_chars(mut self, chars: usize) -> Self {
        self.config.max_context_chars = chars;
        self
    }

    /// Set the similarity metric.
    pub fn similarity_metric(mut self, metric: SimilarityMetric) -> Self {
        self.config.similarity_metric = metric;
        self
    }

    /// Set the number of texts per embedding request.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set the number of concurrent embedding requests.
    pub fn embedding_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embedding_concurrency = concurrency;
        self
    }

    /// Set the index cache capacity. Zero disables the cache.
    pub fn index_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.index_cache_capacity = capacity;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RagConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = RagConfig::builder().chunk_size(0).chunk_overlap(0).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn zero_top_k_is_allowed() {
        let config = RagConfig::builder().top_k(0).build().unwrap();
        assert_eq!(config.top_k, 0);
    }

    #[test]
    fn non_finite_min_score_is_rejected() {
        assert!(RagConfig::builder().min_score(f32::NAN).build().is_err());
    }

    #[test]
    fn metric_parses_case_insensitively() {
        assert_eq!("Cosine".parse::<SimilarityMetric>().unwrap(), SimilarityMetric::Cosine);
        assert_eq!(" dot ".parse::<SimilarityMetric>().unwrap(), SimilarityMetric::Dot);
        assert!("euclid".parse::<SimilarityMetric>().is_err());
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(SimilarityMetric::Cosine.score(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_ignores_magnitude_but_dot_does_not() {
        let a = [2.0, 0.0];
        let b = [3.0, 0.0];
        assert!((SimilarityMetric::Cosine.score(&a, &b) - 1.0).abs() < 1e-6);
        assert!((SimilarityMetric::Dot.score(&a, &b) - 6.0).abs() < 1e-6);
    }
}
