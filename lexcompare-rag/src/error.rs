//! Error types for the `lexcompare-rag` crate.

use thiserror::Error;

/// Errors that can occur while running the comparison pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing, empty, or unsupported input. Raised before any pipeline work.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A document container could not be turned into text.
    #[error("Extraction error ({source_name}): {message}")]
    Extraction {
        /// The file or source that failed to extract.
        source_name: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error occurred during embedding generation, including dimension mismatches.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Retrieval was attempted against an index with no chunks.
    #[error("Index is empty: no chunks have been indexed")]
    EmptyIndex,

    /// The generation backend failed before producing a stream, or in batch mode.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A generation stream failed after it started.
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Shorthand for an [`RagError::EmbeddingError`].
    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingError { provider: provider.into(), message: message.into() }
    }

    /// Shorthand for an [`RagError::GenerationError`].
    pub fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GenerationError { provider: provider.into(), message: message.into() }
    }

    /// Shorthand for an [`RagError::Extraction`].
    pub fn extraction(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction { source_name: source_name.into(), message: message.into() }
    }

    /// Whether this error was caused by the caller's input rather than the system.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;
