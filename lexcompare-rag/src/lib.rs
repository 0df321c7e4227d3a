//! # lexcompare-rag
//!
//! Retrieval pipeline for reviewing a legal document against a large
//! reference corpus, and for comparing two documents side by side.
//!
//! ## Overview
//!
//! A request in retrieval mode flows through five stages:
//!
//! 1. [`OverlappingChunker`] splits the reference text into overlapping
//!    character windows that remember their exact offsets.
//! 2. [`EmbeddingIndex`] embeds every chunk through an [`EmbeddingProvider`].
//! 3. [`Retriever`] embeds the question and selects the nearest chunks.
//! 4. [`PromptAssembler`] packs the selected chunks into a bounded context.
//! 5. [`AnswerAccumulator`] drains the model's [`DeltaStream`] into an
//!    [`Answer`], honouring a [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! [`ComparisonPipeline`] wires the stages together. Comparison mode skips
//! retrieval and sends both documents in one batch request.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lexcompare_rag::{ComparisonPipeline, Document, HashingEmbeddingProvider, RagConfig, ScriptedGenerator};
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = ComparisonPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .generator(Arc::new(ScriptedGenerator::new(["No issues found."])))
//!     .build()?;
//!
//! let answer = pipeline
//!     .analyze(&Document::new("lease", lease_text), &Document::new("code", civil_code), &CancellationToken::new())
//!     .await?;
//! println!("{}", answer.text);
//! ```
//!
//! ## Features
//!
//! - `gemini` (default): [`GeminiEmbeddingProvider`] and [`GeminiGenerator`]
//!   over the Gemini REST API.

pub mod answer;
pub mod cache;
pub mod chunking;
pub mod comparison;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
#[cfg(feature = "gemini")]
pub mod gemini;
pub mod generation;
pub mod hashing;
pub mod index;
pub mod mock;
pub mod pipeline;
pub mod prompt;
pub mod retriever;

pub use answer::{Answer, AnswerAccumulator, AnswerStatus, accumulate};
pub use cache::{IndexCache, fingerprint};
pub use chunking::{Chunker, OverlappingChunker, chunk_text};
pub use comparison::{COMPARISON_INSTRUCTION, compare_documents, comparison_prompt};
pub use config::{RagConfig, RagConfigBuilder, SimilarityMetric};
pub use document::{Chunk, Document, DocumentKind, RetrievalResult, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
#[cfg(feature = "gemini")]
pub use gemini::{GeminiEmbeddingProvider, GeminiGenerator};
pub use generation::{DeltaStream, TextGenerator};
pub use hashing::HashingEmbeddingProvider;
pub use index::EmbeddingIndex;
pub use mock::ScriptedGenerator;
pub use pipeline::{ComparisonPipeline, ComparisonPipelineBuilder};
pub use prompt::{
    DEFAULT_DELIMITER, LEGAL_REVIEW_QUESTION, NO_CONTEXT_MARKER, Prompt, PromptAssembler,
    RETRIEVAL_INSTRUCTION, legal_review_question,
};
pub use retriever::Retriever;
