//! Comparison pipeline orchestrator.
//!
//! The [`ComparisonPipeline`] runs one request end to end. In retrieval mode
//! it chunks and indexes the reference document, retrieves the passages
//! closest to the primary document, assembles a bounded prompt and streams
//! the model's answer. In comparison mode it sends both texts in one batch
//! request.
//!
//! # Example
//!
//! ```rust,ignore
//! use lexcompare_rag::{ComparisonPipeline, Document, RagConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = ComparisonPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .generator(Arc::new(generator))
//!     .build()?;
//!
//! let answer = pipeline
//!     .analyze(&Document::new("contract", contract), &Document::new("law", law), &CancellationToken::new())
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::answer::{Answer, accumulate};
use crate::cache::{IndexCache, fingerprint};
use crate::chunking::{Chunker, OverlappingChunker};
use crate::comparison::compare_documents;
use crate::config::RagConfig;
use crate::document::Document;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::TextGenerator;
use crate::index::EmbeddingIndex;
use crate::prompt::{Prompt, PromptAssembler, RETRIEVAL_INSTRUCTION, legal_review_question};
use crate::retriever::Retriever;

/// The comparison pipeline orchestrator.
///
/// Construct one via [`ComparisonPipeline::builder()`]. A pipeline holds no
/// per-request state and can be shared across requests behind an `Arc`.
pub struct ComparisonPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn TextGenerator>,
    chunker: Arc<dyn Chunker>,
    retriever: Retriever,
    assembler: PromptAssembler,
    cache: Option<Arc<IndexCache>>,
}

impl ComparisonPipeline {
    /// Create a new [`ComparisonPipelineBuilder`].
    pub fn builder() -> ComparisonPipelineBuilder {
        ComparisonPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the generation backend.
    pub fn generator(&self) -> &Arc<dyn TextGenerator> {
        &self.generator
    }

    /// Chunk and embed `reference` into a searchable index.
    ///
    /// When an index cache is configured, a reference already indexed under
    /// the same parameters is reused.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyIndex`] if the reference has no text to index.
    /// - [`RagError::EmbeddingError`] if embedding fails.
    pub async fn build_index(&self, reference: &Document) -> Result<Arc<EmbeddingIndex>> {
        if reference.text.trim().is_empty() {
            info!(document.id = %reference.id, "reference document is empty");
            return Err(RagError::EmptyIndex);
        }

        let build = || async move {
            let chunks = self.chunker.chunk(reference);
            if chunks.is_empty() {
                return Err(RagError::EmptyIndex);
            }
            let chunk_count = chunks.len();
            let index =
                EmbeddingIndex::build(self.embedding_provider.as_ref(), chunks, &self.config)
                    .await
                    .map_err(|e| {
                        error!(document.id = %reference.id, error = %e, "index build failed");
                        e
                    })?;
            info!(document.id = %reference.id, chunk_count, "indexed reference document");
            Ok::<_, RagError>(index)
        };

        match &self.cache {
            Some(cache) => {
                let key = fingerprint(
                    &reference.text,
                    &self.config,
                    self.embedding_provider.name(),
                    self.embedding_provider.dimensions(),
                );
                cache.get_or_build(&key, build).await
            }
            None => build().await.map(Arc::new),
        }
    }

    /// Retrieve context for `question` from `index` and assemble the prompt.
    ///
    /// # Errors
    ///
    /// See [`Retriever::retrieve`].
    pub async fn prepare_prompt(&self, index: &EmbeddingIndex, question: &str) -> Result<Prompt> {
        let retrieval = self.retriever.retrieve(index, question).await?;
        let prompt = self.assembler.assemble(
            RETRIEVAL_INSTRUCTION,
            &retrieval,
            question,
            self.config.max_context_chars,
        );
        info!(
            retrieved = retrieval.len(),
            included = prompt.included.len(),
            dropped = prompt.dropped,
            context_chars = prompt.context_chars(),
            "prompt assembled"
        );
        Ok(prompt)
    }

    /// Answer `question` against an existing index, streaming the response.
    ///
    /// # Errors
    ///
    /// - [`RagError::Cancelled`] if `cancel` fires at any point.
    /// - [`RagError::GenerationError`] if the stream cannot be started.
    /// - Retrieval errors from [`ComparisonPipeline::prepare_prompt`].
    pub async fn ask(
        &self,
        index: &EmbeddingIndex,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        let prompt = until_cancelled(cancel, self.prepare_prompt(index, question)).await?;
        let stream = until_cancelled(cancel, self.generator.generate_stream(&prompt.text()))
            .await
            .map_err(|e| {
                error!(generator = self.generator.name(), error = %e, "failed to start generation");
                e
            })?;
        let answer = accumulate(stream, cancel).await?;
        info!(status = ?answer.status, deltas = answer.deltas, "answer finished");
        Ok(answer)
    }

    /// Review `primary` against the reference corpus `reference`.
    ///
    /// The question is the legal review request followed by the primary
    /// document text, and the same text is used as the retrieval query.
    ///
    /// # Errors
    ///
    /// - [`RagError::Validation`] if the primary document has no text.
    /// - [`RagError::EmptyIndex`] if the reference has no text.
    /// - [`RagError::Cancelled`] if `cancel` fires.
    /// - Embedding and generation errors from the collaborators.
    #[instrument(skip_all, fields(primary = %primary.id, reference = %reference.id))]
    pub async fn analyze(
        &self,
        primary: &Document,
        reference: &Document,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        if primary.text.trim().is_empty() {
            return Err(RagError::Validation(format!(
                "document '{}' contains no text to analyze",
                primary.id
            )));
        }

        let index = until_cancelled(cancel, self.build_index(reference)).await?;
        self.ask(&index, &legal_review_question(&primary.text), cancel).await
    }

    /// Compare two whole documents in one batch request, without retrieval.
    ///
    /// # Errors
    ///
    /// - [`RagError::Validation`] if either document has no text.
    /// - [`RagError::Cancelled`] if `cancel` fires before the answer arrives.
    /// - [`RagError::GenerationError`] if the backend fails.
    #[instrument(skip_all, fields(primary = %primary.id, secondary = %secondary.id))]
    pub async fn compare(
        &self,
        primary: &Document,
        secondary: &Document,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        until_cancelled(
            cancel,
            compare_documents(self.generator.as_ref(), &primary.text, &secondary.text),
        )
        .await
    }
}

/// Run `fut` unless `cancel` fires first.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RagError::Cancelled),
        result = fut => result,
    }
}

/// Builder for constructing a [`ComparisonPipeline`].
///
/// `config`, `embedding_provider` and `generator` are required. The chunker
/// defaults to an [`OverlappingChunker`] using the configured size and
/// overlap, and an [`IndexCache`] is created when
/// `config.index_cache_capacity` is non-zero and none was supplied.
#[derive(Default)]
pub struct ComparisonPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn TextGenerator>>,
    chunker: Option<Arc<dyn Chunker>>,
    assembler: Option<PromptAssembler>,
    cache: Option<Arc<IndexCache>>,
}

impl ComparisonPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generation backend.
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace the default chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Replace the default prompt assembler.
    pub fn assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = Some(assembler);
        self
    }

    /// Share an index cache, for example between several pipelines.
    pub fn cache(mut self, cache: Arc<IndexCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the [`ComparisonPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<ComparisonPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::ConfigError("generator is required".to_string()))?;

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(OverlappingChunker::from_config(&config)?),
        };
        let cache = self.cache.or_else(|| {
            (config.index_cache_capacity > 0)
                .then(|| Arc::new(IndexCache::new(config.index_cache_capacity)))
        });
        let retriever = Retriever::from_config(Arc::clone(&embedding_provider), &config);

        Ok(ComparisonPipeline {
            config,
            embedding_provider,
            generator,
            chunker,
            retriever,
            assembler: self.assembler.unwrap_or_default(),
            cache,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashingEmbeddingProvider;
    use crate::mock::ScriptedGenerator;

    fn pipeline(generator: ScriptedGenerator) -> ComparisonPipeline {
        ComparisonPipeline::builder()
            .config(RagConfig::default())
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(64)))
            .generator(Arc::new(generator))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_generator() {
        let result = ComparisonPipeline::builder()
            .config(RagConfig::default())
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(64)))
            .build();
        assert!(matches!(result, Err(RagError::ConfigError(msg)) if msg.contains("generator")));
    }

    #[tokio::test]
    async fn empty_reference_fails_fast() {
        let pipeline = pipeline(ScriptedGenerator::new(["unused"]));
        let err = pipeline
            .analyze(
                &Document::new("contract", "Rent is due monthly."),
                &Document::new("law", "   "),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmptyIndex));
    }

    #[tokio::test]
    async fn empty_primary_is_validation() {
        let pipeline = pipeline(ScriptedGenerator::new(["unused"]));
        let err = pipeline
            .analyze(
                &Document::new("contract", ""),
                &Document::new("law", "Tenants may terminate."),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn analyze_streams_answer() {
        let pipeline = pipeline(ScriptedGenerator::new(["Looks ", "fine."]));
        let answer = pipeline
            .analyze(
                &Document::new("contract", "The tenant pays rent monthly."),
                &Document::new("law", "Rent must be paid on time. Deposits are capped."),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(answer.text, "Looks fine.");
        assert!(answer.is_complete());
    }

    #[tokio::test]
    async fn cancelled_before_start_does_not_generate() {
        let generator = Arc::new(ScriptedGenerator::new(["x"]));
        let pipeline = ComparisonPipeline::builder()
            .config(RagConfig::default())
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(64)))
            .generator(generator.clone())
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pipeline
            .analyze(&Document::new("a", "text"), &Document::new("b", "text"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
        assert!(generator.prompts().is_empty());
    }
}
