//! Text generation backend trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;

/// A lazy, single-pass stream of text deltas.
///
/// Dropping the stream releases the underlying connection.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A model that turns a prompt into text.
///
/// Constructed once from configuration and passed to the pipeline; there is
/// no process-wide model handle.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate the full response in one request.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Start a streamed generation.
    ///
    /// Errors returned here mean the request never started. Errors yielded by
    /// the stream mean it failed part-way through.
    async fn generate_stream(&self, prompt: &str) -> Result<DeltaStream>;

    /// Short backend name used in errors and logs.
    fn name(&self) -> &str {
        "generator"
    }
}
