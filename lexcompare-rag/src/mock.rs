//! Scripted generation backend for tests and offline runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{StreamExt, stream};

use crate::error::{RagError, Result};
use crate::generation::{DeltaStream, TextGenerator};

/// Replays a fixed list of deltas for every prompt.
///
/// The script can fail after a given number of deltas, fail before starting,
/// or stall forever after the last delta so cancellation can be exercised.
///
/// ```rust
/// use lexcompare_rag::ScriptedGenerator;
///
/// let generator = ScriptedGenerator::new(["The ", "answer."]).fail_after(1);
/// assert_eq!(generator.script_len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    deltas: Vec<String>,
    fail_after: Option<usize>,
    fail_on_start: bool,
    stall: bool,
    prompts: Mutex<Vec<String>>,
    streams_started: AtomicUsize,
    stream_dropped: Arc<AtomicBool>,
}

impl ScriptedGenerator {
    /// Create a generator that replays `deltas` in order.
    pub fn new<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { deltas: deltas.into_iter().map(Into::into).collect(), ..Self::default() }
    }

    /// Yield `n` deltas, then a [`RagError::StreamInterrupted`].
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Fail every request with a [`RagError::GenerationError`] before any output.
    pub fn fail_on_start(mut self) -> Self {
        self.fail_on_start = true;
        self
    }

    /// Never end the stream after the scripted deltas.
    pub fn stall(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Number of scripted deltas.
    pub fn script_len(&self) -> usize {
        self.deltas.len()
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Number of streams handed out.
    pub fn streams_started(&self) -> usize {
        self.streams_started.load(Ordering::SeqCst)
    }

    /// Whether the most recent stream has been dropped by its consumer.
    pub fn stream_dropped(&self) -> bool {
        self.stream_dropped.load(Ordering::SeqCst)
    }

    fn record(&self, prompt: &str) -> Result<()> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if self.fail_on_start {
            return Err(RagError::generation(self.name(), "scripted failure before start"));
        }
        Ok(())
    }

    fn scripted_items(&self) -> Vec<Result<String>> {
        match self.fail_after {
            Some(n) => {
                let mut items: Vec<Result<String>> =
                    self.deltas.iter().take(n).cloned().map(Ok).collect();
                items.push(Err(RagError::StreamInterrupted(format!(
                    "scripted failure after {} deltas",
                    items.len()
                ))));
                items
            }
            None => self.deltas.iter().cloned().map(Ok).collect(),
        }
    }
}

/// Sets the shared flag when the stream holding it is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.record(prompt)?;
        let mut text = String::new();
        for item in self.scripted_items() {
            match item {
                Ok(delta) => text.push_str(&delta),
                Err(e) => return Err(RagError::generation(self.name(), e.to_string())),
            }
        }
        Ok(text)
    }

    async fn generate_stream(&self, prompt: &str) -> Result<DeltaStream> {
        self.record(prompt)?;
        self.streams_started.fetch_add(1, Ordering::SeqCst);
        self.stream_dropped.store(false, Ordering::SeqCst);

        let flag = DropFlag(Arc::clone(&self.stream_dropped));
        let items = stream::iter(self.scripted_items()).map(move |item| {
            let _held = &flag;
            item
        });

        if self.stall && self.fail_after.is_none() {
            Ok(Box::pin(items.chain(stream::pending())))
        } else {
            Ok(Box::pin(items))
        }
    }

    fn name(&self) -> &str {
        "Scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batch_concatenates_script() {
        let generator = ScriptedGenerator::new(["a", "b", "c"]);
        assert_eq!(generator.generate("p").await.unwrap(), "abc");
        assert_eq!(generator.prompts(), vec!["p".to_string()]);
    }

    #[tokio::test]
    async fn batch_with_failure_is_generation_error() {
        let generator = ScriptedGenerator::new(["a", "b"]).fail_after(1);
        assert!(matches!(generator.generate("p").await, Err(RagError::GenerationError { .. })));
    }

    #[tokio::test]
    async fn stream_fails_after_n() {
        let generator = ScriptedGenerator::new(["a", "b", "c"]).fail_after(2);
        let items: Vec<_> = generator.generate_stream("p").await.unwrap().collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[2].is_err());
    }

    #[tokio::test]
    async fn dropping_stream_sets_flag() {
        let generator = ScriptedGenerator::new(["a"]);
        let stream = generator.generate_stream("p").await.unwrap();
        assert!(!generator.stream_dropped());
        drop(stream);
        assert!(generator.stream_dropped());
    }

    #[tokio::test]
    async fn fail_on_start_rejects_request() {
        let generator = ScriptedGenerator::new(["a"]).fail_on_start();
        assert!(generator.generate_stream("p").await.is_err());
        assert_eq!(generator.streams_started(), 0);
    }
}
