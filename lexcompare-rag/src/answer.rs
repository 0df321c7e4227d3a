//! Streamed answer accumulation with cooperative cancellation.
//!
//! [`AnswerAccumulator::consume`] drains a [`DeltaStream`] in arrival order.
//! The accumulator is consumed when it produces an [`Answer`], so an answer
//! is finalized exactly once. The stream is owned by `consume` and dropped
//! on every exit path, which closes the underlying connection.

use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RagError, Result};
use crate::generation::DeltaStream;

/// How a streamed answer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    /// The stream ended normally.
    Complete,
    /// The stream failed after producing some text; the text is partial.
    Truncated,
    /// The stream failed before producing any text.
    Failed,
}

/// The final result of a generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Concatenation of every received delta, in arrival order.
    pub text: String,
    /// How the stream ended.
    pub status: AnswerStatus,
    /// Description of the failure for `Truncated` and `Failed` answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of deltas received.
    pub deltas: usize,
}

impl Answer {
    /// An answer produced by a single batch call.
    pub fn complete(text: impl Into<String>) -> Self {
        Self { text: text.into(), status: AnswerStatus::Complete, error: None, deltas: 1 }
    }

    /// Whether the stream ended normally.
    pub fn is_complete(&self) -> bool {
        self.status == AnswerStatus::Complete
    }
}

/// Mutable buffer for streamed text.
#[derive(Debug, Default)]
pub struct AnswerAccumulator {
    buffer: String,
    deltas: usize,
}

impl AnswerAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one delta.
    pub fn push(&mut self, delta: &str) {
        self.buffer.push_str(delta);
        self.deltas += 1;
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Number of deltas received so far.
    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    /// Finalize as a complete answer.
    pub fn complete(self) -> Answer {
        Answer {
            text: self.buffer,
            status: AnswerStatus::Complete,
            error: None,
            deltas: self.deltas,
        }
    }

    /// Finalize after a stream failure, keeping whatever was received.
    pub fn interrupt(self, error: &RagError) -> Answer {
        let status =
            if self.deltas == 0 { AnswerStatus::Failed } else { AnswerStatus::Truncated };
        Answer { text: self.buffer, status, error: Some(error.to_string()), deltas: self.deltas }
    }

    /// Drain `stream` until it ends, fails, or `cancel` fires.
    ///
    /// The token is checked before every delta and raced against each
    /// pending `next()`, so cancellation takes effect without waiting for
    /// the model to send more text.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Cancelled`] if `cancel` fires. The partial buffer
    /// is discarded in that case. Stream failures are not errors: they
    /// produce a `Truncated` or `Failed` [`Answer`].
    pub async fn consume(
        mut self,
        mut stream: DeltaStream,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(deltas = self.deltas, "answer stream cancelled, discarding buffer");
                    return Err(RagError::Cancelled);
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(delta)) => self.push(&delta),
                Some(Err(e)) => {
                    warn!(deltas = self.deltas, error = %e, "answer stream interrupted");
                    return Ok(self.interrupt(&e));
                }
                None => {
                    debug!(deltas = self.deltas, chars = self.buffer.len(), "answer stream finished");
                    return Ok(self.complete());
                }
            }
        }
    }
}

/// Accumulate a whole stream into an [`Answer`].
///
/// # Errors
///
/// See [`AnswerAccumulator::consume`].
pub async fn accumulate(stream: DeltaStream, cancel: &CancellationToken) -> Result<Answer> {
    AnswerAccumulator::new().consume(stream, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn deltas(items: Vec<Result<String>>) -> DeltaStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn concatenates_in_order() {
        let stream = deltas(vec![Ok("The ".into()), Ok("lease ".into()), Ok("ends.".into())]);
        let answer = accumulate(stream, &CancellationToken::new()).await.unwrap();
        assert_eq!(answer.text, "The lease ends.");
        assert_eq!(answer.status, AnswerStatus::Complete);
        assert_eq!(answer.deltas, 3);
    }

    #[tokio::test]
    async fn failure_after_text_is_truncated() {
        let stream = deltas(vec![
            Ok("a".into()),
            Ok("b".into()),
            Err(RagError::StreamInterrupted("connection reset".into())),
            Ok("never".into()),
        ]);
        let answer = accumulate(stream, &CancellationToken::new()).await.unwrap();
        assert_eq!(answer.text, "ab");
        assert_eq!(answer.status, AnswerStatus::Truncated);
        assert!(answer.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn failure_before_text_is_failed() {
        let stream = deltas(vec![Err(RagError::StreamInterrupted("boom".into()))]);
        let answer = accumulate(stream, &CancellationToken::new()).await.unwrap();
        assert_eq!(answer.status, AnswerStatus::Failed);
        assert!(answer.text.is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_delta() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream = deltas(vec![Ok("ignored".into())]);
        assert!(matches!(accumulate(stream, &cancel).await, Err(RagError::Cancelled)));
    }

    #[tokio::test]
    async fn empty_stream_is_complete_and_empty() {
        let answer = accumulate(deltas(vec![]), &CancellationToken::new()).await.unwrap();
        assert!(answer.is_complete());
        assert!(answer.text.is_empty());
    }
}
