//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`OverlappingChunker`], a
//! sliding-window splitter that keeps exact character offsets so every chunk
//! can be traced back to its span in the source text.

use crate::config::{RagConfig, validate_chunking};
use crate::document::{Chunk, Document};
use crate::error::Result;

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into overlapping windows measured in characters.
///
/// Each window is at most `chunk_size` characters long. The next window
/// starts exactly `chunk_overlap` characters before the previous one ended,
/// so stripping the first `chunk_overlap` characters from every chunk after
/// the first and concatenating reproduces the source text.
///
/// When a paragraph break (`\n\n`) or a sentence end (`.`, `!` or `?` followed
/// by whitespace) falls within the last tenth of a window, the window is cut
/// there instead of at the hard limit.
///
/// # Example
///
/// ```rust
/// use lexcompare_rag::{Chunker, Document, OverlappingChunker};
///
/// let chunker = OverlappingChunker::new(1000, 200).unwrap();
/// let chunks = chunker.chunk(&Document::new("ref", "x".repeat(2500)));
/// assert_eq!(chunks.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct OverlappingChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl OverlappingChunker {
    /// Create a new `OverlappingChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`](crate::RagError::ConfigError) if
    /// `chunk_size` is zero or `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_chunking(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Create a chunker from the chunking fields of a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Window length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared by adjacent windows.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Chunker for OverlappingChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        split_windows(&document.id, &document.text, self.chunk_size, self.chunk_overlap)
    }
}

/// Split `text` into overlapping chunks attributed to `source_id`.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`](crate::RagError::ConfigError) if
/// `chunk_size` is zero or `chunk_overlap >= chunk_size`.
pub fn chunk_text(
    source_id: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    validate_chunking(chunk_size, chunk_overlap)?;
    Ok(split_windows(source_id, text, chunk_size, chunk_overlap))
}

/// Caller guarantees `0 <= chunk_overlap < chunk_size`.
fn split_windows(
    source_id: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    // byte_at[i] is the byte offset of character i; the extra entry maps len → text.len().
    let byte_at: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let len = chars.len();
    let lookback = (chunk_size / 10).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let target_end = start + chunk_size;
        let end = if target_end >= len {
            len
        } else {
            find_boundary(&chars, start + chunk_overlap, target_end, lookback)
                .unwrap_or(target_end)
        };

        chunks.push(Chunk {
            source_id: source_id.to_string(),
            sequence_index: chunks.len(),
            start_offset: start,
            end_offset: end,
            text: text[byte_at[start]..byte_at[end]].to_string(),
        });

        if end == len {
            break;
        }
        start = end - chunk_overlap;
    }

    chunks
}

/// Find the latest natural cut point in `[target_end - lookback, target_end]`
/// that lies strictly after `floor`. Paragraph breaks win over sentence ends.
fn find_boundary(chars: &[char], floor: usize, target_end: usize, lookback: usize) -> Option<usize> {
    let lowest = target_end.saturating_sub(lookback).max(floor + 1).max(2);
    if lowest > target_end {
        return None;
    }

    let is_paragraph_break = |p: usize| chars[p - 1] == '\n' && chars[p - 2] == '\n';
    let is_sentence_end =
        |p: usize| chars[p - 1].is_whitespace() && matches!(chars[p - 2], '.' | '!' | '?');

    (lowest..=target_end)
        .rev()
        .find(|&p| is_paragraph_break(p))
        .or_else(|| (lowest..=target_end).rev().find(|&p| is_sentence_end(p)))
}
