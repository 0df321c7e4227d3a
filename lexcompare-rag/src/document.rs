//! Data types for documents, chunks, and retrieval results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// The container formats a document can be uploaded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
}

impl DocumentKind {
    /// Determine the kind from a filename's extension (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for a missing or unrecognized extension.
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .ok_or_else(|| {
                RagError::Validation(format!("file '{filename}' has no extension"))
            })?;

        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            other => Err(RagError::Validation(format!(
                "unsupported file type '.{other}' for '{filename}'"
            ))),
        }
    }

    /// The canonical file extension for this kind.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A source document containing extracted text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Identifier used as the `source_id` of this document's chunks.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Optional URI or filename pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    /// The container format the text was extracted from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<DocumentKind>,
}

impl Document {
    /// Create a document from an identifier and its text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), source_uri: None, kind: None }
    }

    /// Attach the original source location.
    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    /// Attach the container format.
    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Length of the text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A contiguous, position-tracked segment of a [`Document`].
///
/// Offsets are character positions in the source text; `end_offset` is exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The ID of the parent [`Document`].
    pub source_id: String,
    /// Position of this chunk in the document's chunk sequence.
    pub sequence_index: usize,
    /// First character covered by this chunk.
    pub start_offset: usize,
    /// One past the last character covered by this chunk.
    pub end_offset: usize,
    /// The text content of the chunk.
    pub text: String,
}

impl Chunk {
    /// Unique identifier, formatted as `{source_id}_{sequence_index}`.
    pub fn id(&self) -> String {
        format!("{}_{}", self.source_id, self.sequence_index)
    }

    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Ordered retrieval output: descending by score, no duplicate chunks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    results: Vec<SearchResult>,
}

impl RetrievalResult {
    /// Wrap results that are already ordered.
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self { results }
    }

    /// A result with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of retrieved chunks.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterate in rank order.
    pub fn iter(&self) -> std::slice::Iter<'_, SearchResult> {
        self.results.iter()
    }

    /// Borrow the ranked results.
    pub fn as_slice(&self) -> &[SearchResult] {
        &self.results
    }

    /// Take ownership of the ranked results.
    pub fn into_inner(self) -> Vec<SearchResult> {
        self.results
    }
}

impl IntoIterator for RetrievalResult {
    type Item = SearchResult;
    type IntoIter = std::vec::IntoIter<SearchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a SearchResult;
    type IntoIter = std::slice::Iter<'a, SearchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
