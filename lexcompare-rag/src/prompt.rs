//! Prompt assembly under a context budget.
//!
//! Retrieved chunks are packed in rank order into a context block of at most
//! `max_context_chars` characters. A chunk is included whole or not at all,
//! and once one chunk does not fit every lower-ranked chunk is dropped too.

use std::fmt;

use serde::Serialize;

use crate::document::RetrievalResult;

/// Separator placed between annotated chunks in the context block.
pub const DEFAULT_DELIMITER: &str = "\n\n---\n\n";

/// Rendered in place of the context block when no chunk was included.
pub const NO_CONTEXT_MARKER: &str = "(No reference context was available for this request.)";

/// Wraps retrieved context around the question for the retrieval mode.
pub const RETRIEVAL_INSTRUCTION: &str = "You are an assistant for question-answering tasks. \
Use the reference context above to answer the question below. Each context passage is \
labelled with its source and character span; cite those labels when you rely on a passage. \
If the context does not contain what you need, say so rather than guessing.";

/// The legal review request sent as the question in retrieval mode.
pub const LEGAL_REVIEW_QUESTION: &str = "As an experienced legal expert, analyze the following \
legal document and determine whether the information it presents makes sense in a legal \
context, in comparison to the reference context. Check for missing important sections and for \
terms or sections that raise suspicion or may be legally problematic.\n\
Highlight the main parts in important bullet points and refer to specific pages and paragraphs \
of the document.\n\
Work through this step by step to be sure the answer is right.";

/// The retrieval-mode question for a primary document: the legal review
/// request followed by the document text.
pub fn legal_review_question(document_text: &str) -> String {
    format!("{LEGAL_REVIEW_QUESTION}\n\nDocument:\n{document_text}")
}

/// An assembled prompt, kept in parts so callers can inspect what was included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    /// Annotated chunks joined by the delimiter. Empty if nothing fit.
    pub context: String,
    /// Instruction placed after the context block.
    pub instruction: String,
    /// The question placed last.
    pub question: String,
    /// Ids of the chunks in the context block, in rank order.
    pub included: Vec<String>,
    /// Number of retrieved chunks left out because of the budget.
    pub dropped: usize,
}

impl Prompt {
    /// Character length of the context block.
    pub fn context_chars(&self) -> usize {
        self.context.chars().count()
    }

    /// The full prompt text sent to the model.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let context = if self.context.is_empty() { NO_CONTEXT_MARKER } else { &self.context };
        write!(f, "Context:\n{context}\n\n{}\n\nQuestion:\n{}", self.instruction, self.question)
    }
}

/// Packs retrieval results into a bounded [`Prompt`].
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    delimiter: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self { delimiter: DEFAULT_DELIMITER.to_string() }
    }
}

impl PromptAssembler {
    /// Create an assembler using [`DEFAULT_DELIMITER`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different separator between chunks.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Assemble `instruction_template`, the retrieved chunks, and `question`.
    ///
    /// The context block, annotations and delimiters included, never exceeds
    /// `max_context_chars` characters.
    pub fn assemble(
        &self,
        instruction_template: &str,
        retrieval: &RetrievalResult,
        question: &str,
        max_context_chars: usize,
    ) -> Prompt {
        let delimiter_chars = self.delimiter.chars().count();
        let mut context = String::new();
        let mut used = 0usize;
        let mut included = Vec::new();

        for result in retrieval {
            let chunk = &result.chunk;
            let block = format!(
                "[{} chars {}-{}]\n{}",
                chunk.source_id, chunk.start_offset, chunk.end_offset, chunk.text
            );
            let separator = if included.is_empty() { 0 } else { delimiter_chars };
            let needed = separator + block.chars().count();
            if used + needed > max_context_chars {
                break;
            }

            if separator > 0 {
                context.push_str(&self.delimiter);
            }
            context.push_str(&block);
            used += needed;
            included.push(chunk.id());
        }

        let dropped = retrieval.len() - included.len();
        if dropped > 0 {
            tracing::debug!(
                included = included.len(),
                dropped,
                max_context_chars,
                "context budget reached"
            );
        }

        Prompt {
            context,
            instruction: instruction_template.to_string(),
            question: question.to_string(),
            included,
            dropped,
        }
    }
}
