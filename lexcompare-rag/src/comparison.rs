//! Whole-document comparison without retrieval.
//!
//! Both texts go into a single prompt with a fixed instruction and are sent
//! as one batch request. Nothing is chunked or embedded.

use tracing::{info, instrument};

use crate::answer::Answer;
use crate::error::{RagError, Result};
use crate::generation::TextGenerator;

/// Instruction prepended to both documents in comparison mode.
pub const COMPARISON_INSTRUCTION: &str = "As an experienced legal expert, analyze and compare \
the two legal documents below. Focus on the similarities and differences in their legal \
substance.\n\
Present the similarities and the differences as bullet points ordered by importance. \
Highlight the key part of each important bullet and refer to specific pages and paragraphs \
where the documents mention them. Point out any term or section that appears in one document \
but not in the other.\n\
Similarities:\n\
Bullet points describing the similarities, most important first, with page and paragraph \
references where available.\n\
Differences:\n\
Bullet points describing the differences, most important first, with page and paragraph \
references where available. For each difference, say whether it follows from the core purpose \
of the two documents or whether it makes the term or section in one of them look suspicious \
or legally problematic.\n\
Conclusion:\n\
Summarize the analysis.\n\
Work through this step by step to be sure the answer is right.";

/// Build the comparison prompt for two document texts.
pub fn comparison_prompt(primary: &str, secondary: &str) -> String {
    format!("{COMPARISON_INSTRUCTION}\n\nDocument 1:\n{primary}\n\nDocument 2:\n{secondary}")
}

/// Compare two document texts with a single batch generation call.
///
/// # Errors
///
/// - [`RagError::Validation`] if either text is empty after trimming.
/// - [`RagError::GenerationError`] if the backend fails.
#[instrument(skip_all, fields(
    generator = generator.name(),
    primary_chars = tracing::field::Empty,
    secondary_chars = tracing::field::Empty,
))]
pub async fn compare_documents(
    generator: &dyn TextGenerator,
    primary: &str,
    secondary: &str,
) -> Result<Answer> {
    if primary.trim().is_empty() || secondary.trim().is_empty() {
        return Err(RagError::Validation(
            "both documents must contain text to be compared".to_string(),
        ));
    }

    let span = tracing::Span::current();
    span.record("primary_chars", primary.chars().count());
    span.record("secondary_chars", secondary.chars().count());

    let text = generator.generate(&comparison_prompt(primary, secondary)).await?;
    info!(answer_chars = text.chars().count(), "comparison completed");
    Ok(Answer::complete(text))
}
