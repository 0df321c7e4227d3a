//! Plain-text extraction from uploaded PDF and DOCX files.

use axum::body::Bytes;
use lexcompare_rag::{DocumentKind, RagError, Result};
use tracing::{debug, warn};

/// Extract text from `bytes` on the blocking pool.
///
/// # Errors
///
/// Returns [`RagError::Extraction`] if the container cannot be parsed or
/// contains no text, and [`RagError::PipelineError`] if the blocking task
/// is lost.
pub async fn extract_text(kind: DocumentKind, filename: &str, bytes: Bytes) -> Result<String> {
    let name = filename.to_string();
    tokio::task::spawn_blocking(move || extract_blocking(kind, &name, &bytes))
        .await
        .map_err(|e| RagError::PipelineError(format!("extracting {filename} failed: {e}")))?
}

/// Extract text synchronously.
///
/// # Errors
///
/// See [`extract_text`].
pub fn extract_blocking(kind: DocumentKind, filename: &str, bytes: &[u8]) -> Result<String> {
    let text = match kind {
        DocumentKind::Pdf => pdf_text(filename, bytes)?,
        DocumentKind::Docx => docx_text(filename, bytes)?,
    };

    if text.trim().is_empty() {
        warn!(filename, %kind, "document contains no extractable text");
        return Err(RagError::extraction(filename, "the document contains no extractable text"));
    }

    debug!(filename, %kind, bytes = bytes.len(), chars = text.chars().count(), "extracted text");
    Ok(text)
}

fn pdf_text(filename: &str, bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RagError::extraction(filename, format!("unreadable PDF: {e}")))
}

/// Paragraph texts joined with newlines. Tables and other block content are skipped.
fn docx_text(filename: &str, bytes: &[u8]) -> Result<String> {
    let docx = docx_rs::read_docx(bytes)
        .map_err(|e| RagError::extraction(filename, format!("unreadable DOCX: {e}")))?;

    let mut paragraphs = Vec::new();
    for child in docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            let mut text = String::new();
            for child in paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            paragraphs.push(text);
        }
    }
    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
        let mut docx = docx_rs::Docx::new();
        for text in paragraphs {
            docx = docx.add_paragraph(
                docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text(*text)),
            );
        }
        let mut buf = std::io::Cursor::new(Vec::new());
        docx.build().pack(&mut buf).unwrap();
        buf.into_inner()
    }

    #[test]
    fn docx_paragraphs_are_joined_by_newlines() {
        let bytes = docx_bytes(&["Article 1.", "The tenant pays rent."]);
        let text = extract_blocking(DocumentKind::Docx, "lease.docx", &bytes).unwrap();
        assert_eq!(text, "Article 1.\nThe tenant pays rent.");
    }

    #[test]
    fn empty_docx_is_an_extraction_error() {
        let bytes = docx_bytes(&["", "  "]);
        let err = extract_blocking(DocumentKind::Docx, "blank.docx", &bytes).unwrap_err();
        assert!(matches!(err, RagError::Extraction { source_name, .. } if source_name == "blank.docx"));
    }

    #[test]
    fn garbage_pdf_is_an_extraction_error() {
        let err = extract_blocking(DocumentKind::Pdf, "law.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, RagError::Extraction { .. }));
    }

    #[tokio::test]
    async fn extraction_runs_off_the_async_thread() {
        let bytes = Bytes::from(docx_bytes(&["Clause"]));
        let text = extract_text(DocumentKind::Docx, "a.docx", bytes).await.unwrap();
        assert_eq!(text, "Clause");
    }
}
