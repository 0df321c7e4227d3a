//! In-process HTTP tests with offline collaborators.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use lexcompare_rag::{
    AnswerStatus, ComparisonPipeline, Document, HashingEmbeddingProvider, RagConfig,
    ScriptedGenerator,
};
use lexcompare_server::error::{CANCELLED_MESSAGE, EMPTY_REFERENCE_MESSAGE};
use lexcompare_server::routes::{run_analysis, run_comparison};
use lexcompare_server::{AppState, router};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const BOUNDARY: &str = "lexcompare-test-boundary";

const REFERENCE: &str = "Article 1. Deposits are capped at three months rent.\n\n\
Article 2. Rent may only be increased once per year.\n\n\
Article 3. Either party may terminate with three months notice.";

fn state_with(generator: Arc<ScriptedGenerator>, timeout: Duration) -> AppState {
    let pipeline = ComparisonPipeline::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(HashingEmbeddingProvider::new(64)))
        .generator(generator)
        .build()
        .unwrap();
    AppState::new(pipeline, CancellationToken::new(), timeout)
}

fn app(generator: Arc<ScriptedGenerator>) -> Router {
    router(state_with(generator, Duration::from_secs(30)), 1024 * 1024)
}

fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    let mut docx = docx_rs::Docx::new();
    for text in paragraphs {
        docx = docx
            .add_paragraph(docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text(*text)));
    }
    let mut buf = std::io::Cursor::new(Vec::new());
    docx.build().pack(&mut buf).unwrap();
    buf.into_inner()
}

/// Build a multipart body from `(field name, filename, content)` parts.
fn multipart(parts: &[(&str, &str, Vec<u8>)]) -> Body {
    let mut body = Vec::new();
    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

async fn post(app: Router, path: &str, parts: &[(&str, &str, Vec<u8>)]) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(multipart(parts))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_ok() {
    let response = app(Arc::new(ScriptedGenerator::new(["x"])))
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_part_is_rejected() {
    let (status, body) = post(
        app(Arc::new(ScriptedGenerator::new(["x"]))),
        "/analyze",
        &[("file1", "lease.docx", docx_bytes(&["Lease"]))],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No file part");
    assert!(body.get("status").is_none());
}

#[tokio::test]
async fn empty_filename_is_rejected() {
    let (status, body) = post(
        app(Arc::new(ScriptedGenerator::new(["x"]))),
        "/analyze",
        &[("file1", "", b"data".to_vec()), ("file2", "law.pdf", b"data".to_vec())],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No selected file");
}

#[tokio::test]
async fn reference_must_be_pdf_in_retrieval_mode() {
    let generator = Arc::new(ScriptedGenerator::new(["x"]));
    let (status, body) = post(
        app(generator.clone()),
        "/analyze",
        &[
            ("file1", "lease.docx", docx_bytes(&["Lease"])),
            ("file2", "law.docx", docx_bytes(&["Law"])),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Invalid file type for file 2. Please upload a PDF file for the reference document."
    );
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn unsupported_primary_type_is_rejected() {
    let (status, body) = post(
        app(Arc::new(ScriptedGenerator::new(["x"]))),
        "/compare",
        &[("file1", "notes.txt", b"text".to_vec()), ("file2", "b.docx", docx_bytes(&["B"]))],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid file type for file 1. Please upload a PDF or DOCX file.");
}

#[tokio::test]
async fn unreadable_reference_is_reported_as_message() {
    let generator = Arc::new(ScriptedGenerator::new(["x"]));
    let (status, body) = post(
        app(generator.clone()),
        "/analyze",
        &[
            ("file1", "lease.docx", docx_bytes(&["Lease"])),
            ("file2", "law.pdf", b"not a pdf".to_vec()),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("law.pdf"));
    assert_eq!(body.as_object().unwrap().len(), 1);
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn compare_returns_batch_answer() {
    let generator = Arc::new(ScriptedGenerator::new(["Similarities: both ", "are leases."]));
    let (status, body) = post(
        app(generator.clone()),
        "/compare",
        &[
            ("file1", "a.docx", docx_bytes(&["Lease A", "Rent 100"])),
            ("file2", "b.docx", docx_bytes(&["Lease B", "Rent 200"])),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Similarities: both are leases.");
    assert_eq!(body["status"], "complete");

    let prompt = &generator.prompts()[0];
    assert!(prompt.contains("Document 1:\nLease A\nRent 100"));
    assert!(prompt.contains("Document 2:\nLease B\nRent 200"));
}

#[tokio::test]
async fn truncated_analysis_keeps_partial_text() {
    let generator = Arc::new(ScriptedGenerator::new(["The deposit ", "clause ", "is fine."]).fail_after(2));
    let state = state_with(generator, Duration::from_secs(30));
    let response = run_analysis(
        &state,
        &Document::new("lease.docx", "The deposit is six months rent."),
        &Document::new("law.pdf", REFERENCE),
    )
    .await
    .unwrap();
    assert_eq!(response.status, Some(AnswerStatus::Truncated));
    assert!(response.message.starts_with("The deposit clause \n\n[The answer was cut short"));
}

#[tokio::test]
async fn empty_reference_has_a_clear_message() {
    let state = state_with(Arc::new(ScriptedGenerator::new(["x"])), Duration::from_secs(30));
    let err = run_analysis(
        &state,
        &Document::new("lease.docx", "The deposit is six months rent."),
        &Document::new("law.pdf", "  \n "),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::OK);
    assert_eq!(err.user_message(), EMPTY_REFERENCE_MESSAGE);
}

#[tokio::test]
async fn request_deadline_cancels_a_stalled_answer() {
    let generator = Arc::new(ScriptedGenerator::new(["Thinking"]).stall());
    let state = state_with(generator.clone(), Duration::from_millis(50));
    let err = run_analysis(
        &state,
        &Document::new("lease.docx", "The deposit is six months rent."),
        &Document::new("law.pdf", REFERENCE),
    )
    .await
    .unwrap_err();
    assert_eq!(err.user_message(), CANCELLED_MESSAGE);
    assert!(generator.stream_dropped());
}

#[tokio::test]
async fn comparison_helper_returns_complete_answer() {
    let state = state_with(Arc::new(ScriptedGenerator::new(["Same terms."])), Duration::from_secs(30));
    let response = run_comparison(
        &state,
        &Document::new("a.docx", "Lease A"),
        &Document::new("b.docx", "Lease B"),
    )
    .await
    .unwrap();
    assert_eq!(response.message, "Same terms.");
    assert_eq!(response.status, Some(AnswerStatus::Complete));
}
