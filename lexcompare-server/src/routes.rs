//! HTTP routes.
//!
//! - `POST /analyze`: review `file1` against the reference corpus `file2`.
//! - `POST /compare`: compare `file1` and `file2` side by side.
//! - `GET /health`: liveness probe.

use std::future::Future;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
};
use lexcompare_rag::{Answer, AnswerStatus, Document, DocumentKind};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::error::{ServerError, ServerResult};
use crate::extract::extract_text;
use crate::state::AppState;

/// Body of every analysis response.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MessageResponse {
    /// The answer, or a description of what went wrong.
    pub message: String,
    /// How the model's answer ended, when one was produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AnswerStatus>,
}

impl MessageResponse {
    /// A plain message with no answer status.
    pub fn message(message: impl Into<String>) -> Self {
        Self { message: message.into(), status: None }
    }

    /// Render an answer. Partial answers carry a notice so they are not
    /// mistaken for complete ones.
    pub fn from_answer(answer: Answer) -> Self {
        let error = answer.error.unwrap_or_default();
        let message = match answer.status {
            AnswerStatus::Complete => answer.text,
            AnswerStatus::Truncated => {
                format!("{}\n\n[The answer was cut short: {error}]", answer.text)
            }
            AnswerStatus::Failed => format!("The model did not produce an answer: {error}"),
        };
        Self { message, status: Some(answer.status) }
    }
}

/// Accepted types and rejection message for one upload slot.
struct SlotRule {
    kinds: &'static [DocumentKind],
    rejection: &'static str,
}

const ANALYZE_RULES: [SlotRule; 2] = [
    SlotRule {
        kinds: &[DocumentKind::Pdf, DocumentKind::Docx],
        rejection: "Invalid file type for file 1. Please upload a PDF or DOCX file for your legal document.",
    },
    SlotRule {
        kinds: &[DocumentKind::Pdf],
        rejection: "Invalid file type for file 2. Please upload a PDF file for the reference document.",
    },
];

const COMPARE_RULES: [SlotRule; 2] = [
    SlotRule {
        kinds: &[DocumentKind::Pdf, DocumentKind::Docx],
        rejection: "Invalid file type for file 1. Please upload a PDF or DOCX file.",
    },
    SlotRule {
        kinds: &[DocumentKind::Pdf, DocumentKind::Docx],
        rejection: "Invalid file type for file 2. Please upload a PDF or DOCX file.",
    },
];

struct Upload {
    filename: String,
    bytes: Bytes,
}

/// Build the application router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/compare", post(compare))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /analyze
async fn analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ServerResult<Json<MessageResponse>> {
    let (primary, reference) = load_pair(multipart, &ANALYZE_RULES).await?;
    run_analysis(&state, &primary, &reference).await.map(Json)
}

/// POST /compare
async fn compare(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ServerResult<Json<MessageResponse>> {
    let (primary, secondary) = load_pair(multipart, &COMPARE_RULES).await?;
    run_comparison(&state, &primary, &secondary).await.map(Json)
}

/// Run retrieval-mode analysis under the request deadline.
///
/// # Errors
///
/// Returns the pipeline error, including [`RagError::Cancelled`](lexcompare_rag::RagError::Cancelled)
/// when the deadline or shutdown interrupts the analysis.
pub async fn run_analysis(
    state: &AppState,
    primary: &Document,
    reference: &Document,
) -> ServerResult<MessageResponse> {
    let cancel = state.request_token();
    let answer = with_deadline(
        &cancel,
        state.request_timeout(),
        state.pipeline().analyze(primary, reference, &cancel),
    )
    .await?;
    info!(primary = %primary.id, reference = %reference.id, status = ?answer.status, "analysis finished");
    Ok(MessageResponse::from_answer(answer))
}

/// Run comparison mode under the request deadline.
///
/// # Errors
///
/// See [`run_analysis`].
pub async fn run_comparison(
    state: &AppState,
    primary: &Document,
    secondary: &Document,
) -> ServerResult<MessageResponse> {
    let cancel = state.request_token();
    let answer = with_deadline(
        &cancel,
        state.request_timeout(),
        state.pipeline().compare(primary, secondary, &cancel),
    )
    .await?;
    info!(primary = %primary.id, secondary = %secondary.id, "comparison finished");
    Ok(MessageResponse::from_answer(answer))
}

/// Drive `work` to completion, cancelling `cancel` once `timeout` elapses.
///
/// `work` observes the token itself, so it still returns normally after
/// the deadline (typically with `Cancelled`).
async fn with_deadline<T>(
    cancel: &CancellationToken,
    timeout: Duration,
    work: impl Future<Output = T>,
) -> T {
    tokio::pin!(work);
    tokio::select! {
        out = &mut work => out,
        () = tokio::time::sleep(timeout) => {
            warn!(timeout_secs = timeout.as_secs_f64(), "request deadline reached");
            cancel.cancel();
            work.await
        }
    }
}

/// Read both uploads, validate them against `rules`, and extract their text.
async fn load_pair(
    multipart: Multipart,
    rules: &[SlotRule; 2],
) -> ServerResult<(Document, Document)> {
    let (file1, file2) = read_uploads(multipart).await?;
    let (Some(file1), Some(file2)) = (file1, file2) else {
        return Err(ServerError::validation("No file part"));
    };
    if file1.filename.is_empty() || file2.filename.is_empty() {
        return Err(ServerError::validation("No selected file"));
    }

    let kind1 = check_kind(&file1.filename, &rules[0])?;
    let kind2 = check_kind(&file2.filename, &rules[1])?;

    let (text1, text2) = tokio::try_join!(
        extract_text(kind1, &file1.filename, file1.bytes),
        extract_text(kind2, &file2.filename, file2.bytes),
    )?;

    Ok((
        Document::new(file1.filename, text1).with_kind(kind1),
        Document::new(file2.filename, text2).with_kind(kind2),
    ))
}

fn check_kind(filename: &str, rule: &SlotRule) -> ServerResult<DocumentKind> {
    DocumentKind::from_filename(filename)
        .ok()
        .filter(|kind| rule.kinds.contains(kind))
        .ok_or_else(|| ServerError::validation(rule.rejection))
}

async fn read_uploads(mut multipart: Multipart) -> ServerResult<(Option<Upload>, Option<Upload>)> {
    let mut file1 = None;
    let mut file2 = None;

    while let Some(field) =
        multipart.next_field().await.map_err(|e| ServerError::Multipart(e.to_string()))?
    {
        let slot = match field.name() {
            Some("file1") => &mut file1,
            Some("file2") => &mut file2,
            _ => continue,
        };
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| ServerError::Multipart(e.to_string()))?;
        *slot = Some(Upload { filename, bytes });
    }

    Ok((file1, file2))
}
