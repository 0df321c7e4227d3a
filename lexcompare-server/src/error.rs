//! Error types for the HTTP service.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lexcompare_rag::RagError;
use thiserror::Error;

use crate::routes::MessageResponse;

/// Shown when the reference document yields no chunks.
pub const EMPTY_REFERENCE_MESSAGE: &str =
    "The reference document contains no extractable text to compare against.";

/// Shown when an analysis is cancelled by shutdown or the request deadline.
pub const CANCELLED_MESSAGE: &str = "The analysis was cancelled before it finished.";

/// Result type alias for server operations.
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Errors surfaced by request handlers.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A pipeline error, including input validation.
    #[error(transparent)]
    Rag(#[from] RagError),

    /// The multipart body could not be read.
    #[error("Failed to read upload: {0}")]
    Multipart(String),
}

impl ServerError {
    /// Shorthand for a [`RagError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Rag(RagError::Validation(message.into()))
    }

    /// HTTP status for this error. Only bad input is reported as a client error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Rag(RagError::Validation(_)) | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::OK,
        }
    }

    /// The message returned to the client.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rag(RagError::Validation(message)) => message.clone(),
            Self::Rag(RagError::EmptyIndex) => EMPTY_REFERENCE_MESSAGE.to_string(),
            Self::Rag(RagError::Cancelled) => CANCELLED_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() {
            tracing::debug!(error = %self, "rejected request");
        } else {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(MessageResponse::message(self.user_message()))).into_response()
    }
}
