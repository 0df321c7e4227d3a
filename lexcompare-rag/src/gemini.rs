//! Gemini embedding and generation backends over the REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{DeltaStream, TextGenerator};

/// Public Gemini API endpoint.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/text-embedding-004";

/// Default generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "models/gemini-2.5-flash";

const PROVIDER: &str = "Gemini";

/// HTTP plumbing shared by both backends.
#[derive(Clone)]
struct GeminiHttp {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiHttp {
    fn new(api_key: impl Into<String>, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            model: model_path(model),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}:{method}", self.base_url.trim_end_matches('/'), self.model)
    }

    /// POST `body` to `url` and return the response if the status is a success.
    ///
    /// Errors are returned as plain messages so each backend can wrap them
    /// in its own error variant.
    async fn post<B: Serialize>(&self, url: &str, body: &B) -> std::result::Result<reqwest::Response, String> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(provider = PROVIDER, %status, "API error");
            return Err(format!("API returned {status}: {detail}"));
        }

        Ok(response)
    }
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") { model.to_string() } else { format!("models/{model}") }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize, Deserialize, Clone, Debug)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn user_text(text: &str) -> Self {
        Self { role: Some("user".to_string()), parts: vec![Part { text: text.to_string() }] }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content,
    task_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct BatchEmbedContentsRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedContentsResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_deref())
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Decode the `data` payload of one SSE event into a delta.
///
/// Chunks without text (usage or finish metadata) yield `None`.
fn event_delta(data: &str) -> Option<Result<String>> {
    match serde_json::from_str::<GenerateContentResponse>(data) {
        Ok(chunk) => match chunk.block_reason() {
            Some(reason) => {
                Some(Err(RagError::StreamInterrupted(format!("prompt blocked: {reason}"))))
            }
            None => {
                let text = chunk.text();
                (!text.is_empty()).then_some(Ok(text))
            }
        },
        Err(e) => Some(Err(RagError::StreamInterrupted(format!("malformed chunk: {e}")))),
    }
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// Chunks are embedded with task type `RETRIEVAL_DOCUMENT` and queries with
/// `RETRIEVAL_QUERY`.
///
/// # Example
///
/// ```rust,ignore
/// use lexcompare_rag::gemini::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::new(std::env::var("GOOGLE_API_KEY")?);
/// let embedding = provider.embed("force majeure").await?;
/// ```
#[derive(Clone)]
pub struct GeminiEmbeddingProvider {
    http: GeminiHttp,
    dimensions: usize,
    output_dimensionality: Option<usize>,
}

impl GeminiEmbeddingProvider {
    /// Output size of `text-embedding-004`.
    const DEFAULT_DIMENSIONS: usize = 768;

    /// Create a provider for [`DEFAULT_EMBEDDING_MODEL`].
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: GeminiHttp::new(api_key, DEFAULT_EMBEDDING_MODEL),
            dimensions: Self::DEFAULT_DIMENSIONS,
            output_dimensionality: None,
        }
    }

    /// Use a different embedding model. `models/` is prepended if missing.
    pub fn with_model(mut self, model: &str) -> Self {
        self.http.model = model_path(model);
        self
    }

    /// Request vectors truncated to `dims` entries.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.output_dimensionality = Some(dims);
        self
    }

    /// Send requests to a different endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.http.base_url = base_url.into();
        self
    }

    fn request<'a>(&'a self, text: &str, task_type: &'static str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: &self.http.model,
            content: Content { role: None, parts: vec![Part { text: text.to_string() }] },
            task_type,
            output_dimensionality: self.output_dimensionality,
        }
    }

    async fn embed_one(&self, text: &str, task_type: &'static str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), task_type, "embedding single text");
        let response = self
            .http
            .post(&self.http.url("embedContent"), &self.request(text, task_type))
            .await
            .map_err(|message| RagError::embedding(PROVIDER, message))?;

        let parsed: EmbedContentResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::embedding(PROVIDER, format!("failed to parse response: {e}"))
        })?;
        Ok(parsed.embedding.values)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text, "RETRIEVAL_DOCUMENT").await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.http.model, "embedding batch");

        let body = BatchEmbedContentsRequest {
            requests: texts.iter().map(|t| self.request(t, "RETRIEVAL_DOCUMENT")).collect(),
        };
        let response = self
            .http
            .post(&self.http.url("batchEmbedContents"), &body)
            .await
            .map_err(|message| RagError::embedding(PROVIDER, message))?;

        let parsed: BatchEmbedContentsResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::embedding(PROVIDER, format!("failed to parse response: {e}"))
        })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(RagError::embedding(
                PROVIDER,
                format!("expected {} embeddings, got {}", texts.len(), parsed.embeddings.len()),
            ));
        }
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text, "RETRIEVAL_QUERY").await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

// ── Generation ─────────────────────────────────────────────────────

/// A [`TextGenerator`] backed by Gemini `generateContent`.
///
/// Streaming uses `streamGenerateContent?alt=sse`. Each server-sent event
/// carries a partial response whose text becomes one delta.
#[derive(Clone)]
pub struct GeminiGenerator {
    http: GeminiHttp,
}

impl GeminiGenerator {
    /// Create a generator for [`DEFAULT_GENERATION_MODEL`].
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { http: GeminiHttp::new(api_key, DEFAULT_GENERATION_MODEL) }
    }

    /// Use a different generation model. `models/` is prepended if missing.
    pub fn with_model(mut self, model: &str) -> Self {
        self.http.model = model_path(model);
        self
    }

    /// Send requests to a different endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.http.base_url = base_url.into();
        self
    }

    fn request(prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest { contents: vec![Content::user_text(prompt)] }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.http.model, prompt_chars = prompt.len(), "generating");
        let response = self
            .http
            .post(&self.http.url("generateContent"), &Self::request(prompt))
            .await
            .map_err(|message| RagError::generation(PROVIDER, message))?;

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::generation(PROVIDER, format!("failed to parse response: {e}"))
        })?;

        if let Some(reason) = parsed.block_reason() {
            return Err(RagError::generation(PROVIDER, format!("prompt blocked: {reason}")));
        }
        Ok(parsed.text())
    }

    async fn generate_stream(&self, prompt: &str) -> Result<DeltaStream> {
        debug!(provider = PROVIDER, model = %self.http.model, prompt_chars = prompt.len(), "starting stream");
        let url = format!("{}?alt=sse", self.http.url("streamGenerateContent"));
        let response = self
            .http
            .post(&url, &Self::request(prompt))
            .await
            .map_err(|message| RagError::generation(PROVIDER, message))?;

        let deltas = response.bytes_stream().eventsource().filter_map(|event| async move {
            match event {
                Ok(event) => event_delta(&event.data),
                Err(e) => Some(Err(RagError::StreamInterrupted(format!("event stream: {e}")))),
            }
        });

        Ok(Box::pin(deltas))
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_are_prefixed() {
        assert_eq!(model_path("gemini-2.5-flash"), "models/gemini-2.5-flash");
        assert_eq!(model_path("models/text-embedding-004"), "models/text-embedding-004");
    }

    #[test]
    fn urls_use_model_and_method() {
        let generator = GeminiGenerator::new("key").with_base_url("http://localhost:9/v1beta/");
        assert_eq!(
            generator.http.url("generateContent"),
            "http://localhost:9/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn response_text_joins_parts() {
        let json = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.text(), "Hello");
        assert!(parsed.block_reason().is_none());
    }

    #[test]
    fn blocked_prompt_is_detected() {
        let json = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.block_reason(), Some("SAFETY"));
        assert!(parsed.text().is_empty());
    }

    #[test]
    fn sse_text_chunk_becomes_delta() {
        let data = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"The lease "}]}}]}"#;
        assert_eq!(event_delta(data).unwrap().unwrap(), "The lease ");
    }

    #[test]
    fn sse_chunk_without_text_is_skipped() {
        let data = r#"{"candidates":[{"content":{"role":"model","parts":[]},"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":12}}"#;
        assert!(event_delta(data).is_none());
        assert!(event_delta(r#"{"candidates":[]}"#).is_none());
    }

    #[test]
    fn sse_block_reason_interrupts_stream() {
        let data = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = event_delta(data).unwrap().unwrap_err();
        assert!(matches!(err, RagError::StreamInterrupted(msg) if msg.contains("SAFETY")));
    }

    #[test]
    fn sse_malformed_json_interrupts_stream() {
        let err = event_delta("{not json").unwrap().unwrap_err();
        assert!(matches!(err, RagError::StreamInterrupted(msg) if msg.contains("malformed chunk")));
    }

    #[test]
    fn embed_request_uses_camel_case() {
        let provider = GeminiEmbeddingProvider::new("key").with_dimensions(256);
        let value = serde_json::to_value(provider.request("text", "RETRIEVAL_QUERY")).unwrap();
        assert_eq!(value["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(value["outputDimensionality"], 256);
        assert_eq!(value["model"], "models/text-embedding-004");
        assert_eq!(provider.dimensions(), 256);
    }
}
