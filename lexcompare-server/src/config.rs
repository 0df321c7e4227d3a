//! Server configuration loaded from the environment.
//!
//! `.env` is read first (if present), then the process environment. Every
//! pipeline option in [`RagConfig`] can be overridden with a
//! `LEXCOMPARE_*` variable.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use lexcompare_rag::gemini::{DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL};
use lexcompare_rag::{RagConfig, RagError, Result, SimilarityMetric};

const DEFAULT_BIND: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000);
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,
    /// Gemini API key.
    pub api_key: String,
    /// Gemini model used for answers.
    pub generation_model: String,
    /// Gemini model used for embeddings.
    pub embedding_model: String,
    /// Largest accepted request body, both files included.
    pub max_upload_bytes: usize,
    /// Analyses still running after this long are cancelled.
    pub request_timeout: Duration,
    /// Log output format.
    pub log_format: LogFormat,
    /// Pipeline options.
    pub rag: RagConfig,
}

impl ServerConfig {
    /// Load `.env` and read the configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `GOOGLE_API_KEY` is missing or a
    /// variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(RagError::ConfigError(format!("failed to read .env: {e}")));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("GOOGLE_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RagError::ConfigError("GOOGLE_API_KEY is required".to_string()))?;

        let defaults = RagConfig::default();
        let rag = RagConfig::builder()
            .chunk_size(parse(&lookup, "LEXCOMPARE_CHUNK_SIZE")?.unwrap_or(defaults.chunk_size))
            .chunk_overlap(
                parse(&lookup, "LEXCOMPARE_CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_overlap),
            )
            .top_k(parse(&lookup, "LEXCOMPARE_TOP_K")?.unwrap_or(defaults.top_k))
            .min_score(parse(&lookup, "LEXCOMPARE_MIN_SCORE")?.unwrap_or(defaults.min_score))
            .max_context_chars(
                parse(&lookup, "LEXCOMPARE_MAX_CONTEXT_CHARS")?
                    .unwrap_or(defaults.max_context_chars),
            )
            .similarity_metric(
                parse::<SimilarityMetric>(&lookup, "LEXCOMPARE_SIMILARITY_METRIC")?
                    .unwrap_or(defaults.similarity_metric),
            )
            .index_cache_capacity(
                parse(&lookup, "LEXCOMPARE_INDEX_CACHE_CAPACITY")?
                    .unwrap_or(defaults.index_cache_capacity),
            )
            .build()?;

        let log_format = match lookup("LEXCOMPARE_LOG_FORMAT").as_deref().map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            bind_addr: parse(&lookup, "LEXCOMPARE_BIND")?.unwrap_or(DEFAULT_BIND),
            api_key,
            generation_model: lookup("LEXCOMPARE_GENERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            embedding_model: lookup("LEXCOMPARE_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            max_upload_bytes: parse(&lookup, "LEXCOMPARE_MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            request_timeout: Duration::from_secs(
                parse(&lookup, "LEXCOMPARE_REQUEST_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            log_format,
            rag,
        })
    }
}

/// Parse an optional variable, reporting its name on failure.
fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RagError::ConfigError(format!("invalid {key} '{raw}': {e}"))),
    }
}
