//! # lexcompare-server
//!
//! HTTP front end for [`lexcompare_rag`]. Accepts two uploaded documents,
//! extracts their text, and returns the model's review as
//! `{"message": "..."}`.
//!
//! Retrieval mode (`POST /analyze`) checks a PDF or DOCX document against a
//! PDF reference corpus. Comparison mode (`POST /compare`) compares two PDF
//! or DOCX documents directly. Configuration is read from the environment;
//! see [`ServerConfig::from_env`].

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::{LogFormat, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use routes::{MessageResponse, router};
pub use state::AppState;
