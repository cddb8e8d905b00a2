//! Error types for carecall.
//!
//! Internal errors never reach the caller as raw text: the dialogue engine
//! maps every failure to a spoken prompt or a transfer/hangup directive.
//! These variants exist for logs and for the transport boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("catalog empty for kind {0}")]
    EmptyCatalog(String),

    #[error("LLM classifier error: {0}")]
    Llm(String),

    #[error("availability backend error: {0}")]
    Availability(String),

    #[error("unknown call id: {0}")]
    UnknownCall(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
