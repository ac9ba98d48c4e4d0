//! Error types for speechmux

use std::io;
use thiserror::Error;

/// Error type for the crate's fallible plumbing
///
/// Engines never hand these to clients; they are folded into the
/// engine's error record and a `bool` result instead.
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Speech backend error: {0}")]
    Backend(String),

    #[error("Invalid locale: {0}")]
    InvalidLocale(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for speechmux operations
pub type Result<T> = std::result::Result<T, SpeechError>;

impl From<String> for SpeechError {
    fn from(s: String) -> Self {
        SpeechError::Other(s)
    }
}

impl From<&str> for SpeechError {
    fn from(s: &str) -> Self {
        SpeechError::Other(s.to_string())
    }
}
