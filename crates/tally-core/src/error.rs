//! Error types for Tally

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Substring that marks a model failure as rate limiting
pub const RATE_LIMIT_MARKER: &str = "rate limit";

#[derive(Error, Debug)]
pub enum Error {
    #[error("All {attempts} model call attempts failed: {source}")]
    InvocationExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("Response parse error: {0}")]
    ResponseParse(#[from] ResponseParseError),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Model rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model call cancelled")]
    Cancelled,

    #[error("Model backend error: {0}")]
    Backend(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether this failure's message marks it as a rate-limit condition
    pub fn is_rate_limit(&self) -> bool {
        self.to_string().contains(RATE_LIMIT_MARKER)
    }
}

/// Why a model response could not be turned into a structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    NoJsonFound,
    InvalidJson,
    SchemaViolation,
}

impl ParseFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseFailure::NoJsonFound => "no-json-found",
            ParseFailure::InvalidJson => "invalid-json",
            ParseFailure::SchemaViolation => "schema-violation",
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A model response that failed sanitizing or validation
///
/// `raw_text` is always the response exactly as the model returned it.
#[derive(Error, Debug, Clone)]
#[error("{reason}: {detail}")]
pub struct ResponseParseError {
    pub reason: ParseFailure,
    pub detail: String,
    pub raw_text: String,
}

impl ResponseParseError {
    pub fn new(reason: ParseFailure, detail: impl Into<String>, raw_text: &str) -> Self {
        Self {
            reason,
            detail: detail.into(),
            raw_text: raw_text.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
