//! Error types for ct-fetch-bench
//!
//! Two classes of failure exist in a benchmark run:
//! - startup errors (bad configuration, log size query failed) which abort the run
//! - fetch errors on `get-entries`, which the batch fetcher retries in place
//!
//! Whether an error is worth retrying is decided by [`crate::retry::IsRetryable`].

use thiserror::Error;

/// Result type alias for ct-fetch-bench operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ct-fetch-bench
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch_size")
        key: Option<String>,
    },

    /// Transport-level failure talking to the log
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The log answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Status code returned by the log
        status: u16,
        /// Request URL, without credentials
        url: String,
    },

    /// Response body was not the JSON we expected
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Response JSON lacked a required field
    #[error("malformed response: missing field `{0}`")]
    MissingField(&'static str),

    /// A batch cursor ran out of retry attempts
    #[error("gave up on entries {start}..{end} after {attempts} attempts")]
    RetriesExhausted {
        /// Cursor start when the last attempt failed
        start: u64,
        /// Exclusive end of the batch
        end: u64,
        /// Number of attempts made on this cursor
        attempts: u32,
    },

    /// The log answered successfully but sent no entries
    #[error("log returned no entries for {start}..{end}")]
    EmptyPage {
        /// Cursor start of the request
        start: u64,
        /// Exclusive end of the request
        end: u64,
    },

    /// A background task panicked or was aborted
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The run was cancelled before the operation could finish
    #[error("shutdown in progress")]
    ShuttingDown,
}

impl Error {
    /// Build a [`Error::Config`] for a specific configuration key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code, used in log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Network(_) => "network_error",
            Error::HttpStatus { .. } => "http_status",
            Error::Decode(_) | Error::MissingField(_) => "malformed_response",
            Error::RetriesExhausted { .. } => "retries_exhausted",
            Error::EmptyPage { .. } => "empty_page",
            Error::Task(_) => "task_failed",
            Error::ShuttingDown => "shutting_down",
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config {
            message: e.to_string(),
            key: None,
        }
    }
}
