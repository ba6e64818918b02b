//! Typed errors for the scroll client.
//!
//! Uses `thiserror` so callers can tell a retried-and-exhausted request apart
//! from a response that decoded into the wrong shape.

use std::time::Duration;

use thiserror::Error;

/// Result type for scroll client operations.
pub type Result<T> = std::result::Result<T, ScrollError>;

/// A single failed attempt that is worth retrying.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransientError {
    /// Connection failed, timed out, or the body could not be read
    #[error("network error: {0}")]
    Network(String),

    /// Engine answered with a non-success status
    #[error("engine returned {status}: {body}")]
    Engine { status: u16, body: String },
}

impl From<reqwest::Error> for TransientError {
    fn from(err: reqwest::Error) -> Self {
        TransientError::Network(err.to_string())
    }
}

/// Why the retry loop stopped without a successful attempt.
#[derive(Debug, Error)]
pub enum RetryError {
    /// Elapsed-time budget ran out
    #[error("gave up after {attempts} attempts in {elapsed:?}: {last}")]
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        #[source]
        last: TransientError,
    },

    /// Cancellation token fired while attempting or backing off
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

/// The response did not have the shape of a scroll page.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Body is not JSON, or not an object of the expected field types
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing cursor")]
    MissingCursor,

    #[error("missing hits object")]
    MissingHits,

    #[error("missing total hit count")]
    MissingTotal,

    #[error("total hit count is not a non-negative integer: {0}")]
    InvalidTotal(String),

    #[error("missing hits array")]
    MissingRecords,

    /// Hit at `index` has no `_source` object
    #[error("hit {index} has no _source document")]
    MissingSource { index: usize },
}

/// Errors surfaced by [`ScrollClient`](crate::ScrollClient) operations.
#[derive(Debug, Error)]
pub enum ScrollError {
    /// Client could not be built (bad base URL, TLS backend failure)
    #[error("configuration error: {0}")]
    Config(String),

    /// Request kept failing until the retry budget ran out
    #[error("request failed: {0}")]
    Request(#[source] RetryError),

    /// Caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Clearing the cursor failed; extracted data is unaffected
    #[error("failed to release cursor: {0}")]
    Release(#[source] TransientError),
}

impl From<RetryError> for ScrollError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Cancelled { .. } => ScrollError::Cancelled,
            exhausted => ScrollError::Request(exhausted),
        }
    }
}

impl ScrollError {
    /// Whether this error came from cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScrollError::Cancelled)
    }
}
