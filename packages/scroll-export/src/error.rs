//! Export errors, tagged with the phase that failed.

use std::io;

use scroll_client::ScrollError;
use thiserror::Error;

/// Result type for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// A fatal export failure.
///
/// Each variant names the phase of the session that failed so the message a
/// user sees says where the run stopped.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Initial query failed
    #[error("open failed: {0}")]
    Open(#[source] ScrollError),

    /// Fetching page `page` failed
    #[error("page {page} failed: {source}")]
    Page {
        page: u64,
        #[source]
        source: ScrollError,
    },

    /// Writing records from page `page` to the sink failed
    #[error("write failed on page {page}: {source}")]
    Write {
        page: u64,
        #[source]
        source: io::Error,
    },

    /// Flushing the sink at the end of the run failed
    #[error("flush failed: {0}")]
    Flush(#[source] io::Error),

    /// Shutdown was requested before page `page` was fetched
    #[error("cancelled before page {page}")]
    Cancelled { page: u64 },
}

impl ExportError {
    /// Short name of the failing phase, for structured logs.
    pub fn phase(&self) -> &'static str {
        match self {
            ExportError::Open(ScrollError::Parse(_))
            | ExportError::Page {
                source: ScrollError::Parse(_),
                ..
            } => "parse",
            ExportError::Open(_) => "open",
            ExportError::Page { .. } => "page",
            ExportError::Write { .. } | ExportError::Flush(_) => "write",
            ExportError::Cancelled { .. } => "cancelled",
        }
    }
}
