//! Scroll-cursor search client.
//!
//! Pages through every hit of a query using the engine's scroll protocol:
//! one request opens a server-side cursor and returns the first page, each
//! follow-up request trades the current cursor for the next page and a fresh
//! cursor, and a final request releases the cursor. Opening and advancing are
//! retried with exponential backoff; releasing is not.
//!
//! # Example
//!
//! ```rust,ignore
//! use scroll_client::{ElasticsearchClient, OpenRequest, ScrollClient};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = ElasticsearchClient::new("http://localhost:9200")?;
//! let cancel = CancellationToken::new();
//! let request = OpenRequest::new("sample_data", query, 100, Duration::from_secs(60));
//!
//! let mut page = client.open(&request, &cancel).await?;
//! while !page.is_empty() {
//!     // ... consume page.records ...
//!     page = client.advance(&page.cursor, request.keep_alive, &cancel).await?;
//! }
//! client.close(&page.cursor).await?;
//! ```

pub mod client;
pub mod elasticsearch;
pub mod error;
pub mod retry;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::ScrollClient;
pub use elasticsearch::{ClientOptions, ElasticsearchClient};
pub use error::{ParseError, Result, RetryError, ScrollError, TransientError};
pub use retry::{with_retry, RetryConfig};
pub use types::{
    format_keep_alive, page_count, OpenRequest, PageResult, Record, ScrollId, TotalRequirement,
};
