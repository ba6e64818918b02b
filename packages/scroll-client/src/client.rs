//! The three-operation scroll contract.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{OpenRequest, PageResult, ScrollId};

/// A search engine that supports cursor-based pagination.
///
/// Implementations must treat an empty page from [`advance`](Self::advance)
/// as a successful result, not an error; the caller uses it to detect the end
/// of the result set.
#[async_trait]
pub trait ScrollClient: Send + Sync {
    /// Submit the query and return the first page.
    ///
    /// The returned page always carries a total hit count.
    async fn open(&self, request: &OpenRequest, cancel: &CancellationToken) -> Result<PageResult>;

    /// Fetch the page after `cursor`, extending the cursor's lifetime by
    /// `keep_alive`.
    ///
    /// `cursor` is consumed server-side; only the cursor in the returned page
    /// is valid afterwards.
    async fn advance(
        &self,
        cursor: &ScrollId,
        keep_alive: Duration,
        cancel: &CancellationToken,
    ) -> Result<PageResult>;

    /// Release the server-side cursor. Attempted once.
    async fn close(&self, cursor: &ScrollId) -> Result<()>;
}
