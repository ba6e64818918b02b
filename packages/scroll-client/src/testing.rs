//! Scripted in-memory [`ScrollClient`] for tests.
//!
//! Serves a fixed sequence of pages, hands out a fresh cursor with every page,
//! and records every call so tests can check ordering and cursor hand-off.
//! Injected transient failures go through the real [`with_retry`] loop, so
//! backoff behavior is exercised end to end.
//!
//! # Example
//!
//! ```rust,ignore
//! use scroll_client::testing::{record, MockScrollClient};
//!
//! let mock = MockScrollClient::new(3)
//!     .with_page(vec![record(json!({"title": "a"})), record(json!({"title": "b"}))])
//!     .with_page(vec![record(json!({"title": "c"}))])
//!     .fail_open_times(2);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::ScrollClient;
use crate::error::{ParseError, Result, ScrollError, TransientError};
use crate::retry::{with_retry, RetryConfig};
use crate::types::{OpenRequest, PageResult, Record, ScrollId};

/// Build a record from a JSON object literal.
///
/// Panics if `value` is not an object.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => Record::new(map),
        other => panic!("record fixture must be a JSON object, got {}", other),
    }
}

/// A call observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Open {
        index: String,
        page_size: u32,
        keep_alive: Duration,
    },
    Advance {
        cursor: String,
        keep_alive: Duration,
    },
    Close {
        cursor: String,
    },
}

#[derive(Default)]
struct MockState {
    total: u64,
    pages: VecDeque<Vec<Record>>,
    open_failures: u32,
    advance_failures: u32,
    advance_always_fails: bool,
    malformed_advance: Option<usize>,
    close_fails: bool,
    cancel_on_advance: Option<(usize, CancellationToken)>,
    next_cursor: u64,
    advances: usize,
    attempts: u32,
    calls: Vec<MockCall>,
}

enum Served {
    Page(PageResult),
    Malformed,
}

impl MockState {
    fn serve(&mut self, with_total: bool) -> PageResult {
        self.next_cursor += 1;
        PageResult {
            cursor: ScrollId::new(format!("cursor-{}", self.next_cursor)),
            total: with_total.then_some(self.total),
            records: self.pages.pop_front().unwrap_or_default(),
        }
    }
}

/// Mock scroll client.
pub struct MockScrollClient {
    state: Arc<Mutex<MockState>>,
    retry: RetryConfig,
}

impl MockScrollClient {
    /// Create a mock that reports `total` hits and serves no pages yet.
    pub fn new(total: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                total,
                ..Default::default()
            })),
            retry: RetryConfig::default().without_jitter(),
        }
    }

    /// Create a mock whose pages are `records` split into `page_size` chunks,
    /// with a total that matches.
    pub fn paged(records: Vec<Record>, page_size: usize) -> Self {
        let mock = Self::new(records.len() as u64);
        for chunk in records.chunks(page_size.max(1)) {
            mock.add_page(chunk.to_vec());
        }
        mock
    }

    /// Queue a page. Pages are served in order; once drained, every further
    /// advance returns an empty page.
    pub fn add_page(&self, records: Vec<Record>) {
        self.state.lock().unwrap().pages.push_back(records);
    }

    /// Queue a page (builder pattern).
    pub fn with_page(self, records: Vec<Record>) -> Self {
        self.add_page(records);
        self
    }

    /// Fail the first `n` open attempts with a network error.
    pub fn fail_open_times(self, n: u32) -> Self {
        self.state.lock().unwrap().open_failures = n;
        self
    }

    /// Fail the next `n` advance attempts with an engine error.
    pub fn fail_advance_times(self, n: u32) -> Self {
        self.state.lock().unwrap().advance_failures = n;
        self
    }

    /// Every advance attempt fails, so retries run out.
    pub fn fail_advance_always(self) -> Self {
        self.state.lock().unwrap().advance_always_fails = true;
        self
    }

    /// The `n`th advance (1-based) returns a body without a cursor.
    pub fn malformed_advance(self, n: usize) -> Self {
        self.state.lock().unwrap().malformed_advance = Some(n);
        self
    }

    /// Clearing the cursor fails.
    pub fn fail_close(self) -> Self {
        self.state.lock().unwrap().close_fails = true;
        self
    }

    /// Cancel `token` when the `n`th advance (1-based) has been served.
    pub fn cancel_after_advance(self, n: usize, token: CancellationToken) -> Self {
        self.state.lock().unwrap().cancel_on_advance = Some((n, token));
        self
    }

    /// Override the backoff schedule.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// All calls in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of advance calls (not attempts).
    pub fn advance_count(&self) -> usize {
        self.state.lock().unwrap().advances
    }

    /// Attempts across open and advance, including failed ones.
    pub fn attempt_count(&self) -> u32 {
        self.state.lock().unwrap().attempts
    }

    /// Cursors passed to close.
    pub fn closed_cursors(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Close { cursor } => Some(cursor),
                _ => None,
            })
            .collect()
    }

    /// Whether every advance used the cursor handed out by the previous
    /// response.
    pub fn cursor_chain_is_consistent(&self) -> bool {
        let mut expected = 0u64;
        for call in self.calls() {
            match call {
                MockCall::Open { .. } => expected = 1,
                MockCall::Advance { cursor, .. } => {
                    if cursor != format!("cursor-{}", expected) {
                        return false;
                    }
                    expected += 1;
                }
                MockCall::Close { .. } => {}
            }
        }
        true
    }

    fn attempt_open(&self) -> std::result::Result<PageResult, TransientError> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        if state.open_failures > 0 {
            state.open_failures -= 1;
            return Err(TransientError::Network("connection refused".into()));
        }
        Ok(state.serve(true))
    }

    fn attempt_advance(&self) -> std::result::Result<Served, TransientError> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        if state.advance_always_fails {
            return Err(TransientError::Engine {
                status: 503,
                body: "unavailable".into(),
            });
        }
        if state.advance_failures > 0 {
            state.advance_failures -= 1;
            return Err(TransientError::Engine {
                status: 429,
                body: "too many requests".into(),
            });
        }
        if state.malformed_advance == Some(state.advances) {
            return Ok(Served::Malformed);
        }
        Ok(Served::Page(state.serve(false)))
    }
}

impl Clone for MockScrollClient {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            retry: self.retry.clone(),
        }
    }
}

#[async_trait]
impl ScrollClient for MockScrollClient {
    async fn open(&self, request: &OpenRequest, cancel: &CancellationToken) -> Result<PageResult> {
        self.state.lock().unwrap().calls.push(MockCall::Open {
            index: request.index.clone(),
            page_size: request.page_size,
            keep_alive: request.keep_alive,
        });

        let page = with_retry(&self.retry, cancel, "open", || {
            let outcome = self.attempt_open();
            async move { outcome }
        })
        .await?;
        Ok(page)
    }

    async fn advance(
        &self,
        cursor: &ScrollId,
        keep_alive: Duration,
        cancel: &CancellationToken,
    ) -> Result<PageResult> {
        {
            let mut state = self.state.lock().unwrap();
            state.advances += 1;
            state.calls.push(MockCall::Advance {
                cursor: cursor.as_str().to_string(),
                keep_alive,
            });
        }

        let served = with_retry(&self.retry, cancel, "advance", || {
            let outcome = self.attempt_advance();
            async move { outcome }
        })
        .await?;

        // Fires once the page is in hand, so it lands between pages.
        {
            let state = self.state.lock().unwrap();
            if let Some((n, token)) = &state.cancel_on_advance {
                if *n == state.advances {
                    token.cancel();
                }
            }
        }

        match served {
            Served::Page(page) => Ok(page),
            Served::Malformed => Err(ParseError::MissingCursor.into()),
        }
    }

    async fn close(&self, cursor: &ScrollId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::Close {
            cursor: cursor.as_str().to_string(),
        });
        if state.close_fails {
            return Err(ScrollError::Release(TransientError::Engine {
                status: 500,
                body: "clear scroll failed".into(),
            }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> OpenRequest {
        OpenRequest::new("sample_data", "{}", 2, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_serves_pages_in_order() {
        let mock = MockScrollClient::paged(
            vec![
                record(json!({ "title": "a" })),
                record(json!({ "title": "b" })),
                record(json!({ "title": "c" })),
            ],
            2,
        );
        let cancel = CancellationToken::new();

        let first = mock.open(&request(), &cancel).await.unwrap();
        assert_eq!(first.total, Some(3));
        assert_eq!(first.records.len(), 2);

        let second = mock
            .advance(&first.cursor, Duration::from_secs(60), &cancel)
            .await
            .unwrap();
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.total, None);

        let third = mock
            .advance(&second.cursor, Duration::from_secs(60), &cancel)
            .await
            .unwrap();
        assert!(third.is_empty());
        assert!(mock.cursor_chain_is_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_open_failures_are_retried() {
        let mock = MockScrollClient::new(0).fail_open_times(2);
        let cancel = CancellationToken::new();

        let page = mock.open(&request(), &cancel).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(mock.attempt_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_close_failure() {
        let mock = MockScrollClient::new(0).fail_close();
        let err = mock.close(&ScrollId::new("cursor-1")).await.unwrap_err();
        assert!(matches!(err, ScrollError::Release(_)));
        assert_eq!(mock.closed_cursors(), vec!["cursor-1".to_string()]);
    }
}
