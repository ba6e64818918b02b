//! The export state machine.
//!
//! ```text
//! Init ──► FirstPage ──► Paging ──► DrainingDone ──► Closed
//!              │            │  ▲          ▲
//!              │            └──┘          │
//!              └──────────────────────────┘
//!
//! any non-terminal state ──► Aborted
//! ```
//!
//! The session owns the one live cursor. Every call that consumes it goes
//! through `&mut self`, so fetches are strictly sequential and each advance
//! uses the cursor returned by the previous response.

use std::fmt;

use scroll_client::{page_count, OpenRequest, PageResult, Record, ScrollClient, ScrollError, ScrollId};
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ExportError, Result};
use crate::processor::HitProcessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    FirstPage,
    Paging,
    DrainingDone,
    Closed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Aborted)
    }

    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (from, Aborted) => !from.is_terminal(),
            (Init, FirstPage)
            | (FirstPage, Paging)
            | (FirstPage, DrainingDone)
            | (Paging, DrainingDone)
            | (DrainingDone, Closed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::FirstPage => "first_page",
            SessionState::Paging => "paging",
            SessionState::DrainingDone => "draining_done",
            SessionState::Closed => "closed",
            SessionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Summary of a completed export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    /// Total reported by the first page
    pub total_hits: u64,
    /// `ceil(total_hits / page_size)`
    pub total_pages: u64,
    /// Record counts of each non-empty page, in order
    pub page_sizes: Vec<usize>,
    pub records_seen: u64,
    pub lines_written: u64,
    pub records_skipped: u64,
    /// False when clearing the cursor failed
    pub cursor_released: bool,
}

impl ExportReport {
    pub fn pages_processed(&self) -> u64 {
        self.page_sizes.len() as u64
    }
}

/// One scroll session from open to close.
pub struct ExportSession<'a, C: ScrollClient + ?Sized, W: AsyncWrite + Unpin> {
    client: &'a C,
    request: OpenRequest,
    processor: HitProcessor<W>,
    cancel: CancellationToken,
    state: SessionState,
    cursor: Option<ScrollId>,
    pages_fetched: u64,
    report: ExportReport,
}

impl<'a, C: ScrollClient + ?Sized, W: AsyncWrite + Unpin> ExportSession<'a, C, W> {
    pub fn new(
        client: &'a C,
        request: OpenRequest,
        processor: HitProcessor<W>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            request,
            processor,
            cancel,
            state: SessionState::Init,
            cursor: None,
            pages_fetched: 0,
            report: ExportReport::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion.
    pub async fn run(self) -> Result<ExportReport> {
        self.run_into_sink().await.map(|(report, _)| report)
    }

    /// Run the session to completion and hand back the flushed sink.
    pub async fn run_into_sink(mut self) -> Result<(ExportReport, W)> {
        if let Err(err) = self.drive().await {
            self.transition(SessionState::Aborted);
            error!(phase = err.phase(), error = %err, "export aborted");
            self.release_cursor().await;
            return Err(err);
        }

        self.transition(SessionState::DrainingDone);
        self.release_cursor().await;

        if let Err(source) = self.processor.flush().await {
            let err = ExportError::Flush(source);
            self.transition(SessionState::Aborted);
            error!(phase = err.phase(), error = %err, "export aborted");
            return Err(err);
        }
        self.transition(SessionState::Closed);

        let report = self.report;
        let sink = self.processor.into_inner();

        info!(
            total_hits = report.total_hits,
            pages = report.pages_processed(),
            lines = report.lines_written,
            skipped = report.records_skipped,
            cursor_released = report.cursor_released,
            "export complete"
        );
        Ok((report, sink))
    }

    async fn drive(&mut self) -> Result<()> {
        self.transition(SessionState::FirstPage);

        let first = self.fetch_first().await?;
        let PageResult {
            cursor,
            total,
            records,
        } = first;
        self.cursor = Some(cursor);

        // The client contract guarantees a total on the first page.
        let total = total.unwrap_or(records.len() as u64);
        self.report.total_hits = total;
        self.report.total_pages = page_count(total, self.request.page_size);
        info!(
            total_hits = total,
            total_pages = self.report.total_pages,
            "scroll opened"
        );

        if records.is_empty() {
            info!("no hits to process");
            return Ok(());
        }
        self.process_page(&records).await?;

        if self.report.total_pages <= 1 {
            return Ok(());
        }

        self.transition(SessionState::Paging);
        while let Some(cursor) = &self.cursor {
            let page = self.pages_fetched + 1;
            if self.cancel.is_cancelled() {
                return Err(ExportError::Cancelled { page });
            }

            let next = self
                .client
                .advance(cursor, self.request.keep_alive, &self.cancel)
                .await
                .map_err(|err| fetch_error(page, err))?;

            self.pages_fetched = page;
            self.cursor = Some(next.cursor);

            if next.records.is_empty() {
                info!(page, "no more hits to process");
                return Ok(());
            }
            self.process_page(&next.records).await?;
        }
        Ok(())
    }

    async fn fetch_first(&mut self) -> Result<PageResult> {
        if self.cancel.is_cancelled() {
            return Err(ExportError::Cancelled { page: 1 });
        }
        let first = self
            .client
            .open(&self.request, &self.cancel)
            .await
            .map_err(|err| fetch_error(1, err))?;
        self.pages_fetched = 1;
        Ok(first)
    }

    async fn process_page(&mut self, records: &[Record]) -> Result<()> {
        let page = self.pages_fetched;
        info!(
            page,
            total_pages = self.report.total_pages,
            records = records.len(),
            "processing page"
        );

        let stats = self
            .processor
            .process(records)
            .await
            .map_err(|source| ExportError::Write { page, source })?;

        self.report.page_sizes.push(records.len());
        self.report.records_seen += records.len() as u64;
        self.report.lines_written += stats.written;
        self.report.records_skipped += stats.skipped;
        Ok(())
    }

    /// Clear the cursor if one is known. Failure is logged, never returned.
    async fn release_cursor(&mut self) {
        let Some(cursor) = self.cursor.take() else {
            return;
        };

        match self.client.close(&cursor).await {
            Ok(()) => {
                debug!(cursor = %cursor, "scroll cleared");
                self.report.cursor_released = true;
            }
            Err(err) => {
                warn!(cursor = %cursor, error = %err, "failed to clear scroll");
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid session transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "session transition");
        self.state = next;
    }
}

fn fetch_error(page: u64, err: ScrollError) -> ExportError {
    if err.is_cancelled() {
        ExportError::Cancelled { page }
    } else if page == 1 {
        ExportError::Open(err)
    } else {
        ExportError::Page { page, source: err }
    }
}
