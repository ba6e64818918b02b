//! Field extraction into a newline-delimited sink.

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::warn;

use scroll_client::Record;

/// Counts for one processed page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub written: u64,
    pub skipped: u64,
}

/// Writes one field of each record to the sink, one value per line, in the
/// order received.
///
/// Records without the field (or with a `null` value) are skipped with a
/// warning. Write errors are returned as-is and never retried.
pub struct HitProcessor<W: AsyncWrite + Unpin> {
    field: String,
    sink: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> HitProcessor<W> {
    pub fn new(field: impl Into<String>, sink: W) -> Self {
        Self {
            field: field.into(),
            sink: BufWriter::new(sink),
        }
    }

    /// Append the field of every record in `records`, then flush so a failing
    /// sink is reported against this page.
    pub async fn process(&mut self, records: &[Record]) -> std::io::Result<ProcessStats> {
        let mut stats = ProcessStats::default();

        for record in records {
            match render(record.field(&self.field)) {
                Some(line) => {
                    self.sink.write_all(line.as_bytes()).await?;
                    self.sink.write_all(b"\n").await?;
                    stats.written += 1;
                }
                None => {
                    warn!(field = %self.field, "field not found in document");
                    stats.skipped += 1;
                }
            }
        }

        self.sink.flush().await?;
        Ok(stats)
    }

    /// Flush buffered lines through to the sink.
    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.sink.flush().await
    }

    /// Hand back the sink. Call [`flush`](Self::flush) first.
    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }
}

/// Strings are written verbatim, other values as compact JSON.
fn render(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use scroll_client::testing::record;
    use serde_json::json;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    #[tokio::test]
    async fn test_writes_titles_in_order() {
        let mut processor = HitProcessor::new("title", Vec::new());
        let stats = processor
            .process(&[
                record(json!({ "title": "Test message 1" })),
                record(json!({ "title": "Test message 2" })),
            ])
            .await
            .unwrap();

        assert_eq!(stats, ProcessStats { written: 2, skipped: 0 });
        processor.flush().await.unwrap();
        let out = processor.into_inner();
        assert_eq!(String::from_utf8(out).unwrap(), "Test message 1\nTest message 2\n");
    }

    #[tokio::test]
    async fn test_missing_field_is_skipped() {
        let mut processor = HitProcessor::new("title", Vec::new());
        let stats = processor
            .process(&[
                record(json!({ "title": "first" })),
                record(json!({ "body": "no title here" })),
                record(json!({ "title": null })),
                record(json!({ "title": "last" })),
            ])
            .await
            .unwrap();

        assert_eq!(stats, ProcessStats { written: 2, skipped: 2 });
        processor.flush().await.unwrap();
        let out = processor.into_inner();
        assert_eq!(String::from_utf8(out).unwrap(), "first\nlast\n");
    }

    #[tokio::test]
    async fn test_non_string_values_render_as_json() {
        let mut processor = HitProcessor::new("n", Vec::new());
        processor
            .process(&[
                record(json!({ "n": 42 })),
                record(json!({ "n": true })),
                record(json!({ "n": ["a", "b"] })),
            ])
            .await
            .unwrap();

        processor.flush().await.unwrap();
        let out = processor.into_inner();
        assert_eq!(String::from_utf8(out).unwrap(), "42\ntrue\n[\"a\",\"b\"]\n");
    }

    /// Sink whose every write fails.
    pub(crate) struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk full")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_returned() {
        let mut processor = HitProcessor::new("title", BrokenSink);
        let err = processor
            .process(&[record(json!({ "title": "x" }))])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    #[tokio::test]
    async fn test_page_without_field_writes_nothing() {
        let mut processor = HitProcessor::new("title", BrokenSink);
        let stats = processor
            .process(&[record(json!({ "other": 1 }))])
            .await
            .unwrap();
        assert_eq!(stats, ProcessStats { written: 0, skipped: 1 });
    }
}
