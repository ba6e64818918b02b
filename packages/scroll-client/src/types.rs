//! Scroll page types and the response decoder.
//!
//! Responses are decoded into typed structs first and validated second, so a
//! structurally invalid body fails at the first missing piece with a named
//! [`ParseError`] instead of somewhere downstream.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ParseError;

/// Opaque server-side cursor token.
///
/// Not `Clone`; a session holds the one live cursor and swaps it after every
/// fetch.
#[derive(Debug, PartialEq, Eq)]
pub struct ScrollId(String);

impl ScrollId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScrollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Cursor ids run to hundreds of characters; logs only need the head.
        let head: String = self.0.chars().take(16).collect();
        if head.len() < self.0.len() {
            write!(f, "{}…", head)
        } else {
            f.write_str(&self.0)
        }
    }
}

/// One search hit's `_source` document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    source: Map<String, Value>,
}

impl Record {
    pub fn new(source: Map<String, Value>) -> Self {
        Self { source }
    }

    /// Look up a top-level field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.source.get(name)
    }
}

/// Whether a page must carry the total hit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalRequirement {
    /// First page of a session
    Required,
    /// Continuation pages
    Optional,
}

/// A decoded page: the cursor to use next, the total, and the hits.
#[derive(Debug, PartialEq)]
pub struct PageResult {
    pub cursor: ScrollId,
    pub total: Option<u64>,
    pub records: Vec<Record>,
}

impl PageResult {
    /// Decode a raw response body.
    pub fn from_slice(body: &[u8], total: TotalRequirement) -> Result<Self, ParseError> {
        let raw: RawResponse = serde_json::from_slice(body)?;
        raw.validate(total)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: &Value, total: TotalRequirement) -> Result<Self, ParseError> {
        let raw = RawResponse::deserialize(value)?;
        raw.validate(total)
    }

    /// An empty page marks the end of the result set.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parameters for opening a scroll session.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub index: String,
    /// Query document as JSON text; sent unmodified
    pub query: String,
    pub page_size: u32,
    /// Cursor time-to-live, refreshed on every fetch
    pub keep_alive: Duration,
}

impl OpenRequest {
    pub fn new(
        index: impl Into<String>,
        query: impl Into<String>,
        page_size: u32,
        keep_alive: Duration,
    ) -> Self {
        Self {
            index: index.into(),
            query: query.into(),
            page_size,
            keep_alive,
        }
    }
}

/// Number of pages needed for `total` hits, rounded up.
pub fn page_count(total: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(u64::from(page_size))
}

/// Render a keep-alive in the engine's time-unit syntax.
pub fn format_keep_alive(keep_alive: Duration) -> String {
    if keep_alive.subsec_nanos() == 0 {
        format!("{}s", keep_alive.as_secs())
    } else {
        format!("{}ms", keep_alive.as_millis())
    }
}

// Wire shapes. Every field is optional so validation can name what is missing.

#[derive(Deserialize)]
struct RawResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Option<RawHits>,
}

#[derive(Deserialize)]
struct RawHits {
    total: Option<Value>,
    hits: Option<Vec<RawHit>>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_source")]
    source: Option<Value>,
}

impl RawResponse {
    fn validate(self, requirement: TotalRequirement) -> Result<PageResult, ParseError> {
        let cursor = self
            .scroll_id
            .filter(|id| !id.is_empty())
            .map(ScrollId::new)
            .ok_or(ParseError::MissingCursor)?;

        let hits = self.hits.ok_or(ParseError::MissingHits)?;

        let total = match hits.total {
            Some(value) => Some(parse_total(&value)?),
            None if requirement == TotalRequirement::Required => {
                return Err(ParseError::MissingTotal)
            }
            None => None,
        };

        let records = hits
            .hits
            .ok_or(ParseError::MissingRecords)?
            .into_iter()
            .enumerate()
            .map(|(index, hit)| match hit.source {
                Some(Value::Object(source)) => Ok(Record::new(source)),
                _ => Err(ParseError::MissingSource { index }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PageResult {
            cursor,
            total,
            records,
        })
    }
}

/// Accepts `{"value": n, "relation": ..}` (7.x+) or a bare `n` (6.x).
fn parse_total(value: &Value) -> Result<u64, ParseError> {
    let number = match value {
        Value::Object(obj) => obj.get("value").ok_or(ParseError::MissingTotal)?,
        other => other,
    };
    number
        .as_u64()
        .ok_or_else(|| ParseError::InvalidTotal(number.to_string()))
}
