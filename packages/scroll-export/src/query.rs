//! Query document loading.
//!
//! The query is opaque JSON text. The only manipulation is literal
//! placeholder replacement: `{{TOKEN}}` becomes `VALUE` for each
//! `TOKEN=VALUE` pair, before the text is checked to be a JSON object.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to read query file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("query is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("query must be a JSON object")]
    NotObject,

    #[error("placeholder must look like TOKEN=VALUE, got {0:?}")]
    Placeholder(String),
}

/// A `{{token}}` → `value` replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub token: String,
    pub value: String,
}

impl Placeholder {
    pub fn new(token: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            value: value.into(),
        }
    }

    fn apply(&self, text: &str) -> String {
        text.replace(&format!("{{{{{}}}}}", self.token), &self.value)
    }
}

impl FromStr for Placeholder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((token, value)) if !token.trim().is_empty() => {
                Ok(Self::new(token.trim(), value))
            }
            _ => Err(QueryError::Placeholder(s.to_string())),
        }
    }
}

/// A validated query document, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
}

impl Query {
    /// Read the query file and apply placeholders.
    pub async fn load(path: &Path, placeholders: &[Placeholder]) -> Result<Self, QueryError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| QueryError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), bytes = text.len(), "query file loaded");
        Self::from_text(text, placeholders)
    }

    /// Apply placeholders to `text` and check it is a JSON object.
    pub fn from_text(
        text: impl Into<String>,
        placeholders: &[Placeholder],
    ) -> Result<Self, QueryError> {
        let text = placeholders
            .iter()
            .fold(text.into(), |acc, placeholder| placeholder.apply(&acc));

        match serde_json::from_str::<Value>(&text)? {
            Value::Object(_) => Ok(Self { text }),
            _ => Err(QueryError::NotObject),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
