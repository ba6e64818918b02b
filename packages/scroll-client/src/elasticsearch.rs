//! HTTP implementation of [`ScrollClient`] for Elasticsearch 7.x/8.x.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::client::ScrollClient;
use crate::error::{Result, ScrollError, TransientError};
use crate::retry::{with_retry, RetryConfig};
use crate::types::{format_keep_alive, OpenRequest, PageResult, ScrollId, TotalRequirement};

/// Transport settings for [`ElasticsearchClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Skip TLS certificate verification
    pub insecure_tls: bool,
    /// Per-request timeout; a timed-out request counts as a transient failure
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            insecure_tls: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Elasticsearch scroll client over HTTP.
pub struct ElasticsearchClient {
    http: Client,
    base: Url,
    base_url: String,
    retry: RetryConfig,
}

impl ElasticsearchClient {
    /// Create a client with default transport options.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_options(base_url, ClientOptions::default())
    }

    /// Create a client with explicit transport options.
    pub fn with_options(base_url: &str, options: ClientOptions) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ScrollError::Config(format!("invalid base URL {}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(ScrollError::Config(format!(
                "unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }

        let http = Client::builder()
            .timeout(options.request_timeout)
            .danger_accept_invalid_certs(options.insecure_tls)
            .build()
            .map_err(|e| ScrollError::Config(e.to_string()))?;

        if options.insecure_tls {
            info!("TLS certificate verification disabled");
        }

        Ok(Self {
            http,
            base: parsed,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        })
    }

    /// Override the backoff schedule for open and advance.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn scroll_url(&self) -> String {
        format!("{}/_search/scroll", self.base_url)
    }

    /// `{base}/{index}/_search` with the index as one escaped path segment.
    fn search_url(&self, index: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ScrollError::Config(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .push(index)
            .push("_search");
        Ok(url)
    }

    /// Send one request and classify the outcome.
    async fn send(request: RequestBuilder) -> std::result::Result<Vec<u8>, TransientError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(TransientError::Engine {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(body.to_vec())
    }
}

#[async_trait]
impl ScrollClient for ElasticsearchClient {
    async fn open(&self, request: &OpenRequest, cancel: &CancellationToken) -> Result<PageResult> {
        let url = self.search_url(&request.index)?;
        let keep_alive = format_keep_alive(request.keep_alive);
        let size = request.page_size.to_string();

        debug!(index = %request.index, size = %size, scroll = %keep_alive, "opening scroll");

        let body = with_retry(&self.retry, cancel, "open", || {
            Self::send(
                self.http
                    .post(url.clone())
                    .query(&[
                        ("scroll", keep_alive.as_str()),
                        ("size", size.as_str()),
                        ("track_total_hits", "true"),
                    ])
                    .header(CONTENT_TYPE, "application/json")
                    .body(request.query.clone()),
            )
        })
        .await?;

        Ok(PageResult::from_slice(&body, TotalRequirement::Required)?)
    }

    async fn advance(
        &self,
        cursor: &ScrollId,
        keep_alive: Duration,
        cancel: &CancellationToken,
    ) -> Result<PageResult> {
        let url = self.scroll_url();
        let payload = json!({
            "scroll": format_keep_alive(keep_alive),
            "scroll_id": cursor.as_str(),
        });

        debug!(cursor = %cursor, "advancing scroll");

        let body = with_retry(&self.retry, cancel, "advance", || {
            Self::send(self.http.post(&url).json(&payload))
        })
        .await?;

        Ok(PageResult::from_slice(&body, TotalRequirement::Optional)?)
    }

    async fn close(&self, cursor: &ScrollId) -> Result<()> {
        let payload = json!({ "scroll_id": [cursor.as_str()] });

        debug!(cursor = %cursor, "clearing scroll");

        Self::send(self.http.delete(self.scroll_url()).json(&payload))
            .await
            .map(|_| ())
            .map_err(ScrollError::Release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(matches!(
            ElasticsearchClient::new("not a url"),
            Err(ScrollError::Config(_))
        ));
        assert!(matches!(
            ElasticsearchClient::new("ftp://search.local"),
            Err(ScrollError::Config(_))
        ));
    }

    #[test]
    fn test_trims_trailing_slash() {
        let client = ElasticsearchClient::new("http://localhost:9200/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:9200");
        assert_eq!(client.scroll_url(), "http://localhost:9200/_search/scroll");
    }

    #[test]
    fn test_search_url_escapes_index() {
        let client = ElasticsearchClient::new("http://localhost:9200/").unwrap();
        assert_eq!(
            client.search_url("sample_data").unwrap().as_str(),
            "http://localhost:9200/sample_data/_search"
        );
        assert_eq!(
            client.search_url("logs?size=1#x").unwrap().as_str(),
            "http://localhost:9200/logs%3Fsize=1%23x/_search"
        );

        let prefixed = ElasticsearchClient::new("https://gateway.local/es/").unwrap();
        assert_eq!(
            prefixed.search_url("logs-*").unwrap().as_str(),
            "https://gateway.local/es/logs-*/_search"
        );
    }
}
