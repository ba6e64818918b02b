// Scroll Export
//
// Streams every hit of a search through a scroll cursor and writes one field
// of each hit to a text file, one value per line.

pub mod config;
pub mod error;
pub mod processor;
pub mod query;
pub mod session;

use anyhow::{Context, Result};
use scroll_client::{ClientOptions, ElasticsearchClient, OpenRequest, ScrollClient};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use config::{Cli, Config, ConfigError};
pub use error::ExportError;
pub use processor::{HitProcessor, ProcessStats};
pub use query::{Placeholder, Query, QueryError};
pub use session::{ExportReport, ExportSession, SessionState};

/// Build the HTTP client described by `config` and run one export.
pub async fn run(config: &Config, cancel: CancellationToken) -> Result<ExportReport> {
    let client = ElasticsearchClient::with_options(
        &config.es_url,
        ClientOptions {
            insecure_tls: config.insecure_tls,
            request_timeout: config.request_timeout,
        },
    )
    .context("Failed to build search client")?;

    export(config, &client, cancel).await
}

/// Load the query, truncate the output file and scroll through every hit.
pub async fn export<C: ScrollClient + ?Sized>(
    config: &Config,
    client: &C,
    cancel: CancellationToken,
) -> Result<ExportReport> {
    let query = Query::load(&config.query_file, &config.placeholders).await?;

    if let Some(parent) = config.output_file.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let sink = tokio::fs::File::create(&config.output_file)
        .await
        .with_context(|| format!("Failed to open {}", config.output_file.display()))?;

    info!(
        index = %config.index,
        output = %config.output_file.display(),
        field = %config.field,
        batch_size = config.batch_size,
        "starting export"
    );

    let request = OpenRequest::new(
        config.index.as_str(),
        query.into_string(),
        config.batch_size,
        config.scroll_duration,
    );
    let session = ExportSession::new(
        client,
        request,
        HitProcessor::new(config.field.as_str(), sink),
        cancel,
    );

    Ok(session.run().await?)
}
