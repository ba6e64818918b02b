//! Run configuration: command-line flags, falling back to environment
//! variables (a `.env` file is honored), falling back to defaults.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use url::Url;

use crate::query::Placeholder;

const DEFAULT_ES_URL: &str = "http://localhost:9200";
const DEFAULT_INDEX: &str = "sample_data";
const DEFAULT_QUERY_FILE: &str = "query.json";
const DEFAULT_OUTPUT_FILE: &str = "data/logs.txt";
const DEFAULT_BATCH_SIZE: u32 = 100;
const DEFAULT_SCROLL_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_FIELD: &str = "title";

/// Characters the engine rejects in index names. `*` and `,` stay allowed
/// for patterns and multi-index targets.
const INVALID_INDEX_CHARS: &[char] = &['/', '\\', '?', '#', '"', '<', '>', '|', ' '];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Default, Parser)]
#[command(name = "scroll-export")]
#[command(about = "Export one field of every matching document via scroll pagination")]
pub struct Cli {
    /// Search engine base URL [env: ELASTICSEARCH_URL]
    #[arg(long)]
    pub es_url: Option<String>,

    /// Index to search [env: SCROLL_INDEX]
    #[arg(long)]
    pub index: Option<String>,

    /// Path to the JSON query document [env: SCROLL_QUERY_FILE]
    #[arg(long)]
    pub query_file: Option<PathBuf>,

    /// Output file, truncated on start [env: SCROLL_OUTPUT_FILE]
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    /// Hits per page [env: SCROLL_BATCH_SIZE]
    #[arg(long)]
    pub batch_size: Option<u32>,

    /// Cursor keep-alive, e.g. 1m or 90s [env: SCROLL_DURATION]
    #[arg(long, value_parser = parse_duration)]
    pub scroll_duration: Option<Duration>,

    /// Per-request timeout [env: SCROLL_REQUEST_TIMEOUT]
    #[arg(long, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// Document field to extract [env: SCROLL_FIELD]
    #[arg(long)]
    pub field: Option<String>,

    /// Skip TLS certificate verification [env: SCROLL_INSECURE_TLS]
    #[arg(long)]
    pub insecure_tls: bool,

    /// Replace {{TOKEN}} in the query with VALUE (repeatable)
    #[arg(long = "set", value_name = "TOKEN=VALUE")]
    pub placeholders: Vec<Placeholder>,
}

/// Validated, immutable run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub es_url: String,
    pub index: String,
    pub query_file: PathBuf,
    pub output_file: PathBuf,
    pub batch_size: u32,
    pub scroll_duration: Duration,
    pub request_timeout: Duration,
    pub field: String,
    pub insecure_tls: bool,
    pub placeholders: Vec<Placeholder>,
}

impl Config {
    /// Resolve flags against the process environment.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    /// Resolve flags against an arbitrary variable lookup, then validate.
    pub fn resolve(
        cli: Cli,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let batch_size = match cli.batch_size {
            Some(size) => size,
            None => match var("SCROLL_BATCH_SIZE") {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    ConfigError::invalid("batch size", format!("{:?} is not a number", raw))
                })?,
                None => DEFAULT_BATCH_SIZE,
            },
        };

        let scroll_duration = match cli.scroll_duration {
            Some(d) => d,
            None => match var("SCROLL_DURATION") {
                Some(raw) => parse_duration(&raw)
                    .map_err(|message| ConfigError::invalid("scroll duration", message))?,
                None => DEFAULT_SCROLL_DURATION,
            },
        };

        let request_timeout = match cli.request_timeout {
            Some(d) => d,
            None => match var("SCROLL_REQUEST_TIMEOUT") {
                Some(raw) => parse_duration(&raw)
                    .map_err(|message| ConfigError::invalid("request timeout", message))?,
                None => DEFAULT_REQUEST_TIMEOUT,
            },
        };

        let insecure_tls = cli.insecure_tls
            || match var("SCROLL_INSECURE_TLS") {
                Some(raw) => parse_bool(&raw)
                    .ok_or_else(|| ConfigError::invalid("insecure TLS flag", raw.clone()))?,
                None => false,
            };

        let config = Self {
            es_url: cli
                .es_url
                .or_else(|| var("ELASTICSEARCH_URL"))
                .unwrap_or_else(|| DEFAULT_ES_URL.to_string()),
            index: cli
                .index
                .or_else(|| var("SCROLL_INDEX"))
                .unwrap_or_else(|| DEFAULT_INDEX.to_string()),
            query_file: cli
                .query_file
                .or_else(|| var("SCROLL_QUERY_FILE").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_QUERY_FILE)),
            output_file: cli
                .output_file
                .or_else(|| var("SCROLL_OUTPUT_FILE").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_FILE)),
            batch_size,
            scroll_duration,
            request_timeout,
            field: cli
                .field
                .or_else(|| var("SCROLL_FIELD"))
                .unwrap_or_else(|| DEFAULT_FIELD.to_string()),
            insecure_tls,
            placeholders: cli.placeholders,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every setting once; the config is not modified afterwards.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.es_url)
            .map_err(|e| ConfigError::invalid("engine URL", format!("{}: {}", self.es_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "engine URL",
                format!("unsupported scheme {}", url.scheme()),
            ));
        }

        if self.index.trim().is_empty() {
            return Err(ConfigError::invalid("index", "must not be empty"));
        }
        if let Some(c) = self.index.chars().find(|c| INVALID_INDEX_CHARS.contains(c)) {
            return Err(ConfigError::invalid(
                "index",
                format!("{:?} contains {:?}", self.index, c),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch size", "must be at least 1"));
        }
        if self.scroll_duration.is_zero() {
            return Err(ConfigError::invalid("scroll duration", "must be positive"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("request timeout", "must be positive"));
        }
        if self.field.trim().is_empty() {
            return Err(ConfigError::invalid("field", "must not be empty"));
        }
        if self.query_file.as_os_str().is_empty() {
            return Err(ConfigError::invalid("query file", "must not be empty"));
        }
        if self.output_file.as_os_str().is_empty() {
            return Err(ConfigError::invalid("output file", "must not be empty"));
        }

        Ok(())
    }
}

/// Parse `500ms`, `90s`, `1m`, `2h`; a bare number means seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("{:?} is not a duration", raw))?;

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("{:?} is out of range", raw))
    };

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => secs(60),
        "h" => secs(60 * 60),
        other => Err(format!("unknown duration unit {:?} in {:?}", other, raw)),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve_with(cli: Cli, vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::resolve(cli, |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = resolve_with(Cli::default(), &[]).unwrap();
        assert_eq!(config.es_url, "http://localhost:9200");
        assert_eq!(config.index, "sample_data");
        assert_eq!(config.query_file, PathBuf::from("query.json"));
        assert_eq!(config.output_file, PathBuf::from("data/logs.txt"));
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.scroll_duration, Duration::from_secs(60));
        assert_eq!(config.field, "title");
        assert!(!config.insecure_tls);
    }

    #[test]
    fn test_env_overrides_defaults_and_flags_override_env() {
        let cli = Cli {
            index: Some("from_flag".into()),
            ..Default::default()
        };
        let config = resolve_with(
            cli,
            &[
                ("ELASTICSEARCH_URL", "https://search.internal:9200"),
                ("SCROLL_INDEX", "from_env"),
                ("SCROLL_BATCH_SIZE", "6"),
                ("SCROLL_DURATION", "2m"),
                ("SCROLL_INSECURE_TLS", "true"),
            ],
        )
        .unwrap();

        assert_eq!(config.es_url, "https://search.internal:9200");
        assert_eq!(config.index, "from_flag");
        assert_eq!(config.batch_size, 6);
        assert_eq!(config.scroll_duration, Duration::from_secs(120));
        assert!(config.insecure_tls);
    }

    #[test]
    fn test_parses_command_line() {
        let cli = Cli::try_parse_from([
            "scroll-export",
            "--index",
            "logs",
            "--batch-size",
            "6",
            "--scroll-duration",
            "90s",
            "--set",
            "title=Document 3",
            "--insecure-tls",
        ])
        .unwrap();
        let config = resolve_with(cli, &[]).unwrap();

        assert_eq!(config.index, "logs");
        assert_eq!(config.batch_size, 6);
        assert_eq!(config.scroll_duration, Duration::from_secs(90));
        assert!(config.insecure_tls);
        assert_eq!(
            config.placeholders,
            vec![Placeholder::new("title", "Document 3")]
        );
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let zero_batch = Cli {
            batch_size: Some(0),
            ..Default::default()
        };
        assert_eq!(
            resolve_with(zero_batch, &[]).unwrap_err(),
            ConfigError::invalid("batch size", "must be at least 1")
        );

        assert!(resolve_with(Cli::default(), &[("ELASTICSEARCH_URL", "localhost")]).is_err());
        assert!(resolve_with(Cli::default(), &[("SCROLL_BATCH_SIZE", "many")]).is_err());
        assert!(resolve_with(Cli::default(), &[("SCROLL_DURATION", "0s")]).is_err());
        assert!(resolve_with(Cli::default(), &[("SCROLL_INSECURE_TLS", "maybe")]).is_err());

        let bad_index = Cli {
            index: Some("a/b".into()),
            ..Default::default()
        };
        assert!(resolve_with(bad_index, &[]).is_err());

        for index in ["logs?size=1#x", "logs#x", "my logs", "a|b"] {
            let cli = Cli {
                index: Some(index.into()),
                ..Default::default()
            };
            assert!(resolve_with(cli, &[]).is_err(), "{index} accepted");
        }

        let pattern = Cli {
            index: Some("logs-*,metrics".into()),
            ..Default::default()
        };
        assert!(resolve_with(pattern, &[]).is_ok());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("1d").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_overflow() {
        assert_eq!(
            parse_duration("400000000000000000h").unwrap_err(),
            "\"400000000000000000h\" is out of range"
        );
        assert!(parse_duration("400000000000000000m").is_err());
        assert!(resolve_with(Cli::default(), &[("SCROLL_DURATION", "400000000000000000h")]).is_err());
        assert!(
            resolve_with(Cli::default(), &[("SCROLL_REQUEST_TIMEOUT", "400000000000000000h")])
                .is_err()
        );
    }
}
