//! Logging configuration and initialization.
//!
//! `RUST_LOG` wins when set; otherwise the `[log]` table of the stack's
//! config picks the level and output format.

use serde::Deserialize;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Logging configuration (`[log]` table).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
    /// Output format: pretty, compact, json
    pub format: String,
}

impl LogConfig {
    pub fn new() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogFormat {
    Pretty,
    Compact,
    /// One JSON object per event; session spans are reported when they close
    Json,
}

impl LogFormat {
    pub(crate) fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Initializes the global tracing subscriber.
///
/// Unknown levels fall back to info and unknown formats to pretty;
/// `config::validate` warns about both. Only the first call installs a
/// subscriber; later calls are no-ops.
pub fn init_logging(config: Option<&LogConfig>) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(config_level(config).as_str()),
    };

    let format = config
        .and_then(|c| LogFormat::parse(&c.format))
        .unwrap_or(LogFormat::Pretty);

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => install(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE),
            ),
        ),
        LogFormat::Compact => install(registry.with(tracing_subscriber::fmt::layer().compact())),
        LogFormat::Pretty => install(registry.with(tracing_subscriber::fmt::layer())),
    }
}

fn install<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    // Err only means a subscriber is already installed
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn config_level(config: Option<&LogConfig>) -> Level {
    config
        .and_then(|c| parse_level(&c.level))
        .unwrap_or(Level::INFO)
}

/// Parses a case-insensitive level name.
pub(crate) fn parse_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
