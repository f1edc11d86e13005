//! Process-wide log setup for the daemon.
//!
//! Library code logs through the `log` macros; [`init`] routes those records
//! into a `tracing` subscriber that prints text or JSON lines.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

const DEFAULT_FILTER: &str = "info";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Picks the filter: `RUST_LOG`, else the configured directive, else `info`.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directive).map_err(|source| LoggingError::Filter {
        directive: directive.to_string(),
        source,
    })
}

/// Installs the global subscriber and the `log` bridge. Call once at startup.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    let fmt = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer().with_target(true).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(())
}
