//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Error installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The level string does not parse as a filter.
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter {
        /// Offending filter.
        filter: String,
        /// Parser message.
        message: String,
    },
    /// A global subscriber is already set.
    #[error("tracing subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidFilter {
        filter: config.level.clone(),
        message: e.to_string(),
    })
}

/// Install the global subscriber: JSON lines or human-readable output.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.format == "pretty" {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_level_is_reported() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "order_engine=notalevel".to_string(),
            format: "json".to_string(),
        };
        assert!(matches!(
            env_filter(&config),
            Err(LoggingError::InvalidFilter { .. })
        ));
    }
}
