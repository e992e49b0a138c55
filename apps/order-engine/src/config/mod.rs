//! Configuration module for the order engine.
//!
//! YAML configuration with environment variable interpolation. Every
//! section has defaults, so an empty file is a valid paper-trading setup.
//!
//! # Usage
//!
//! ```rust,ignore
//! use order_engine::config::load_config;
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! println!("tick every {:?}", config.monitor.tick_interval());
//! ```

mod brokers;
mod monitor;
mod observability;
mod risk;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use brokers::{AlpacaSettings, BrokerConfig};
pub use monitor::MonitorConfig;
pub use observability::{LoggingConfig, MetricsSettings, ObservabilityConfig};
pub use risk::RiskConfig;

use crate::broker::RetryPolicy;
use crate::domain::execution_tactics::SlicingPolicy;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "ORDER_ENGINE_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Broker configuration.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Order monitor cadence.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// TWAP/VWAP slicing limits.
    #[serde(default)]
    pub execution: SlicingPolicy,
    /// Retry policy for reads and cancels.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Risk profiles and limits.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// The path defaults to `$ORDER_ENGINE_CONFIG`, then `config.yaml`.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let env_path = std::env::var(CONFIG_PATH_ENV).ok();
    let path = path.or(env_path.as_deref()).unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax. Unset or empty
/// variables without a default become empty strings.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
pub fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let default_value = caps.get(2).map_or("", |m| m.as_str());
        match std::env::var(&caps[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration values.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let alpaca = &config.broker.alpaca;
    let valid_modes = ["PAPER", "LIVE"];
    if !valid_modes.contains(&alpaca.environment.to_uppercase().as_str()) {
        return Err(invalid(format!(
            "broker.alpaca.environment must be one of: {valid_modes:?}"
        )));
    }
    if alpaca.is_live() && !alpaca.has_credentials() {
        return Err(invalid(
            "LIVE trading requires broker.alpaca.api_key and api_secret",
        ));
    }
    if alpaca.timeout_secs == 0 {
        return Err(invalid("broker.alpaca.timeout_secs must be positive"));
    }

    let monitor = &config.monitor;
    if monitor.tick_interval_secs == 0 {
        return Err(invalid("monitor.tick_interval_secs must be positive"));
    }
    if monitor.error_backoff_secs <= monitor.tick_interval_secs {
        return Err(invalid(
            "monitor.error_backoff_secs must be longer than tick_interval_secs",
        ));
    }

    let execution = &config.execution;
    if execution.max_intervals == 0 || execution.min_interval_minutes == 0 {
        return Err(invalid(
            "execution.twap_max_intervals and twap_min_interval_minutes must be positive",
        ));
    }
    if execution.vwap_min_bars == 0 {
        return Err(invalid("execution.vwap_min_bars must be positive"));
    }

    let retry = &config.retry;
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        return Err(invalid(
            "retry.initial_backoff_ms must not exceed max_backoff_ms",
        ));
    }
    if retry.backoff_multiplier < 1.0 || !(0.0..=1.0).contains(&retry.jitter_factor) {
        return Err(invalid(
            "retry.backoff_multiplier must be >= 1 and jitter_factor in [0, 1]",
        ));
    }

    let risk = &config.risk;
    for (mode, params) in risk.profiles.iter() {
        params
            .validate()
            .map_err(|reason| invalid(format!("risk.profiles.{mode}: {reason}")))?;
    }
    if risk.profiles.get(&risk.default_mode).is_none() {
        return Err(invalid(format!(
            "risk.default_mode '{}' is not a configured profile",
            risk.default_mode
        )));
    }
    if risk.max_position_notional <= Decimal::ZERO {
        return Err(invalid("risk.max_position_notional must be positive"));
    }
    if risk.default_stop_fraction <= Decimal::ZERO || risk.default_stop_fraction > Decimal::ONE {
        return Err(invalid("risk.default_stop_fraction must be in (0, 1]"));
    }

    let observability = &config.observability;
    if !["json", "pretty"].contains(&observability.logging.format.as_str()) {
        return Err(invalid("observability.logging.format must be json or pretty"));
    }
    if observability.metrics.enabled
        && observability
            .metrics
            .listen_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        return Err(invalid(format!(
            "observability.metrics.listen_addr '{}' is not a socket address",
            observability.metrics.listen_addr
        )));
    }

    Ok(())
}
