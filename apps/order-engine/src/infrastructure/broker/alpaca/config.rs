//! Alpaca adapter configuration.

use std::time::Duration;

use super::error::AlpacaError;
use crate::broker::RetryPolicy;
use crate::config::AlpacaSettings;

/// Environment for Alpaca API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlpacaEnvironment {
    /// Paper trading (simulated).
    Paper,
    /// Live trading (real money).
    Live,
}

impl AlpacaEnvironment {
    /// Parse `PAPER` or `LIVE`, case-insensitively.
    pub fn parse(value: &str) -> Result<Self, AlpacaError> {
        match value.to_ascii_uppercase().as_str() {
            "PAPER" => Ok(Self::Paper),
            "LIVE" => Ok(Self::Live),
            other => Err(AlpacaError::Configuration(format!(
                "unknown environment '{other}'"
            ))),
        }
    }

    /// Get the base URL for the trading API.
    #[must_use]
    pub const fn trading_base_url(&self) -> &'static str {
        match self {
            Self::Paper => "https://paper-api.alpaca.markets",
            Self::Live => "https://api.alpaca.markets",
        }
    }

    /// Get the base URL for the market data API.
    #[must_use]
    pub const fn data_base_url(&self) -> &'static str {
        "https://data.alpaca.markets"
    }

    /// Check if this is live trading.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl std::fmt::Display for AlpacaEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "PAPER"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

/// Configuration for the Alpaca broker and market data adapters.
#[derive(Clone)]
pub struct AlpacaConfig {
    /// API key.
    pub api_key: String,
    /// API secret.
    pub api_secret: String,
    /// Trading environment.
    pub environment: AlpacaEnvironment,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Transport-level retry policy.
    pub retry: RetryPolicy,
    /// Trading API base URL.
    pub trading_url: String,
    /// Market data API base URL.
    pub data_url: String,
}

impl std::fmt::Debug for AlpacaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaConfig")
            .field("environment", &self.environment)
            .field("timeout", &self.timeout)
            .field("trading_url", &self.trading_url)
            .field("data_url", &self.data_url)
            .finish_non_exhaustive()
    }
}

impl AlpacaConfig {
    /// Create a new configuration with the environment's default endpoints.
    #[must_use]
    pub fn new(api_key: String, api_secret: String, environment: AlpacaEnvironment) -> Self {
        Self {
            api_key,
            api_secret,
            environment,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            trading_url: environment.trading_base_url().to_string(),
            data_url: environment.data_base_url().to_string(),
        }
    }

    /// Build from the `broker.alpaca` config section.
    pub fn from_settings(settings: &AlpacaSettings, retry: &RetryPolicy) -> Result<Self, AlpacaError> {
        let environment = AlpacaEnvironment::parse(&settings.environment)?;
        let mut config = Self::new(
            settings.api_key.clone(),
            settings.api_secret.clone(),
            environment,
        )
        .with_timeout(Duration::from_secs(settings.timeout_secs))
        .with_retry(retry.clone());
        if let Some(url) = &settings.trading_url {
            config.trading_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = &settings.data_url {
            config.data_url = url.trim_end_matches('/').to_string();
        }
        Ok(config)
    }

    /// Point both APIs at `base_url`.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        self.trading_url = base_url.to_string();
        self.data_url = base_url.to_string();
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_environment_urls() {
        let env = AlpacaEnvironment::Paper;
        assert!(env.trading_base_url().contains("paper"));
        assert!(!env.is_live());
    }

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!(AlpacaEnvironment::parse("live").unwrap(), AlpacaEnvironment::Live);
        assert_eq!(AlpacaEnvironment::parse("Paper").unwrap(), AlpacaEnvironment::Paper);
        assert!(AlpacaEnvironment::parse("demo").is_err());
    }

    #[test]
    fn settings_overrides_apply() {
        let settings = AlpacaSettings {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            timeout_secs: 5,
            trading_url: Some("http://localhost:8080/".to_string()),
            ..AlpacaSettings::default()
        };
        let config = AlpacaConfig::from_settings(&settings, &RetryPolicy::disabled()).unwrap();

        assert_eq!(config.environment, AlpacaEnvironment::Paper);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.trading_url, "http://localhost:8080");
        assert_eq!(config.data_url, "https://data.alpaca.markets");
        assert_eq!(config.retry.max_attempts, 0);
    }

    #[test]
    fn debug_hides_credentials() {
        let config = AlpacaConfig::new(
            "key".to_string(),
            "super-secret".to_string(),
            AlpacaEnvironment::Live,
        );
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn environment_display() {
        assert_eq!(format!("{}", AlpacaEnvironment::Paper), "PAPER");
        assert_eq!(format!("{}", AlpacaEnvironment::Live), "LIVE");
    }
}
