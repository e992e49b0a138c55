//! Broker configuration.

use serde::{Deserialize, Serialize};

/// Broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrokerConfig {
    /// Alpaca broker configuration.
    #[serde(default)]
    pub alpaca: AlpacaSettings,
}

/// Alpaca credentials and endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlpacaSettings {
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// API secret.
    #[serde(default)]
    pub api_secret: String,
    /// `PAPER` or `LIVE`.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Trading API override.
    #[serde(default)]
    pub trading_url: Option<String>,
    /// Market data API override.
    #[serde(default)]
    pub data_url: Option<String>,
}

impl AlpacaSettings {
    /// Both key and secret present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    /// Live trading selected.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.environment.eq_ignore_ascii_case("LIVE")
    }
}

impl Default for AlpacaSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            environment: default_environment(),
            timeout_secs: default_timeout_secs(),
            trading_url: None,
            data_url: None,
        }
    }
}

fn default_environment() -> String {
    "PAPER".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}
