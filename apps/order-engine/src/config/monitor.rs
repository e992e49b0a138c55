//! Order monitor cadence.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Monitor loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Start the monitor with the engine.
    pub enabled: bool,
    /// Pause between ticks.
    pub tick_interval_secs: u64,
    /// Pause after a tick in which every order update failed.
    pub error_backoff_secs: u64,
    /// Pause before restarting a panicked loop.
    pub restart_backoff_secs: u64,
    /// Give up after this many restarts; unlimited when unset.
    pub max_restarts: Option<u32>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: 5,
            error_backoff_secs: 10,
            restart_backoff_secs: 1,
            max_restarts: None,
        }
    }
}

impl MonitorConfig {
    /// Tick interval.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Backoff after a tick in which every order update failed.
    #[must_use]
    pub const fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    /// Backoff before a restart.
    #[must_use]
    pub const fn restart_backoff(&self) -> Duration {
        Duration::from_secs(self.restart_backoff_secs)
    }
}
