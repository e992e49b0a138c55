//! Risk configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::risk_management::{ExposureModel, RiskProfiles, SizingLimits};

/// Risk profiles, sizing limits and the exposure model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Mode name to parameters.
    pub profiles: RiskProfiles,
    /// Mode used when a caller names none.
    pub default_mode: String,
    /// Hard notional cap per position.
    pub max_position_notional: Decimal,
    /// Stop distance fraction when stop equals entry.
    pub default_stop_fraction: Decimal,
    /// Ticker to sector overrides; the built-in map when empty.
    pub sector_map: BTreeMap<String, String>,
    /// Ticker to correlated tickers; the built-in groups when empty.
    pub correlation_groups: BTreeMap<String, Vec<String>>,
    /// Daily bars fetched for ATR and volatility.
    pub volatility_lookback_days: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let limits = SizingLimits::default();
        Self {
            profiles: RiskProfiles::default(),
            default_mode: "conservative".to_string(),
            max_position_notional: limits.max_position_notional,
            default_stop_fraction: limits.default_stop_fraction,
            sector_map: BTreeMap::new(),
            correlation_groups: BTreeMap::new(),
            volatility_lookback_days: 30,
        }
    }
}

impl RiskConfig {
    /// Sizing limits.
    #[must_use]
    pub fn sizing_limits(&self) -> SizingLimits {
        SizingLimits {
            max_position_notional: self.max_position_notional,
            default_stop_fraction: self.default_stop_fraction,
        }
    }

    /// Exposure model with configured overrides applied.
    #[must_use]
    pub fn exposure_model(&self) -> ExposureModel {
        let mut model = ExposureModel::default();
        if !self.sector_map.is_empty() {
            model.sector_map = self
                .sector_map
                .iter()
                .map(|(symbol, sector)| (symbol.to_uppercase(), sector.clone()))
                .collect();
        }
        if !self.correlation_groups.is_empty() {
            model.correlation_groups = self
                .correlation_groups
                .iter()
                .map(|(symbol, peers)| {
                    (
                        symbol.to_uppercase(),
                        peers.iter().map(|peer| peer.to_uppercase()).collect(),
                    )
                })
                .collect();
        }
        model
    }
}
