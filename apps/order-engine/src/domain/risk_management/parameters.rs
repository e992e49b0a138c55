//! Risk profiles.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Limits for one risk mode. Fractions are of portfolio value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Capital put at risk per position.
    pub max_position_size: Decimal,
    /// Daily loss that halts new risk.
    pub max_daily_loss: Decimal,
    /// Drawdown from the equity high-water mark.
    pub max_drawdown: Decimal,
    /// Holding time at which time risk saturates.
    pub position_timeout_minutes: u32,
    /// Stop distance in ATRs.
    pub stop_loss_atr_multiplier: Decimal,
    /// First target distance in ATRs.
    pub take_profit_atr_multiplier: Decimal,
    /// Correlation above which new size is cut.
    pub max_correlation: Decimal,
    /// Sector share above which new size is cut.
    pub max_sector_exposure: Decimal,
}

impl RiskParameters {
    /// Conservative profile.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            max_position_size: dec!(0.05),
            max_daily_loss: dec!(0.02),
            max_drawdown: dec!(0.05),
            position_timeout_minutes: 120,
            stop_loss_atr_multiplier: dec!(2.0),
            take_profit_atr_multiplier: dec!(3.0),
            max_correlation: dec!(0.7),
            max_sector_exposure: dec!(0.3),
        }
    }

    /// Aggressive profile.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            max_position_size: dec!(0.10),
            max_daily_loss: dec!(0.05),
            max_drawdown: dec!(0.10),
            position_timeout_minutes: 60,
            stop_loss_atr_multiplier: dec!(1.5),
            take_profit_atr_multiplier: dec!(2.0),
            max_correlation: dec!(0.8),
            max_sector_exposure: dec!(0.4),
        }
    }

    /// Every fraction in (0, 1], multipliers and timeout positive.
    pub fn validate(&self) -> Result<(), String> {
        let fractions = [
            ("max_position_size", self.max_position_size),
            ("max_daily_loss", self.max_daily_loss),
            ("max_drawdown", self.max_drawdown),
            ("max_correlation", self.max_correlation),
            ("max_sector_exposure", self.max_sector_exposure),
        ];
        for (name, value) in fractions {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                return Err(format!("{name} must be in (0, 1], got {value}"));
            }
        }
        if self.stop_loss_atr_multiplier <= Decimal::ZERO
            || self.take_profit_atr_multiplier <= Decimal::ZERO
        {
            return Err("ATR multipliers must be positive".to_string());
        }
        if self.position_timeout_minutes == 0 {
            return Err("position_timeout_minutes must be positive".to_string());
        }
        Ok(())
    }
}

/// Named risk profiles. Lookup is case-insensitive and `safe` aliases
/// `conservative`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskProfiles(BTreeMap<String, RiskParameters>);

impl RiskProfiles {
    /// Profiles from a name map; names are lowercased.
    #[must_use]
    pub fn new(profiles: BTreeMap<String, RiskParameters>) -> Self {
        Self(
            profiles
                .into_iter()
                .map(|(name, params)| (name.to_lowercase(), params))
                .collect(),
        )
    }

    /// Parameters for `mode`.
    #[must_use]
    pub fn get(&self, mode: &str) -> Option<&RiskParameters> {
        let mode = mode.to_lowercase();
        self.0.get(&mode).or_else(|| {
            (mode == "safe")
                .then(|| self.0.get("conservative"))
                .flatten()
        })
    }

    /// Add or replace a profile.
    pub fn insert(&mut self, mode: &str, params: RiskParameters) {
        self.0.insert(mode.to_lowercase(), params);
    }

    /// Profile names.
    pub fn modes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate name and parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RiskParameters)> {
        self.0.iter().map(|(name, params)| (name.as_str(), params))
    }
}

impl Default for RiskProfiles {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert("conservative".to_string(), RiskParameters::conservative());
        profiles.insert("aggressive".to_string(), RiskParameters::aggressive());
        Self(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_with_safe_alias() {
        let profiles = RiskProfiles::default();
        assert_eq!(
            profiles.get("SAFE"),
            Some(&RiskParameters::conservative())
        );
        assert_eq!(
            profiles.get("Aggressive"),
            Some(&RiskParameters::aggressive())
        );
        assert!(profiles.get("yolo").is_none());
    }

    #[test]
    fn builtin_profiles_validate() {
        for (_, params) in RiskProfiles::default().iter() {
            assert!(params.validate().is_ok());
        }
    }

    #[test]
    fn fraction_above_one_is_rejected() {
        let params = RiskParameters {
            max_drawdown: dec!(1.5),
            ..RiskParameters::conservative()
        };
        assert!(params.validate().unwrap_err().contains("max_drawdown"));
    }
}
