//! ATR-based stop and target placement.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::parameters::RiskParameters;
use crate::domain::advanced_orders::OrderSide;

/// Stop, targets and the reward/risk ratio for an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAndTargets {
    /// Protective stop.
    pub stop_loss: Decimal,
    /// First target.
    pub take_profit_1: Decimal,
    /// Second target at 1.5 × the first target distance.
    pub take_profit_2: Decimal,
    /// `atr × stop multiplier`.
    pub stop_distance: Decimal,
    /// `atr × target multiplier`.
    pub target_distance: Decimal,
    /// `target_distance / stop_distance`.
    pub risk_reward_ratio: Decimal,
}

impl StopAndTargets {
    /// Levels around `entry_price`; `None` unless `atr` is positive.
    #[must_use]
    pub fn compute(
        entry_price: Decimal,
        atr: Decimal,
        side: OrderSide,
        params: &RiskParameters,
    ) -> Option<Self> {
        if atr <= Decimal::ZERO {
            return None;
        }
        let stop_distance = atr * params.stop_loss_atr_multiplier;
        let target_distance = atr * params.take_profit_atr_multiplier;
        let second_distance = target_distance * dec!(1.5);

        let (stop_loss, take_profit_1, take_profit_2) = match side {
            OrderSide::Buy => (
                entry_price - stop_distance,
                entry_price + target_distance,
                entry_price + second_distance,
            ),
            OrderSide::Sell => (
                entry_price + stop_distance,
                entry_price - target_distance,
                entry_price - second_distance,
            ),
        };

        Some(Self {
            stop_loss,
            take_profit_1,
            take_profit_2,
            stop_distance,
            target_distance,
            risk_reward_ratio: target_distance / stop_distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_levels_bracket_the_entry() {
        let levels =
            StopAndTargets::compute(dec!(100), dec!(2), OrderSide::Buy, &RiskParameters::conservative())
                .unwrap();
        assert_eq!(levels.stop_loss, dec!(96));
        assert_eq!(levels.take_profit_1, dec!(106));
        assert_eq!(levels.take_profit_2, dec!(109));
        assert_eq!(levels.risk_reward_ratio, dec!(1.5));
    }

    #[test]
    fn short_levels_mirror() {
        let levels =
            StopAndTargets::compute(dec!(100), dec!(2), OrderSide::Sell, &RiskParameters::aggressive())
                .unwrap();
        assert_eq!(levels.stop_loss, dec!(103));
        assert_eq!(levels.take_profit_1, dec!(96));
        assert_eq!(levels.take_profit_2, dec!(94));
    }

    #[test]
    fn zero_atr_has_no_levels() {
        assert!(
            StopAndTargets::compute(dec!(100), dec!(0), OrderSide::Buy, &RiskParameters::conservative())
                .is_none()
        );
    }
}
