//! Per-position risk scoring.

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::levels::StopAndTargets;
use super::portfolio::{Position, PositionSide};
use crate::domain::shared::Symbol;

/// Classification of an overall risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Score below 0.3.
    Low,
    /// Score below 0.6.
    Medium,
    /// Score below 0.8.
    High,
    /// Score of 0.8 or more.
    Extreme,
}

impl RiskLevel {
    /// Level for a score in [0, 1].
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            Self::Low
        } else if score < 0.6 {
            Self::Medium
        } else if score < 0.8 {
            Self::High
        } else {
            Self::Extreme
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Extreme => write!(f, "EXTREME"),
        }
    }
}

/// Inputs gathered for one held position.
#[derive(Debug, Clone)]
pub struct PositionRiskInput<'a> {
    /// Broker position.
    pub position: &'a Position,
    /// Latest price.
    pub current_price: Decimal,
    /// Portfolio value.
    pub portfolio_value: Decimal,
    /// Cash, for leverage.
    pub cash: Decimal,
    /// Stop and targets around the entry.
    pub levels: StopAndTargets,
    /// Minutes since the position opened, if known.
    pub minutes_held: Option<i64>,
    /// Timeout at which time risk saturates.
    pub timeout_minutes: u32,
    /// Daily return volatility.
    pub volatility: f64,
}

/// Risk snapshot of one position. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRisk {
    /// Instrument.
    pub symbol: Symbol,
    /// Unrealized P&L at the current price.
    pub unrealized_pnl: Decimal,
    /// P&L over cost basis.
    pub unrealized_pnl_percent: Decimal,
    /// `quantity × current_price`.
    pub position_value: Decimal,
    /// Position value over portfolio value.
    pub position_percent: Decimal,
    /// Position value over cash.
    pub leverage: Decimal,
    /// Distance to the stop.
    pub stop_distance: Decimal,
    /// Distance to the first target.
    pub target_distance: Decimal,
    /// Stop and targets used.
    pub levels: StopAndTargets,
    /// Holding-time score in [0, 1].
    pub time_risk: f64,
    /// Daily return volatility.
    pub volatility: f64,
    /// Weighted score in [0, 1].
    pub overall_risk_score: f64,
    /// Classification of the score.
    pub risk_level: RiskLevel,
}

impl PositionRisk {
    /// Score a position.
    #[must_use]
    pub fn assess(input: &PositionRiskInput<'_>) -> Self {
        let position = input.position;
        let quantity = Decimal::from(position.quantity);
        let unrealized_pnl = position.unrealized_pnl_at(input.current_price);
        let cost = position.cost_basis();
        let unrealized_pnl_percent = fraction(unrealized_pnl, cost);
        let position_value = quantity * input.current_price;
        let position_percent = fraction(position_value, input.portfolio_value);
        let leverage = fraction(position_value, input.cash);

        let (stop_distance, target_distance) = match position.side {
            PositionSide::Long => (
                input.current_price - input.levels.stop_loss,
                input.levels.take_profit_1 - input.current_price,
            ),
            PositionSide::Short => (
                input.levels.stop_loss - input.current_price,
                input.current_price - input.levels.take_profit_1,
            ),
        };

        let time_risk = match input.minutes_held {
            Some(minutes) if input.timeout_minutes > 0 => {
                let ratio = minutes.max(0) as f64 / f64::from(input.timeout_minutes);
                ratio.min(1.0)
            }
            _ => 0.0,
        };

        let risk_percent = unrealized_pnl_percent.abs().to_f64().unwrap_or(0.0);
        let position_share = position_percent.to_f64().unwrap_or(0.0);
        #[allow(clippy::suboptimal_flops)]
        let overall_risk_score = (risk_percent * 0.3
            + time_risk * 0.2
            + input.volatility * 10.0 * 0.2
            + position_share * 0.3)
            .clamp(0.0, 1.0);

        Self {
            symbol: position.symbol.clone(),
            unrealized_pnl,
            unrealized_pnl_percent,
            position_value,
            position_percent,
            leverage,
            stop_distance,
            target_distance,
            levels: input.levels.clone(),
            time_risk,
            volatility: input.volatility,
            overall_risk_score,
            risk_level: RiskLevel::from_score(overall_risk_score),
        }
    }
}

/// Fallback ATR when daily bars are insufficient: 2% of entry.
#[must_use]
pub fn fallback_atr(entry_price: Decimal) -> Decimal {
    entry_price * dec!(0.02)
}

/// Convert a statistic to a decimal, zero when not representable.
#[must_use]
pub fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

fn fraction(part: Decimal, whole: Decimal) -> Decimal {
    if whole > Decimal::ZERO {
        part / whole
    } else {
        Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::advanced_orders::OrderSide;
    use crate::domain::risk_management::RiskParameters;
    use test_case::test_case;

    #[test_case(0.0, RiskLevel::Low)]
    #[test_case(0.29, RiskLevel::Low)]
    #[test_case(0.3, RiskLevel::Medium)]
    #[test_case(0.6, RiskLevel::High)]
    #[test_case(0.8, RiskLevel::Extreme)]
    #[test_case(1.0, RiskLevel::Extreme)]
    fn levels_follow_thresholds(score: f64, expected: RiskLevel) {
        assert_eq!(RiskLevel::from_score(score), expected);
    }

    fn position() -> Position {
        Position {
            symbol: Symbol::new("AAPL"),
            quantity: 100,
            side: PositionSide::Long,
            average_entry_price: dec!(100),
            current_price: dec!(110),
            market_value: dec!(11000),
            unrealized_pnl: dec!(1000),
        }
    }

    fn input(position: &Position, minutes_held: Option<i64>, volatility: f64) -> PositionRiskInput<'_> {
        PositionRiskInput {
            position,
            current_price: dec!(110),
            portfolio_value: dec!(110000),
            cash: dec!(55000),
            levels: StopAndTargets::compute(
                dec!(100),
                dec!(2),
                OrderSide::Buy,
                &RiskParameters::conservative(),
            )
            .unwrap(),
            minutes_held,
            timeout_minutes: 120,
            volatility,
        }
    }

    #[test]
    fn score_weights_components() {
        let held = position();
        let risk = PositionRisk::assess(&input(&held, Some(60), 0.01));
        assert_eq!(risk.unrealized_pnl, dec!(1000));
        assert_eq!(risk.unrealized_pnl_percent, dec!(0.1));
        assert_eq!(risk.position_percent, dec!(0.1));
        assert_eq!(risk.leverage, dec!(0.2));
        assert_eq!(risk.stop_distance, dec!(14));
        assert!((risk.time_risk - 0.5).abs() < 1e-9);
        // 0.1*0.3 + 0.5*0.2 + 0.01*10*0.2 + 0.1*0.3
        assert!((risk.overall_risk_score - 0.18).abs() < 1e-9);
        assert_eq!(risk.risk_level, RiskLevel::Low);
    }

    #[test]
    fn score_is_clamped_and_time_saturates() {
        let held = position();
        let risk = PositionRisk::assess(&input(&held, Some(10_000), 1.0));
        assert!((risk.time_risk - 1.0).abs() < 1e-9);
        assert!((risk.overall_risk_score - 1.0).abs() < 1e-9);
        assert_eq!(risk.risk_level, RiskLevel::Extreme);
    }

    #[test]
    fn unknown_open_time_has_no_time_risk() {
        let held = position();
        let risk = PositionRisk::assess(&input(&held, None, 0.0));
        assert!(risk.time_risk.abs() < f64::EPSILON);
    }
}
