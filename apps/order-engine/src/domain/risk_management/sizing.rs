//! Position sizing pipeline.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::parameters::RiskParameters;

/// Mode-independent sizing limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingLimits {
    /// Hard cap on position notional.
    pub max_position_notional: Decimal,
    /// Stop distance as a fraction of entry when stop equals entry.
    pub default_stop_fraction: Decimal,
}

impl Default for SizingLimits {
    fn default() -> Self {
        Self {
            max_position_notional: dec!(10000),
            default_stop_fraction: dec!(0.02),
        }
    }
}

/// Snapshot the sizer works from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizingInput {
    /// Planned entry.
    pub entry_price: Decimal,
    /// Planned stop.
    pub stop_loss: Decimal,
    /// Portfolio value.
    pub portfolio_value: Decimal,
    /// Cash, for leverage.
    pub cash: Decimal,
    /// Shares already held in the symbol.
    pub existing_quantity: Option<u64>,
    /// Sector share of the symbol's sector.
    pub sector_exposure: Decimal,
    /// Correlation with existing holdings.
    pub correlation: Decimal,
    /// Daily P&L so far.
    pub daily_pnl: Decimal,
}

/// A reduction step that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizingAdjustment {
    /// Capped at half of the existing position.
    ExistingPosition,
    /// Halved for sector concentration.
    SectorExposure,
    /// Cut 30% for correlation.
    Correlation,
    /// Cut 70% after daily losses.
    DailyLoss,
    /// Raised to one share.
    MinimumShare,
    /// Capped by the notional ceiling.
    NotionalCeiling,
}

/// Result of sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingMetrics {
    /// Final share count.
    pub quantity: u64,
    /// `quantity × entry`.
    pub position_value: Decimal,
    /// `position_value / portfolio_value`.
    pub position_percent: Decimal,
    /// Capital at risk budget.
    pub risk_amount: Decimal,
    /// Distance from entry to stop.
    pub stop_distance: Decimal,
    /// `quantity × stop_distance`.
    pub max_loss: Decimal,
    /// `position_value / cash`, zero without cash.
    pub leverage: Decimal,
    /// Reductions applied, in order.
    pub adjustments: Vec<SizingAdjustment>,
}

/// Size a new position.
///
/// The raw size `floor(risk / stop distance)` passes through the reduction
/// steps in a fixed order, truncating after each. The order matters.
#[must_use]
pub fn size_position(
    params: &RiskParameters,
    limits: &SizingLimits,
    input: &SizingInput,
) -> SizingMetrics {
    let risk_amount = input.portfolio_value * params.max_position_size;
    let mut stop_distance = (input.entry_price - input.stop_loss).abs();
    if stop_distance.is_zero() {
        stop_distance = input.entry_price * limits.default_stop_fraction;
    }

    let mut adjustments = Vec::new();
    let mut quantity = if stop_distance > Decimal::ZERO {
        whole_shares(risk_amount / stop_distance)
    } else {
        0
    };

    if let Some(existing) = input.existing_quantity {
        let cap = existing / 2;
        if cap < quantity {
            quantity = cap;
            adjustments.push(SizingAdjustment::ExistingPosition);
        }
    }
    if input.sector_exposure > params.max_sector_exposure {
        quantity = scale(quantity, dec!(0.5));
        adjustments.push(SizingAdjustment::SectorExposure);
    }
    if input.correlation > params.max_correlation {
        quantity = scale(quantity, dec!(0.7));
        adjustments.push(SizingAdjustment::Correlation);
    }
    let daily_fraction = if input.portfolio_value > Decimal::ZERO {
        input.daily_pnl / input.portfolio_value
    } else {
        Decimal::ZERO
    };
    if daily_fraction < -params.max_daily_loss {
        quantity = scale(quantity, dec!(0.3));
        adjustments.push(SizingAdjustment::DailyLoss);
    }
    if quantity == 0 {
        quantity = 1;
        adjustments.push(SizingAdjustment::MinimumShare);
    }
    if input.entry_price > Decimal::ZERO {
        let ceiling = whole_shares(limits.max_position_notional / input.entry_price);
        if ceiling < quantity {
            quantity = ceiling;
            adjustments.push(SizingAdjustment::NotionalCeiling);
        }
    }

    let position_value = Decimal::from(quantity) * input.entry_price;
    SizingMetrics {
        quantity,
        position_value,
        position_percent: if input.portfolio_value > Decimal::ZERO {
            position_value / input.portfolio_value
        } else {
            Decimal::ZERO
        },
        risk_amount,
        stop_distance,
        max_loss: Decimal::from(quantity) * stop_distance,
        leverage: if input.cash > Decimal::ZERO {
            position_value / input.cash
        } else {
            Decimal::ZERO
        },
        adjustments,
    }
}

fn whole_shares(value: Decimal) -> u64 {
    value.floor().to_u64().unwrap_or(0)
}

fn scale(quantity: u64, factor: Decimal) -> u64 {
    whole_shares(Decimal::from(quantity) * factor)
}
