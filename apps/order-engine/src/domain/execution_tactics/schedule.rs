//! TWAP and VWAP schedules.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::advanced_orders::{OrderError, OrderSide};
use crate::domain::shared::{Bar, Symbol};

/// Where the shares lost to integer division go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemainderAllocation {
    /// Add the remainder to the last slice.
    #[default]
    Last,
    /// Add the remainder to the first slice.
    First,
    /// Leave the remainder unexecuted.
    Drop,
}

/// Limits shared by both slicing algorithms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlicingPolicy {
    /// Cap on TWAP intervals.
    #[serde(rename = "twap_max_intervals")]
    pub max_intervals: u32,
    /// Shortest TWAP interval, in minutes.
    #[serde(rename = "twap_min_interval_minutes")]
    pub min_interval_minutes: u32,
    /// Bars needed before VWAP trusts the volume profile.
    pub vwap_min_bars: usize,
    /// Pause between VWAP slices, in seconds.
    #[serde(rename = "vwap_bar_interval_secs")]
    pub vwap_slice_seconds: u64,
    /// Remainder handling.
    #[serde(rename = "remainder_allocation")]
    pub remainder: RemainderAllocation,
}

impl Default for SlicingPolicy {
    fn default() -> Self {
        Self {
            max_intervals: 10,
            min_interval_minutes: 2,
            vwap_min_bars: 10,
            vwap_slice_seconds: 60,
            remainder: RemainderAllocation::Last,
        }
    }
}

/// Parameters for a TWAP or VWAP run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceRequest {
    /// Instrument.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Shares to work.
    pub total_quantity: u64,
    /// Window, in minutes.
    pub duration_minutes: u32,
    /// Skip slices priced beyond this.
    pub price_limit: Option<Decimal>,
}

impl SliceRequest {
    /// Run with no price limit.
    #[must_use]
    pub fn new(
        symbol: impl Into<Symbol>,
        side: OrderSide,
        total_quantity: u64,
        duration_minutes: u32,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            total_quantity,
            duration_minutes,
            price_limit: None,
        }
    }

    /// Skip slices priced beyond `limit`.
    #[must_use]
    pub const fn with_price_limit(mut self, limit: Decimal) -> Self {
        self.price_limit = Some(limit);
        self
    }

    /// Positive quantity, window of at least one interval.
    pub fn validate(&self, policy: &SlicingPolicy) -> Result<(), OrderError> {
        if self.symbol.is_empty() {
            return Err(OrderError::EmptySymbol);
        }
        if self.total_quantity == 0 {
            return Err(OrderError::NonPositiveQuantity {
                field: "total quantity",
            });
        }
        let minimum = policy.min_interval_minutes.max(1);
        if self.duration_minutes < minimum {
            return Err(OrderError::DurationTooShort {
                minutes: self.duration_minutes,
                minimum,
            });
        }
        if let Some(limit) = self.price_limit
            && limit <= Decimal::ZERO
        {
            return Err(OrderError::NonPositivePrice {
                field: "price limit",
                value: limit,
            });
        }
        Ok(())
    }
}

/// Buying above the limit or selling below it.
#[must_use]
pub fn violates_price_limit(side: OrderSide, price: Decimal, limit: Option<Decimal>) -> bool {
    match (side, limit) {
        (_, None) => false,
        (OrderSide::Buy, Some(limit)) => price > limit,
        (OrderSide::Sell, Some(limit)) => price < limit,
    }
}

/// Even split of a window into intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapPlan {
    /// Interval length, in minutes.
    pub interval_minutes: u32,
    /// Shares per interval.
    pub quantities: Vec<u64>,
}

impl TwapPlan {
    /// `min(max_intervals, duration / min_interval)` intervals of
    /// `duration / intervals` minutes each.
    #[must_use]
    pub fn plan(total_quantity: u64, duration_minutes: u32, policy: &SlicingPolicy) -> Self {
        let min_interval = policy.min_interval_minutes.max(1);
        let intervals = policy
            .max_intervals
            .min(duration_minutes / min_interval)
            .max(1);
        let interval_minutes = duration_minutes / intervals;

        let count = intervals as usize;
        let base = total_quantity / u64::from(intervals);
        let remainder = total_quantity % u64::from(intervals);
        let mut quantities = vec![base; count];
        allocate_remainder(&mut quantities, remainder, policy.remainder, |_| true);

        Self {
            interval_minutes,
            quantities,
        }
    }

    /// Number of intervals.
    #[must_use]
    pub fn interval_count(&self) -> u32 {
        self.quantities.len() as u32
    }

    /// Shares the plan will send.
    #[must_use]
    pub fn planned_quantity(&self) -> u64 {
        self.quantities.iter().sum()
    }
}

/// One VWAP slice keyed to a historical bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VwapSlice {
    /// Index of the source bar.
    pub bar_index: usize,
    /// Bar volume over window volume.
    pub volume_weight: Decimal,
    /// Shares for this slice.
    pub quantity: u64,
    /// `(high + low + close) / 3` of the source bar.
    pub typical_price: Decimal,
}

/// Volume-weighted split across historical bars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VwapPlan {
    /// Slices in bar order.
    pub slices: Vec<VwapSlice>,
}

impl VwapPlan {
    /// `floor(volume_i * total / Σvolume)` shares per bar.
    ///
    /// Returns `None` when the bars carry no volume.
    #[must_use]
    pub fn plan(bars: &[Bar], total_quantity: u64, remainder: RemainderAllocation) -> Option<Self> {
        let total_volume: u128 = bars.iter().map(|bar| u128::from(bar.volume)).sum();
        if total_volume == 0 {
            return None;
        }
        let volume_sum = Decimal::from(total_volume);

        let mut quantities: Vec<u64> = bars
            .iter()
            .map(|bar| {
                let share = u128::from(bar.volume) * u128::from(total_quantity) / total_volume;
                u64::try_from(share).unwrap_or(u64::MAX)
            })
            .collect();
        let allocated: u64 = quantities.iter().sum();
        allocate_remainder(
            &mut quantities,
            total_quantity.saturating_sub(allocated),
            remainder,
            |i| bars[i].volume > 0,
        );

        let slices = bars
            .iter()
            .zip(quantities)
            .enumerate()
            .map(|(bar_index, (bar, quantity))| VwapSlice {
                bar_index,
                volume_weight: Decimal::from(bar.volume) / volume_sum,
                quantity,
                typical_price: bar.typical_price(),
            })
            .collect();
        Some(Self { slices })
    }

    /// Shares the plan will send.
    #[must_use]
    pub fn planned_quantity(&self) -> u64 {
        self.slices.iter().map(|slice| slice.quantity).sum()
    }
}

fn allocate_remainder(
    quantities: &mut [u64],
    remainder: u64,
    allocation: RemainderAllocation,
    eligible: impl Fn(usize) -> bool,
) {
    if remainder == 0 {
        return;
    }
    let target = match allocation {
        RemainderAllocation::Last => (0..quantities.len()).rev().find(|&i| eligible(i)),
        RemainderAllocation::First => (0..quantities.len()).find(|&i| eligible(i)),
        RemainderAllocation::Drop => None,
    };
    if let Some(i) = target {
        quantities[i] += remainder;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn bar(volume: u64, close: Decimal) -> Bar {
        Bar {
            timestamp: Utc::now(),
            open: close,
            high: close + dec!(1),
            low: close - dec!(1),
            close,
            volume,
        }
    }

    #[test_case(10, 5, 2)]
    #[test_case(60, 10, 6)]
    #[test_case(3, 1, 3)]
    #[test_case(25, 10, 2)]
    fn twap_interval_count(duration: u32, intervals: u32, minutes: u32) {
        let plan = TwapPlan::plan(1_000, duration, &SlicingPolicy::default());
        assert_eq!(plan.interval_count(), intervals);
        assert_eq!(plan.interval_minutes, minutes);
    }

    #[test]
    fn twap_remainder_goes_last_by_default() {
        let plan = TwapPlan::plan(1_003, 10, &SlicingPolicy::default());
        assert_eq!(plan.quantities, vec![200, 200, 200, 200, 203]);
        assert_eq!(plan.planned_quantity(), 1_003);
    }

    #[test]
    fn twap_remainder_can_be_dropped() {
        let policy = SlicingPolicy {
            remainder: RemainderAllocation::Drop,
            ..SlicingPolicy::default()
        };
        let plan = TwapPlan::plan(1_003, 10, &policy);
        assert_eq!(plan.quantities, vec![200; 5]);
    }

    #[test]
    fn twap_remainder_can_go_first() {
        let policy = SlicingPolicy {
            remainder: RemainderAllocation::First,
            ..SlicingPolicy::default()
        };
        let plan = TwapPlan::plan(7, 4, &policy);
        assert_eq!(plan.quantities, vec![4, 3]);
    }

    #[test]
    fn duration_below_minimum_is_rejected() {
        let request = SliceRequest::new("AAPL", OrderSide::Buy, 100, 1);
        assert_eq!(
            request.validate(&SlicingPolicy::default()),
            Err(OrderError::DurationTooShort {
                minutes: 1,
                minimum: 2
            })
        );
    }

    #[test_case(OrderSide::Buy, dec!(101), true)]
    #[test_case(OrderSide::Buy, dec!(100), false)]
    #[test_case(OrderSide::Sell, dec!(99), true)]
    #[test_case(OrderSide::Sell, dec!(100), false)]
    fn price_limit(side: OrderSide, price: Decimal, violated: bool) {
        assert_eq!(violates_price_limit(side, price, Some(dec!(100))), violated);
        assert!(!violates_price_limit(side, price, None));
    }

    #[test]
    fn vwap_weights_follow_volume() {
        let bars = vec![bar(100, dec!(10)), bar(300, dec!(11)), bar(600, dec!(12))];
        let plan = VwapPlan::plan(&bars, 1_000, RemainderAllocation::Last).unwrap();
        let quantities: Vec<_> = plan.slices.iter().map(|s| s.quantity).collect();
        assert_eq!(quantities, vec![100, 300, 600]);
        assert_eq!(plan.slices[1].volume_weight, dec!(0.3));
        assert_eq!(plan.slices[2].typical_price, dec!(12));
    }

    #[test]
    fn vwap_floor_remainder_lands_on_last_traded_bar() {
        let bars = vec![bar(1, dec!(10)), bar(1, dec!(10)), bar(1, dec!(10)), bar(0, dec!(10))];
        let plan = VwapPlan::plan(&bars, 10, RemainderAllocation::Last).unwrap();
        let quantities: Vec<_> = plan.slices.iter().map(|s| s.quantity).collect();
        assert_eq!(quantities, vec![3, 3, 4, 0]);
    }

    #[test]
    fn vwap_without_volume_has_no_plan() {
        let bars = vec![bar(0, dec!(10)); 12];
        assert!(VwapPlan::plan(&bars, 10, RemainderAllocation::Last).is_none());
    }
}
