//! Running daily P&L and drawdown.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Daily P&L counters plus an equity high-water mark.
///
/// Daily figures reset on the first update of a new UTC day; the
/// high-water mark and drawdowns carry across days.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPnlTracker {
    day: Option<NaiveDate>,
    day_open_equity: Option<Decimal>,
    realized: Decimal,
    last_equity: Option<Decimal>,
    high_water_mark: Decimal,
    current_drawdown: Decimal,
    max_drawdown: Decimal,
}

impl DailyPnlTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.day_open_equity = None;
            self.realized = Decimal::ZERO;
        }
    }

    /// Anchor today's P&L at `equity` unless already anchored.
    pub fn set_day_open(&mut self, now: DateTime<Utc>, equity: Decimal) {
        self.roll(now);
        if self.day_open_equity.is_none() {
            self.day_open_equity = Some(equity);
        }
    }

    /// Record realized P&L.
    pub fn record_realized(&mut self, now: DateTime<Utc>, amount: Decimal) {
        self.roll(now);
        self.realized += amount;
    }

    /// Observe account equity.
    pub fn mark_equity(&mut self, now: DateTime<Utc>, equity: Decimal) {
        self.roll(now);
        if self.day_open_equity.is_none() {
            self.day_open_equity = Some(equity);
        }
        self.last_equity = Some(equity);
        if equity > self.high_water_mark {
            self.high_water_mark = equity;
        }
        self.current_drawdown = if self.high_water_mark > Decimal::ZERO {
            (self.high_water_mark - equity) / self.high_water_mark
        } else {
            Decimal::ZERO
        };
        if self.current_drawdown > self.max_drawdown {
            self.max_drawdown = self.current_drawdown;
        }
    }

    /// Equity change since the day opened, or realized P&L when no equity
    /// has been observed.
    #[must_use]
    pub fn daily_pnl(&self) -> Decimal {
        match (self.last_equity, self.day_open_equity) {
            (Some(last), Some(open)) => last - open,
            _ => self.realized,
        }
    }

    /// Realized P&L today.
    #[must_use]
    pub const fn realized(&self) -> Decimal {
        self.realized
    }

    /// Highest equity seen.
    #[must_use]
    pub const fn high_water_mark(&self) -> Decimal {
        self.high_water_mark
    }

    /// Drawdown from the high-water mark as a fraction.
    #[must_use]
    pub const fn current_drawdown(&self) -> Decimal {
        self.current_drawdown
    }

    /// Worst drawdown seen.
    #[must_use]
    pub const fn max_drawdown(&self) -> Decimal {
        self.max_drawdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn equity_tracks_drawdown() {
        let mut tracker = DailyPnlTracker::new();
        tracker.mark_equity(at(4, 14), dec!(100000));
        tracker.mark_equity(at(4, 15), dec!(90000));
        tracker.mark_equity(at(4, 16), dec!(95000));
        assert_eq!(tracker.daily_pnl(), dec!(-5000));
        assert_eq!(tracker.current_drawdown(), dec!(0.05));
        assert_eq!(tracker.max_drawdown(), dec!(0.1));
    }

    #[test]
    fn new_day_resets_daily_figures_only() {
        let mut tracker = DailyPnlTracker::new();
        tracker.record_realized(at(4, 14), dec!(-250));
        assert_eq!(tracker.daily_pnl(), dec!(-250));
        tracker.mark_equity(at(4, 15), dec!(1000));
        tracker.mark_equity(at(4, 16), dec!(800));

        tracker.record_realized(at(5, 14), dec!(10));
        assert_eq!(tracker.realized(), dec!(10));
        tracker.mark_equity(at(5, 15), dec!(900));
        assert_eq!(tracker.daily_pnl(), dec!(0));
        assert_eq!(tracker.high_water_mark(), dec!(1000));
        assert_eq!(tracker.max_drawdown(), dec!(0.2));
    }

    #[test]
    fn explicit_day_open_anchors_pnl() {
        let mut tracker = DailyPnlTracker::new();
        tracker.set_day_open(at(4, 13), dec!(1000));
        tracker.mark_equity(at(4, 14), dec!(1100));
        assert_eq!(tracker.daily_pnl(), dec!(100));
    }
}
