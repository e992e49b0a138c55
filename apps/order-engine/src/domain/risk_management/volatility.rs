//! Volatility estimates from daily bars.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::domain::shared::Bar;

/// ATR lookback.
pub const ATR_PERIOD: usize = 14;

/// Mean true range over the last `period` bars. Needs `period + 1` bars so
/// every range has a previous close.
#[must_use]
pub fn average_true_range(bars: &[Bar], period: usize) -> Option<Decimal> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let window = &bars[bars.len() - period - 1..];
    let total: Decimal = window
        .windows(2)
        .map(|pair| pair[1].true_range(Some(pair[0].close)))
        .sum();
    Some(total / Decimal::from(period))
}

/// Close-to-close simple returns.
#[must_use]
pub fn daily_returns(bars: &[Bar]) -> Vec<f64> {
    bars.windows(2)
        .filter_map(|pair| {
            let prev = pair[0].close.to_f64()?;
            let next = pair[1].close.to_f64()?;
            (prev > 0.0).then(|| next / prev - 1.0)
        })
        .collect()
}

/// Population standard deviation of daily returns; `None` below two returns.
#[must_use]
pub fn return_volatility(bars: &[Bar]) -> Option<f64> {
    let returns = daily_returns(bars);
    if returns.len() < 2 {
        return None;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn bar(high: Decimal, low: Decimal, close: Decimal) -> Bar {
        Bar {
            timestamp: Utc::now(),
            open: close,
            high,
            low,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn atr_needs_a_previous_close() {
        let bars: Vec<Bar> = (0..14).map(|_| bar(dec!(101), dec!(99), dec!(100))).collect();
        assert_eq!(average_true_range(&bars, ATR_PERIOD), None);
    }

    #[test]
    fn atr_averages_true_ranges() {
        let mut bars: Vec<Bar> = (0..15).map(|_| bar(dec!(101), dec!(99), dec!(100))).collect();
        // A gap up widens the last range to |104 - 100|.
        bars.push(bar(dec!(104), dec!(103), dec!(103)));
        let atr = average_true_range(&bars, ATR_PERIOD).unwrap();
        assert_eq!(atr, (dec!(2) * dec!(13) + dec!(4)) / dec!(14));
    }

    #[test]
    fn flat_prices_have_zero_volatility() {
        let bars: Vec<Bar> = (0..5).map(|_| bar(dec!(1), dec!(1), dec!(10))).collect();
        assert_eq!(return_volatility(&bars), Some(0.0));
        assert_eq!(return_volatility(&bars[..2]), None);
    }
}
