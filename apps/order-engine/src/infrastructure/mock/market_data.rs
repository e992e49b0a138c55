//! In-memory market data for tests and dry runs.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::application::ports::{MarketDataError, MarketDataPort, MarketQuote};
use crate::domain::shared::{Bar, Symbol, Timeframe};

/// Half the simulated bid/ask spread.
const HALF_SPREAD: Decimal = dec!(0.01);

#[derive(Debug, Default)]
struct MarketState {
    /// Each quote read consumes the front price; the last one sticks.
    prices: HashMap<String, VecDeque<Decimal>>,
    bars: HashMap<String, Vec<Bar>>,
    quote_failure: Option<MarketDataError>,
    bar_failure: Option<MarketDataError>,
}

impl MarketState {
    fn next_price(&mut self, symbol: &str) -> Option<Decimal> {
        let queue = self.prices.get_mut(symbol)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        }
    }
}

/// Scriptable quotes and bars.
///
/// Symbols without a price are absent from quote responses.
#[derive(Debug, Default)]
pub struct MockMarketData {
    state: Mutex<MarketState>,
}

impl MockMarketData {
    /// No prices, no bars.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Quote `symbol` at `price` from now on.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.state
            .lock()
            .prices
            .insert(symbol.to_string(), VecDeque::from([price]));
    }

    /// Quote `prices` on successive reads, then hold the last one.
    pub fn script_prices(&self, symbol: &str, prices: &[Decimal]) {
        self.state
            .lock()
            .prices
            .insert(symbol.to_string(), prices.iter().copied().collect());
    }

    /// Bars returned for `symbol` at every timeframe.
    pub fn set_bars(&self, symbol: &str, bars: Vec<Bar>) {
        self.state.lock().bars.insert(symbol.to_string(), bars);
    }

    /// Fail every quote read.
    pub fn fail_quotes(&self, error: MarketDataError) {
        self.state.lock().quote_failure = Some(error);
    }

    /// Fail every bar read.
    pub fn fail_bars(&self, error: MarketDataError) {
        self.state.lock().bar_failure = Some(error);
    }

    /// Clear injected failures.
    pub fn recover(&self) {
        let mut state = self.state.lock();
        state.quote_failure = None;
        state.bar_failure = None;
    }
}

#[async_trait]
impl MarketDataPort for MockMarketData {
    async fn get_quotes(
        &self,
        symbols: &[Symbol],
    ) -> Result<HashMap<Symbol, MarketQuote>, MarketDataError> {
        let mut state = self.state.lock();
        if let Some(error) = &state.quote_failure {
            return Err(error.clone());
        }
        let mut quotes = HashMap::new();
        for symbol in symbols {
            if quotes.contains_key(symbol) {
                continue;
            }
            if let Some(price) = state.next_price(symbol.as_str()) {
                quotes.insert(
                    symbol.clone(),
                    MarketQuote {
                        symbol: symbol.clone(),
                        price,
                        bid: price - HALF_SPREAD,
                        ask: price + HALF_SPREAD,
                        volume: 0,
                        timestamp: Utc::now(),
                    },
                );
            }
        }
        Ok(quotes)
    }

    async fn get_bars(
        &self,
        symbol: &Symbol,
        _timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let state = self.state.lock();
        if let Some(error) = &state.bar_failure {
            return Err(error.clone());
        }
        let bars = state.bars.get(symbol.as_str()).cloned().unwrap_or_default();
        let skip = bars.len().saturating_sub(limit);
        Ok(bars.into_iter().skip(skip).collect())
    }
}
