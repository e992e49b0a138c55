//! Alpaca Market Data Adapter
//!
//! REST implementation of `MarketDataPort` over Alpaca's stock data API.
//! Quotes come from snapshots, one request per batch of symbols; bars are
//! fetched newest first and returned oldest first.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::application::ports::{MarketDataError, MarketDataPort, MarketQuote};
use crate::domain::shared::{Bar, Symbol, Timeframe};
use crate::infrastructure::broker::alpaca::api_types::{
    AlpacaBarsResponse, AlpacaSnapshotsResponse, timeframe_param,
};
use crate::infrastructure::broker::alpaca::{AlpacaConfig, AlpacaError, AlpacaHttpClient};

/// Alpaca rejects bar requests above this limit.
const MAX_BAR_LIMIT: usize = 10_000;

/// Alpaca market data adapter.
#[derive(Debug, Clone)]
pub struct AlpacaMarketDataAdapter {
    client: AlpacaHttpClient,
}

impl AlpacaMarketDataAdapter {
    /// Create a new Alpaca market data adapter.
    pub fn new(config: &AlpacaConfig) -> Result<Self, AlpacaError> {
        Ok(Self::with_client(AlpacaHttpClient::new(config)?))
    }

    /// Reuse an existing client, typically the broker adapter's.
    #[must_use]
    pub const fn with_client(client: AlpacaHttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MarketDataPort for AlpacaMarketDataAdapter {
    async fn get_quotes(
        &self,
        symbols: &[Symbol],
    ) -> Result<HashMap<Symbol, MarketQuote>, MarketDataError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let symbols_param = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        tracing::debug!(symbols = %symbols_param, "Fetching snapshots");

        let snapshots: AlpacaSnapshotsResponse = self
            .client
            .data_get(&format!("/v2/stocks/snapshots?symbols={symbols_param}"))
            .await?;

        let quotes: HashMap<Symbol, MarketQuote> = snapshots
            .into_iter()
            .filter_map(|(symbol, snapshot)| {
                let symbol = Symbol::new(symbol);
                snapshot?
                    .into_quote(symbol.clone())
                    .map(|quote| (symbol, quote))
            })
            .collect();

        if quotes.len() < symbols.len() {
            tracing::debug!(
                requested = symbols.len(),
                received = quotes.len(),
                "Some symbols returned no snapshot"
            );
        }
        Ok(quotes)
    }

    async fn get_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, MarketDataError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let path = format!(
            "/v2/stocks/{}/bars?timeframe={}&limit={}&sort=desc",
            symbol.as_str(),
            timeframe_param(timeframe),
            limit.min(MAX_BAR_LIMIT)
        );
        let response: AlpacaBarsResponse =
            self.client.data_get(&path).await.map_err(|e| match e {
                AlpacaError::NotFound { .. } => MarketDataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                },
                other => other.into(),
            })?;

        let mut bars: Vec<Bar> = response
            .bars
            .unwrap_or_default()
            .into_iter()
            .map(Bar::from)
            .collect();
        bars.reverse();
        tracing::debug!(symbol = %symbol, timeframe = %timeframe, count = bars.len(), "Fetched bars");
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::broker::alpaca::AlpacaEnvironment;

    #[test]
    fn adapter_creation_fails_without_credentials() {
        let config = AlpacaConfig::new(
            String::new(),
            "secret".to_string(),
            AlpacaEnvironment::Paper,
        );
        assert!(AlpacaMarketDataAdapter::new(&config).is_err());
    }

    #[test]
    fn adapter_debug_hides_credentials() {
        let config = AlpacaConfig::new(
            "key".to_string(),
            "top-secret".to_string(),
            AlpacaEnvironment::Paper,
        );
        let adapter = AlpacaMarketDataAdapter::new(&config).unwrap();
        let debug = format!("{adapter:?}");
        assert!(debug.contains("AlpacaMarketDataAdapter"));
        assert!(!debug.contains("top-secret"));
    }

    #[tokio::test]
    async fn empty_requests_skip_the_network() {
        let config = AlpacaConfig::new("k".into(), "s".into(), AlpacaEnvironment::Paper)
            .with_base_url("http://127.0.0.1:9");
        let adapter = AlpacaMarketDataAdapter::new(&config).unwrap();

        assert!(adapter.get_quotes(&[]).await.unwrap().is_empty());
        assert!(
            adapter
                .get_bars(&Symbol::new("AAPL"), Timeframe::OneDay, 0)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
