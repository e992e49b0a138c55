//! Sector and correlation exposure of a portfolio.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::portfolio::Position;
use crate::domain::shared::Symbol;

/// Static sector map and correlation groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureModel {
    /// Ticker to sector.
    pub sector_map: BTreeMap<String, String>,
    /// Ticker to tickers it moves with.
    pub correlation_groups: BTreeMap<String, Vec<String>>,
    /// Sector for unmapped tickers.
    pub default_sector: String,
    /// Sector whose members count toward portfolio correlation risk.
    pub correlated_sector: String,
}

impl Default for ExposureModel {
    fn default() -> Self {
        let sector_map = [
            ("AAPL", "Technology"),
            ("MSFT", "Technology"),
            ("GOOGL", "Technology"),
            ("NVDA", "Technology"),
            ("META", "Technology"),
            ("TSLA", "Automotive"),
        ]
        .into_iter()
        .map(|(symbol, sector)| (symbol.to_string(), sector.to_string()))
        .collect();

        let correlation_groups = [
            ("AAPL", &["MSFT", "GOOGL", "NVDA"][..]),
            ("MSFT", &["AAPL", "GOOGL", "NVDA"][..]),
            ("GOOGL", &["AAPL", "MSFT", "NVDA"][..]),
            ("TSLA", &["NVDA"][..]),
            ("NVDA", &["AAPL", "MSFT", "GOOGL", "TSLA"][..]),
        ]
        .into_iter()
        .map(|(symbol, peers)| {
            (
                symbol.to_string(),
                peers.iter().map(|peer| (*peer).to_string()).collect(),
            )
        })
        .collect();

        Self {
            sector_map,
            correlation_groups,
            default_sector: "Other".to_string(),
            correlated_sector: "Technology".to_string(),
        }
    }
}

impl ExposureModel {
    /// Sector of `symbol`.
    #[must_use]
    pub fn sector_of(&self, symbol: &Symbol) -> &str {
        self.sector_map
            .get(symbol.as_str())
            .map_or(self.default_sector.as_str(), String::as_str)
    }

    /// Cost basis held in `symbol`'s sector over total cost basis.
    #[must_use]
    pub fn sector_exposure(&self, symbol: &Symbol, positions: &[Position]) -> Decimal {
        let sector = self.sector_of(symbol);
        let (in_sector, total) =
            positions
                .iter()
                .fold((Decimal::ZERO, Decimal::ZERO), |(in_sector, total), p| {
                    let basis = p.cost_basis();
                    if self.sector_of(&p.symbol) == sector {
                        (in_sector + basis, total + basis)
                    } else {
                        (in_sector, total + basis)
                    }
                });
        ratio(in_sector, total)
    }

    /// Share of held positions that move with `symbol`.
    #[must_use]
    pub fn symbol_correlation(&self, symbol: &Symbol, positions: &[Position]) -> Decimal {
        let Some(peers) = self.correlation_groups.get(symbol.as_str()) else {
            return Decimal::ZERO;
        };
        let correlated = positions
            .iter()
            .filter(|p| peers.iter().any(|peer| peer == p.symbol.as_str()))
            .count();
        ratio(Decimal::from(correlated), Decimal::from(positions.len()))
    }

    /// Share of positions in the correlated sector; zero with one position
    /// or fewer.
    #[must_use]
    pub fn portfolio_correlation(&self, positions: &[Position]) -> Decimal {
        if positions.len() <= 1 {
            return Decimal::ZERO;
        }
        let correlated = positions
            .iter()
            .filter(|p| self.sector_of(&p.symbol) == self.correlated_sector)
            .count();
        Decimal::from(correlated) / Decimal::from(positions.len())
    }

    /// Cost-basis share per sector.
    #[must_use]
    pub fn sector_diversification(&self, positions: &[Position]) -> BTreeMap<String, Decimal> {
        let mut by_sector: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut total = Decimal::ZERO;
        for position in positions {
            let basis = position.cost_basis();
            *by_sector
                .entry(self.sector_of(&position.symbol).to_string())
                .or_default() += basis;
            total += basis;
        }
        by_sector
            .into_iter()
            .map(|(sector, value)| (sector, ratio(value, total)))
            .collect()
    }
}

fn ratio(part: Decimal, whole: Decimal) -> Decimal {
    if whole > Decimal::ZERO {
        part / whole
    } else {
        Decimal::ZERO
    }
}
