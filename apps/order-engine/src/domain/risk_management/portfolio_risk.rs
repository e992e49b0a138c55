//! Portfolio-level risk: exposure, VaR, limit checks, alerts and actions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::daily_pnl::DailyPnlTracker;
use super::exposure::ExposureModel;
use super::parameters::RiskParameters;
use super::portfolio::{Account, Position};
use super::position_risk::decimal_from_f64;

/// One-sided 95% z-score for one-day VaR.
const VAR_Z_95: Decimal = dec!(1.65);
/// Risk weight used when a position has no volatility estimate.
const FLAT_RISK_WEIGHT: Decimal = dec!(0.05);

/// Named limit checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitCheck {
    /// Daily P&L fraction at or above `-max_daily_loss`.
    DailyLossLimit,
    /// Current drawdown at or below `max_drawdown`.
    DrawdownLimit,
    /// Every position's cost basis within `max_position_size`.
    PositionSizeLimit,
    /// Every sector within `max_sector_exposure`.
    SectorExposureLimit,
}

impl fmt::Display for LimitCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyLossLimit => write!(f, "daily_loss_limit"),
            Self::DrawdownLimit => write!(f, "drawdown_limit"),
            Self::PositionSizeLimit => write!(f, "position_size_limit"),
            Self::SectorExposureLimit => write!(f, "sector_exposure_limit"),
        }
    }
}

/// Human-readable portfolio alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "alert", rename_all = "snake_case")]
pub enum RiskAlert {
    /// Daily loss beyond 2%.
    DailyLoss {
        /// Daily P&L fraction.
        percent: Decimal,
    },
    /// Drawdown beyond 5%.
    Drawdown {
        /// Drawdown fraction.
        drawdown: Decimal,
    },
    /// More than ten open positions.
    PositionCount {
        /// Open positions.
        count: usize,
    },
    /// A sector above 40%.
    SectorConcentration {
        /// Sector name.
        sector: String,
        /// Share of cost basis.
        share: Decimal,
    },
    /// Correlation risk above 70%.
    CorrelationRisk {
        /// Correlation scalar.
        value: Decimal,
    },
    /// A limit check failed.
    LimitBreached {
        /// Failed check.
        check: LimitCheck,
    },
}

impl fmt::Display for RiskAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |value: Decimal| (value * dec!(100)).round_dp(2);
        match self {
            Self::DailyLoss { percent } => {
                write!(f, "Daily loss of {}% exceeds 2%", pct(percent.abs()))
            }
            Self::Drawdown { drawdown } => {
                write!(f, "Drawdown of {}% exceeds 5%", pct(*drawdown))
            }
            Self::PositionCount { count } => {
                write!(f, "{count} open positions exceeds 10")
            }
            Self::SectorConcentration { sector, share } => {
                write!(f, "{sector} sector at {}% of the portfolio", pct(*share))
            }
            Self::CorrelationRisk { value } => {
                write!(f, "Correlation risk of {}% exceeds 70%", pct(*value))
            }
            Self::LimitBreached { check } => write!(f, "Risk limit breached: {check}"),
        }
    }
}

/// Recommended response to portfolio risk. Never executed by the risk layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskAction {
    /// Daily loss beyond 5%.
    CloseAllPositions,
    /// Correlation risk beyond 80%.
    ReduceCorrelatedPositions,
    /// Drawdown beyond 10%.
    StopTrading,
}

impl fmt::Display for RiskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CloseAllPositions => write!(f, "CLOSE_ALL_POSITIONS"),
            Self::ReduceCorrelatedPositions => write!(f, "REDUCE_CORRELATED_POSITIONS"),
            Self::StopTrading => write!(f, "STOP_TRADING"),
        }
    }
}

/// Snapshot the portfolio assessment works from.
#[derive(Debug, Clone)]
pub struct PortfolioSnapshot<'a> {
    /// Broker positions.
    pub positions: &'a [Position],
    /// Account balances.
    pub account: &'a Account,
    /// Daily P&L and drawdown.
    pub pnl: &'a DailyPnlTracker,
    /// Daily return volatility per ticker, where available.
    pub volatility: &'a HashMap<String, f64>,
}

/// Aggregate portfolio risk. Derived on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioRisk {
    /// Σ market value.
    pub total_exposure: Decimal,
    /// Σ one-day 95% VaR.
    pub total_risk: Decimal,
    /// Open positions.
    pub position_count: usize,
    /// Cost-basis share per sector.
    pub sector_diversification: BTreeMap<String, Decimal>,
    /// Correlation scalar in [0, 1].
    pub correlation_risk: Decimal,
    /// Daily P&L.
    pub daily_pnl: Decimal,
    /// Daily P&L over portfolio value.
    pub daily_pnl_percent: Decimal,
    /// Drawdown from the high-water mark.
    pub current_drawdown: Decimal,
    /// Worst drawdown seen.
    pub max_drawdown: Decimal,
    /// Named checks; `true` passes.
    pub limit_checks: BTreeMap<LimitCheck, bool>,
    /// Alerts raised.
    pub alerts: Vec<RiskAlert>,
    /// Assessment time.
    pub assessed_at: DateTime<Utc>,
}

impl PortfolioRisk {
    /// Assess the portfolio.
    #[must_use]
    pub fn evaluate(
        snapshot: &PortfolioSnapshot<'_>,
        params: &RiskParameters,
        exposure: &ExposureModel,
        now: DateTime<Utc>,
    ) -> Self {
        let positions = snapshot.positions;
        let portfolio_value = snapshot.account.portfolio_value;

        let total_exposure: Decimal = positions.iter().map(|p| p.market_value.abs()).sum();
        let total_risk: Decimal = positions
            .iter()
            .map(|p| {
                let value = p.market_value.abs();
                snapshot
                    .volatility
                    .get(p.symbol.as_str())
                    .map_or(value * FLAT_RISK_WEIGHT, |sigma| {
                        value * decimal_from_f64(*sigma) * VAR_Z_95
                    })
            })
            .sum();

        let sector_diversification = exposure.sector_diversification(positions);
        let correlation_risk = exposure.portfolio_correlation(positions);
        let daily_pnl = snapshot.pnl.daily_pnl();
        let daily_pnl_percent = if portfolio_value > Decimal::ZERO {
            daily_pnl / portfolio_value
        } else {
            Decimal::ZERO
        };

        let mut limit_checks = BTreeMap::new();
        limit_checks.insert(
            LimitCheck::DailyLossLimit,
            daily_pnl_percent >= -params.max_daily_loss,
        );
        limit_checks.insert(
            LimitCheck::DrawdownLimit,
            snapshot.pnl.current_drawdown() <= params.max_drawdown,
        );
        limit_checks.insert(
            LimitCheck::PositionSizeLimit,
            positions.is_empty()
                || (portfolio_value > Decimal::ZERO
                    && positions
                        .iter()
                        .all(|p| p.cost_basis() / portfolio_value <= params.max_position_size)),
        );
        limit_checks.insert(
            LimitCheck::SectorExposureLimit,
            sector_diversification
                .values()
                .all(|share| *share <= params.max_sector_exposure),
        );

        let mut risk = Self {
            total_exposure,
            total_risk,
            position_count: positions.len(),
            sector_diversification,
            correlation_risk,
            daily_pnl,
            daily_pnl_percent,
            current_drawdown: snapshot.pnl.current_drawdown(),
            max_drawdown: snapshot.pnl.max_drawdown(),
            limit_checks,
            alerts: Vec::new(),
            assessed_at: now,
        };
        risk.alerts = risk.threshold_alerts();
        risk
    }

    fn threshold_alerts(&self) -> Vec<RiskAlert> {
        let mut alerts = Vec::new();
        if self.daily_pnl_percent < dec!(-0.02) {
            alerts.push(RiskAlert::DailyLoss {
                percent: self.daily_pnl_percent,
            });
        }
        if self.max_drawdown > dec!(0.05) {
            alerts.push(RiskAlert::Drawdown {
                drawdown: self.max_drawdown,
            });
        }
        if self.position_count > 10 {
            alerts.push(RiskAlert::PositionCount {
                count: self.position_count,
            });
        }
        for (sector, share) in &self.sector_diversification {
            if *share > dec!(0.4) {
                alerts.push(RiskAlert::SectorConcentration {
                    sector: sector.clone(),
                    share: *share,
                });
            }
        }
        if self.correlation_risk > dec!(0.7) {
            alerts.push(RiskAlert::CorrelationRisk {
                value: self.correlation_risk,
            });
        }
        for (check, passed) in &self.limit_checks {
            if !passed {
                alerts.push(RiskAlert::LimitBreached { check: *check });
            }
        }
        alerts
    }

    /// Hard-threshold actions for this assessment.
    #[must_use]
    pub fn recommend_actions(&self) -> Vec<RiskAction> {
        let mut actions = Vec::new();
        if self.daily_pnl_percent < dec!(-0.05) {
            actions.push(RiskAction::CloseAllPositions);
        }
        if self.correlation_risk > dec!(0.8) {
            actions.push(RiskAction::ReduceCorrelatedPositions);
        }
        if self.max_drawdown > dec!(0.10) {
            actions.push(RiskAction::StopTrading);
        }
        actions
    }

    /// True when every limit check passed.
    #[must_use]
    pub fn within_limits(&self) -> bool {
        self.limit_checks.values().all(|passed| *passed)
    }
}

/// Assessment plus the actions it calls for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskActionPlan {
    /// Assessment.
    pub portfolio_risk: PortfolioRisk,
    /// Alert strings.
    pub alerts: Vec<String>,
    /// Recommended actions.
    pub actions: Vec<RiskAction>,
}

impl From<PortfolioRisk> for RiskActionPlan {
    fn from(portfolio_risk: PortfolioRisk) -> Self {
        let alerts = portfolio_risk.alerts.iter().map(ToString::to_string).collect();
        let actions = portfolio_risk.recommend_actions();
        Self {
            portfolio_risk,
            alerts,
            actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::risk_management::PositionSide;
    use crate::domain::shared::Symbol;

    fn held(symbol: &str, quantity: u64, price: Decimal) -> Position {
        Position {
            symbol: Symbol::new(symbol),
            quantity,
            side: PositionSide::Long,
            average_entry_price: price,
            current_price: price,
            market_value: Decimal::from(quantity) * price,
            unrealized_pnl: Decimal::ZERO,
        }
    }

    fn account(portfolio_value: Decimal) -> Account {
        Account {
            cash: portfolio_value,
            buying_power: portfolio_value,
            portfolio_value,
            equity: portfolio_value,
            last_equity: None,
        }
    }

    fn evaluate(positions: &[Position], pnl: &DailyPnlTracker, vol: &HashMap<String, f64>) -> PortfolioRisk {
        let account = account(dec!(100000));
        PortfolioRisk::evaluate(
            &PortfolioSnapshot {
                positions,
                account: &account,
                pnl,
                volatility: vol,
            },
            &RiskParameters::conservative(),
            &ExposureModel::default(),
            Utc::now(),
        )
    }

    #[test]
    fn var_uses_volatility_with_flat_fallback() {
        let positions = vec![held("AAPL", 10, dec!(100)), held("KO", 10, dec!(100))];
        let vol = HashMap::from([("AAPL".to_string(), 0.02)]);
        let risk = evaluate(&positions, &DailyPnlTracker::new(), &vol);
        assert_eq!(risk.total_exposure, dec!(2000));
        // 1000 × 0.02 × 1.65 + 1000 × 0.05
        assert!((risk.total_risk - dec!(83)).abs() < dec!(0.0001));
    }

    #[test]
    fn concentrated_portfolio_raises_alerts_and_actions() {
        let positions = vec![
            held("AAPL", 40, dec!(100)),
            held("MSFT", 40, dec!(100)),
            held("NVDA", 40, dec!(100)),
        ];
        let mut pnl = DailyPnlTracker::new();
        let now = Utc::now();
        pnl.mark_equity(now, dec!(110000));
        pnl.mark_equity(now, dec!(94000));
        let risk = evaluate(&positions, &pnl, &HashMap::new());

        assert_eq!(risk.correlation_risk, dec!(1));
        assert!(!risk.limit_checks[&LimitCheck::DailyLossLimit]);
        assert!(!risk.limit_checks[&LimitCheck::SectorExposureLimit]);
        assert!(risk.limit_checks[&LimitCheck::PositionSizeLimit]);
        assert!(risk.alerts.contains(&RiskAlert::CorrelationRisk { value: dec!(1) }));
        assert!(!risk.within_limits());

        let plan = RiskActionPlan::from(risk);
        assert_eq!(
            plan.actions,
            vec![
                RiskAction::CloseAllPositions,
                RiskAction::ReduceCorrelatedPositions,
                RiskAction::StopTrading,
            ]
        );
        assert!(plan.alerts.iter().any(|a| a.starts_with("Daily loss of 16")));
    }

    #[test]
    fn empty_portfolio_passes_every_check() {
        let risk = evaluate(&[], &DailyPnlTracker::new(), &HashMap::new());
        assert!(risk.within_limits());
        assert!(risk.alerts.is_empty());
        assert!(risk.recommend_actions().is_empty());
    }
}
