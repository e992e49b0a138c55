//! Risk Manager
//!
//! Sizes new positions, places ATR stops and targets, and scores open
//! positions and the portfolio against the selected risk profile.
//!
//! The manager reads broker and market data snapshots on every call. The only
//! state it keeps is the running [`DailyPnlTracker`], which is refreshed from
//! the account on each call and fed realized P&L by the caller.
//!
//! Recommended actions are never executed here; closing positions or halting
//! trading is left to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::ports::{BrokerError, BrokerPort, MarketDataError, MarketDataPort};
use crate::broker::{RetryPolicy, retry_transient};
use crate::config::RiskConfig;
use crate::domain::advanced_orders::OrderSide;
use crate::domain::risk_management::{
    ATR_PERIOD, Account, DailyPnlTracker, ExposureModel, PortfolioRisk, PortfolioSnapshot,
    Position, PositionRisk, PositionRiskInput, PositionSide, RiskActionPlan, RiskParameters,
    RiskProfiles, SizingInput, SizingLimits, SizingMetrics, StopAndTargets, average_true_range,
    fallback_atr, return_volatility, size_position,
};
use crate::domain::shared::{Bar, Symbol, Timeframe};
use crate::observability::{record_risk_action, update_portfolio_risk};

/// Errors from risk assessments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    /// No profile with this name.
    #[error("Unknown risk mode: {0}")]
    UnknownMode(String),

    /// Sizing needs a positive account value.
    #[error("Portfolio value must be positive, got {0}")]
    NonPositivePortfolioValue(Decimal),

    /// Prices that cannot produce stops or targets.
    #[error("Invalid price for {field}: {value}")]
    InvalidPrice {
        /// Offending input.
        field: &'static str,
        /// Value supplied.
        value: Decimal,
    },

    /// Broker snapshot failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Market data snapshot failed.
    #[error(transparent)]
    MarketData(#[from] MarketDataError),
}

/// Position sizing and portfolio risk over live broker snapshots.
pub struct RiskManager<B, M> {
    broker: Arc<B>,
    market_data: Arc<M>,
    profiles: RiskProfiles,
    default_mode: String,
    limits: SizingLimits,
    exposure: ExposureModel,
    lookback_days: usize,
    retry: RetryPolicy,
    pnl: Mutex<DailyPnlTracker>,
}

impl<B, M> std::fmt::Debug for RiskManager<B, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskManager")
            .field("default_mode", &self.default_mode)
            .field("limits", &self.limits)
            .field("lookback_days", &self.lookback_days)
            .finish_non_exhaustive()
    }
}

impl<B, M> RiskManager<B, M>
where
    B: BrokerPort,
    M: MarketDataPort,
{
    /// Manager using the configured profiles and exposure model.
    #[must_use]
    pub fn new(broker: Arc<B>, market_data: Arc<M>, config: &RiskConfig) -> Self {
        Self {
            broker,
            market_data,
            profiles: config.profiles.clone(),
            default_mode: config.default_mode.clone(),
            limits: config.sizing_limits(),
            exposure: config.exposure_model(),
            lookback_days: config.volatility_lookback_days,
            retry: RetryPolicy::default(),
            pnl: Mutex::new(DailyPnlTracker::new()),
        }
    }

    /// Override the retry policy for snapshot reads.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Profile for `mode`; an empty mode selects the configured default.
    ///
    /// # Errors
    ///
    /// `UnknownMode` when no profile matches.
    pub fn parameters(&self, mode: &str) -> Result<&RiskParameters, RiskError> {
        let mode = if mode.is_empty() {
            self.default_mode.as_str()
        } else {
            mode
        };
        self.profiles
            .get(mode)
            .ok_or_else(|| RiskError::UnknownMode(mode.to_string()))
    }

    /// Shares to buy or sell for a new position in `symbol`.
    ///
    /// Starts from `portfolio value × max position size / stop distance` and
    /// applies the reductions listed in [`SizingMetrics::adjustments`].
    ///
    /// # Errors
    ///
    /// Unknown mode, a non-positive entry or portfolio value, or a failed
    /// account or positions read.
    pub async fn size_position(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        entry_price: Decimal,
        stop_loss: Decimal,
        mode: &str,
    ) -> Result<SizingMetrics, RiskError> {
        let params = self.parameters(mode)?;
        if entry_price <= Decimal::ZERO {
            return Err(RiskError::InvalidPrice {
                field: "entry price",
                value: entry_price,
            });
        }
        let account = self.account().await?;
        if account.portfolio_value <= Decimal::ZERO {
            return Err(RiskError::NonPositivePortfolioValue(account.portfolio_value));
        }
        let positions = self.positions().await?;

        let input = SizingInput {
            entry_price,
            stop_loss,
            portfolio_value: account.portfolio_value,
            cash: account.cash,
            existing_quantity: positions
                .iter()
                .find(|position| &position.symbol == symbol)
                .map(|position| position.quantity),
            sector_exposure: self.exposure.sector_exposure(symbol, &positions),
            correlation: self.exposure.symbol_correlation(symbol, &positions),
            daily_pnl: self.pnl.lock().daily_pnl(),
        };
        let metrics = size_position(params, &self.limits, &input);

        info!(
            symbol = %symbol,
            side = %side,
            quantity = metrics.quantity,
            risk_amount = %metrics.risk_amount,
            stop_distance = %metrics.stop_distance,
            adjustments = ?metrics.adjustments,
            "Position sized"
        );
        Ok(metrics)
    }

    /// Stop and two targets at ATR multiples from `entry_price`.
    ///
    /// A non-positive `atr` is replaced with 2% of the entry price.
    ///
    /// # Errors
    ///
    /// Unknown mode or a non-positive entry price.
    pub fn compute_stop_and_targets(
        &self,
        entry_price: Decimal,
        atr: Decimal,
        side: OrderSide,
        mode: &str,
    ) -> Result<StopAndTargets, RiskError> {
        let params = self.parameters(mode)?;
        let atr = if atr > Decimal::ZERO {
            atr
        } else {
            fallback_atr(entry_price)
        };
        StopAndTargets::compute(entry_price, atr, side, params).ok_or(RiskError::InvalidPrice {
            field: "entry price",
            value: entry_price,
        })
    }

    /// Risk of the open position in `symbol`, if there is one.
    ///
    /// `opened_at` drives the time component of the score; without it the
    /// position is treated as fresh.
    ///
    /// # Errors
    ///
    /// Unknown mode or a failed broker or market data read.
    pub async fn assess_position_risk(
        &self,
        symbol: &Symbol,
        mode: &str,
        opened_at: Option<DateTime<Utc>>,
    ) -> Result<Option<PositionRisk>, RiskError> {
        let params = self.parameters(mode)?;
        let Some(position) =
            retry_transient(&self.retry, "get_position", || self.broker.get_position(symbol))
                .await?
        else {
            return Ok(None);
        };
        let account = self.account().await?;

        let quote = retry_transient(&self.retry, "get_quote", || {
            self.market_data.get_quote(symbol)
        })
        .await?;
        let current_price = quote.map_or(position.current_price, |quote| quote.price);

        let bars = self.daily_bars(symbol).await?;
        let atr = average_true_range(&bars, ATR_PERIOD)
            .unwrap_or_else(|| fallback_atr(position.average_entry_price));
        let side = match position.side {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        };
        let levels = self.compute_stop_and_targets(position.average_entry_price, atr, side, mode)?;

        let now = Utc::now();
        let risk = PositionRisk::assess(&PositionRiskInput {
            position: &position,
            current_price,
            portfolio_value: account.portfolio_value,
            cash: account.cash,
            levels,
            minutes_held: opened_at.map(|opened| (now - opened).num_minutes()),
            timeout_minutes: params.position_timeout_minutes,
            volatility: return_volatility(&bars).unwrap_or(0.0),
        });

        debug!(
            symbol = %symbol,
            score = risk.overall_risk_score,
            level = %risk.risk_level,
            "Position risk assessed"
        );
        Ok(Some(risk))
    }

    /// Exposure, VaR, limit checks and alerts across every open position.
    ///
    /// A position whose bars cannot be read falls back to the flat risk
    /// weight rather than failing the whole assessment.
    ///
    /// # Errors
    ///
    /// Unknown mode or a failed account or positions read.
    pub async fn assess_portfolio_risk(&self, mode: &str) -> Result<PortfolioRisk, RiskError> {
        let params = self.parameters(mode)?;
        let account = self.account().await?;
        let positions = self.positions().await?;

        let mut volatility = HashMap::new();
        for position in &positions {
            match self.daily_bars(&position.symbol).await {
                Ok(bars) => {
                    if let Some(sigma) = return_volatility(&bars) {
                        volatility.insert(position.symbol.as_str().to_string(), sigma);
                    }
                }
                Err(error) => {
                    warn!(
                        symbol = %position.symbol,
                        error = %error,
                        "Bars unavailable, using flat risk weight"
                    );
                }
            }
        }

        let pnl = self.pnl.lock().clone();
        let risk = PortfolioRisk::evaluate(
            &PortfolioSnapshot {
                positions: &positions,
                account: &account,
                pnl: &pnl,
                volatility: &volatility,
            },
            params,
            &self.exposure,
            Utc::now(),
        );

        update_portfolio_risk(
            risk.daily_pnl_percent.to_f64().unwrap_or(0.0),
            risk.current_drawdown.to_f64().unwrap_or(0.0),
            risk.alerts.len(),
        );
        for alert in &risk.alerts {
            warn!(alert = %alert, "Portfolio risk alert");
        }
        info!(
            positions = risk.position_count,
            total_exposure = %risk.total_exposure,
            total_risk = %risk.total_risk,
            daily_pnl = %risk.daily_pnl,
            within_limits = risk.within_limits(),
            "Portfolio risk assessed"
        );
        Ok(risk)
    }

    /// Portfolio assessment plus the actions its thresholds call for.
    ///
    /// # Errors
    ///
    /// As [`assess_portfolio_risk`](Self::assess_portfolio_risk).
    pub async fn execute_risk_actions(&self, mode: &str) -> Result<RiskActionPlan, RiskError> {
        let plan = RiskActionPlan::from(self.assess_portfolio_risk(mode).await?);
        for action in &plan.actions {
            warn!(action = %action, "Risk action recommended");
            record_risk_action(&action.to_string());
        }
        Ok(plan)
    }

    /// Add realized P&L to today's total.
    pub fn record_realized(&self, amount: Decimal) {
        self.pnl.lock().record_realized(Utc::now(), amount);
    }

    /// Copy of the running P&L and drawdown state.
    #[must_use]
    pub fn pnl(&self) -> DailyPnlTracker {
        self.pnl.lock().clone()
    }

    /// Account snapshot; also marks equity for daily P&L and drawdown.
    async fn account(&self) -> Result<Account, RiskError> {
        let account = retry_transient(&self.retry, "get_account", || self.broker.get_account())
            .await?;
        let now = Utc::now();
        let mut pnl = self.pnl.lock();
        if let Some(previous_close) = account.last_equity {
            pnl.set_day_open(now, previous_close);
        }
        pnl.mark_equity(now, account.equity);
        Ok(account)
    }

    async fn positions(&self) -> Result<Vec<Position>, RiskError> {
        Ok(retry_transient(&self.retry, "get_positions", || self.broker.get_positions()).await?)
    }

    async fn daily_bars(&self, symbol: &Symbol) -> Result<Vec<Bar>, MarketDataError> {
        retry_transient(&self.retry, "get_bars", || {
            self.market_data
                .get_bars(symbol, Timeframe::OneDay, self.lookback_days)
        })
        .await
    }
}
