//! Risk Management Bounded Context
//!
//! Pure risk arithmetic over broker snapshots: position sizing, ATR stop
//! and target placement, position and portfolio scoring, and the running
//! daily P&L the limits are checked against.
//!
//! # Key Concepts
//!
//! - **Risk Profile**: a named [`RiskParameters`] set selected by mode
//! - **Sizing Pipeline**: raw size reduced by ordered, compounding steps
//! - **Limit Checks**: named pass/fail checks feeding alerts and actions

pub mod daily_pnl;
pub mod exposure;
pub mod levels;
pub mod parameters;
pub mod portfolio;
pub mod portfolio_risk;
pub mod position_risk;
pub mod sizing;
pub mod volatility;

pub use daily_pnl::DailyPnlTracker;
pub use exposure::ExposureModel;
pub use levels::StopAndTargets;
pub use parameters::{RiskParameters, RiskProfiles};
pub use portfolio::{Account, Position, PositionSide};
pub use portfolio_risk::{
    LimitCheck, PortfolioRisk, PortfolioSnapshot, RiskAction, RiskActionPlan, RiskAlert,
};
pub use position_risk::{PositionRisk, PositionRiskInput, RiskLevel, fallback_atr};
pub use sizing::{SizingAdjustment, SizingInput, SizingLimits, SizingMetrics, size_position};
pub use volatility::{ATR_PERIOD, average_true_range, return_volatility};
