//! Observability: structured logging and Prometheus metrics.

mod logging;
mod metrics;

pub use logging::{LoggingError, env_filter, init_logging};
pub use metrics::{
    MetricsConfig, MetricsError, init_metrics, record_algorithm_slice,
    record_algorithm_slice_skipped, record_broker_latency, record_monitor_restart,
    record_monitor_tick, record_monitor_tick_failure, record_order_cancelled, record_order_placed,
    record_order_update_failure, record_placement_failure, record_risk_action,
    record_trailing_stop_ratchet, update_active_orders, update_portfolio_risk,
    update_unprotected_positions,
};
