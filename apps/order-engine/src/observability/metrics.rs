//! Prometheus metrics for the order engine.
//!
//! Counters and gauges for order placement, monitoring, trailing-stop
//! ratchets and algorithm slicing. Recording is a no-op until a recorder is
//! installed, so every helper is safe to call from tests.
//!
//! # Example
//!
//! ```ignore
//! use order_engine::observability::{init_metrics, MetricsConfig};
//!
//! init_metrics(&MetricsConfig::default())?;
//! record_order_placed("bracket");
//! ```

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for broker latency (in seconds).
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
            // 1ms to 10s
            latency_buckets: vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0],
        }
    }
}

impl MetricsConfig {
    /// Configuration with a custom address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

/// Install the Prometheus exporter, serving `/metrics`.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(
        addr = %config.listen_addr,
        "Prometheus metrics exporter started"
    );

    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

// ============================================================================
// Order Metrics
// ============================================================================

/// An advanced order was accepted and registered.
pub fn record_order_placed(kind: &str) {
    counter!("orders_placed_total", "kind" => kind.to_string()).increment(1);
}

/// A placement failed (validation or broker).
pub fn record_placement_failure(kind: &str, reason: &str) {
    counter!(
        "order_placement_failures_total",
        "kind" => kind.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// An advanced order was cancelled on request.
pub fn record_order_cancelled(kind: &str) {
    counter!("orders_cancelled_total", "kind" => kind.to_string()).increment(1);
}

/// Broker call latency.
pub fn record_broker_latency(operation: &str, latency_seconds: f64) {
    histogram!("broker_request_seconds", "operation" => operation.to_string())
        .record(latency_seconds);
}

/// Orders in the active registry.
pub fn update_active_orders(count: usize) {
    gauge!("active_orders").set(count as f64);
}

/// Filled brackets currently without exit legs.
pub fn update_unprotected_positions(count: usize) {
    gauge!("unprotected_positions").set(count as f64);
}

// ============================================================================
// Monitor Metrics
// ============================================================================

/// A monitor pass completed.
pub fn record_monitor_tick(orders: usize, latency_seconds: f64) {
    counter!("monitor_ticks_total").increment(1);
    histogram!("monitor_tick_seconds").record(latency_seconds);
    gauge!("monitor_orders_per_tick").set(orders as f64);
}

/// A monitor pass failed as a whole.
pub fn record_monitor_tick_failure() {
    counter!("monitor_tick_failures_total").increment(1);
}

/// A single order handler failed inside a pass.
pub fn record_order_update_failure(kind: &str) {
    counter!("order_update_failures_total", "kind" => kind.to_string()).increment(1);
}

/// The monitor loop was restarted after a panic.
pub fn record_monitor_restart() {
    counter!("monitor_restarts_total").increment(1);
}

/// A trailing stop moved.
pub fn record_trailing_stop_ratchet(symbol: &str) {
    counter!("trailing_stop_ratchets_total", "symbol" => symbol.to_string()).increment(1);
}

// ============================================================================
// Execution Algorithm Metrics
// ============================================================================

/// A TWAP/VWAP slice was submitted.
pub fn record_algorithm_slice(algorithm: &str, quantity: u64) {
    counter!("algorithm_slices_total", "algorithm" => algorithm.to_string()).increment(1);
    counter!("algorithm_shares_total", "algorithm" => algorithm.to_string()).increment(quantity);
}

/// A TWAP/VWAP slice was skipped.
pub fn record_algorithm_slice_skipped(algorithm: &str, reason: &str) {
    counter!(
        "algorithm_slices_skipped_total",
        "algorithm" => algorithm.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

// ============================================================================
// Risk Metrics
// ============================================================================

/// Portfolio assessment results.
pub fn update_portfolio_risk(daily_pnl_percent: f64, current_drawdown: f64, alerts: usize) {
    gauge!("portfolio_daily_pnl_ratio").set(daily_pnl_percent);
    gauge!("portfolio_drawdown_ratio").set(current_drawdown);
    gauge!("portfolio_risk_alerts").set(alerts as f64);
}

/// A risk action was recommended.
pub fn record_risk_action(action: &str) {
    counter!("risk_actions_total", "action" => action.to_string()).increment(1);
}
