//! Order Monitor
//!
//! The single recurring task that walks the active registry and advances
//! every order through its variant handler.
//!
//! A supervisor task owns the loop. The loop runs in its own task so a
//! panic inside a handler is caught by the supervisor, which waits
//! `restart_backoff` and starts a fresh loop. `stop()` cancels the loop
//! between ticks and waits for the in-flight tick to finish.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::order_engine::AdvancedOrderEngine;
use super::order_handlers::TickQuotes;
use crate::application::ports::{BrokerPort, MarketDataPort};
use crate::broker::retry_transient;
use crate::config::MonitorConfig;
use crate::domain::advanced_orders::{AdvancedOrder, EngineEvent, ExitPhase};
use crate::domain::shared::Symbol;
use crate::observability::{
    record_monitor_restart, record_monitor_tick, record_monitor_tick_failure,
    record_order_update_failure, update_active_orders, update_unprotected_positions,
};

/// Outcome of one pass over the active registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Orders visited.
    pub orders: usize,
    /// Orders whose update failed.
    pub failures: usize,
    /// Orders moved to history during the pass.
    pub settled: usize,
    /// Filled brackets without a full set of exit legs.
    pub unprotected: usize,
    /// Trailing-stop quotes could not be fetched; those stops held still.
    pub quotes_unavailable: bool,
}

impl TickSummary {
    /// Every visited order failed, which points at a broker outage.
    #[must_use]
    pub const fn all_failed(&self) -> bool {
        self.orders > 0 && self.failures == self.orders
    }
}

struct RunningMonitor {
    token: CancellationToken,
    supervisor: JoinHandle<()>,
}

/// Supervised polling loop over an engine's active orders.
pub struct OrderMonitor<B, M> {
    engine: AdvancedOrderEngine<B, M>,
    config: MonitorConfig,
    shutdown: CancellationToken,
    running: Mutex<Option<RunningMonitor>>,
}

impl<B, M> std::fmt::Debug for OrderMonitor<B, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<B, M> OrderMonitor<B, M>
where
    B: BrokerPort + 'static,
    M: MarketDataPort + 'static,
{
    /// Monitor for `engine`. Cancelling `shutdown` stops it as well.
    #[must_use]
    pub fn new(
        engine: AdvancedOrderEngine<B, M>,
        config: MonitorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            config,
            shutdown,
            running: Mutex::new(None),
        }
    }

    /// Start the supervised loop. Returns false if it was already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running
            .as_ref()
            .is_some_and(|monitor| !monitor.supervisor.is_finished())
        {
            return false;
        }

        let token = self.shutdown.child_token();
        let supervisor = tokio::spawn(supervise(
            self.engine.clone(),
            self.config.clone(),
            token.clone(),
        ));
        *running = Some(RunningMonitor { token, supervisor });
        info!(
            tick_interval_secs = self.config.tick_interval_secs,
            "Order monitor started"
        );
        true
    }

    /// Stop the loop and wait for it to finish. No-op when not running.
    pub async fn stop(&self) {
        let Some(monitor) = self.running.lock().await.take() else {
            return;
        };
        monitor.token.cancel();
        if let Err(join_error) = monitor.supervisor.await {
            warn!(error = %join_error, "Order monitor supervisor ended abnormally");
        }
        info!("Order monitor stopped");
    }

    /// True while the supervisor is alive.
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|monitor| !monitor.supervisor.is_finished())
    }

    /// Run one pass by hand.
    pub async fn tick(&self) -> TickSummary {
        tick(&self.engine).await
    }

    /// Wait until the loop exits, either because it was stopped or because
    /// the restart limit was reached.
    pub async fn wait(&self) {
        let Some(monitor) = self.running.lock().await.take() else {
            return;
        };
        if let Err(join_error) = monitor.supervisor.await {
            warn!(error = %join_error, "Order monitor supervisor ended abnormally");
        }
    }
}

/// One pass: prefetch trailing-stop quotes, then update every active order
/// in registry order. A failing order never stops the others, and a quote
/// failure only fails the trailing stops that needed the quotes.
async fn tick<B, M>(engine: &AdvancedOrderEngine<B, M>) -> TickSummary
where
    B: BrokerPort + 'static,
    M: MarketDataPort + 'static,
{
    let started = Instant::now();
    let handles = engine.registry.snapshot();

    let mut symbols: Vec<Symbol> = Vec::new();
    for (_, handle) in &handles {
        if let AdvancedOrder::TrailingStop(order) = &*handle.lock().await
            && !order.is_settled()
            && !symbols.contains(order.symbol())
        {
            symbols.push(order.symbol().clone());
        }
    }
    let quotes: TickQuotes = if symbols.is_empty() {
        Ok(HashMap::new())
    } else {
        retry_transient(&engine.retry, "get_quotes", || {
            engine.market_data.get_quotes(&symbols)
        })
        .await
    };
    if let Err(failure) = &quotes {
        warn!(
            error = %failure,
            symbols = symbols.len(),
            "Trailing stop quotes unavailable this tick"
        );
    }

    let mut summary = TickSummary {
        orders: handles.len(),
        quotes_unavailable: quotes.is_err(),
        ..TickSummary::default()
    };
    for (order_id, handle) in &handles {
        if let Err(failure) = engine.update_order(handle, &quotes).await {
            summary.failures += 1;
            let kind = handle.lock().await.kind();
            record_order_update_failure(kind.as_label());
            warn!(
                order_id = %order_id,
                kind = %kind,
                error = %failure,
                "Order update failed, will retry next tick"
            );
        }
    }

    let remaining = engine.registry.snapshot();
    summary.settled = handles.len().saturating_sub(remaining.len());
    for (_, handle) in &remaining {
        if let AdvancedOrder::Bracket(order) = &*handle.lock().await
            && order.exit_phase() == ExitPhase::Unprotected
        {
            summary.unprotected += 1;
        }
    }

    update_active_orders(remaining.len());
    update_unprotected_positions(summary.unprotected);
    record_monitor_tick(summary.orders, started.elapsed().as_secs_f64());
    debug!(
        orders = summary.orders,
        failures = summary.failures,
        settled = summary.settled,
        unprotected = summary.unprotected,
        "Monitor tick complete"
    );
    summary
}

/// Tick until cancelled. Cancellation is only observed between ticks.
async fn run_loop<B, M>(
    engine: AdvancedOrderEngine<B, M>,
    config: MonitorConfig,
    token: CancellationToken,
) where
    B: BrokerPort + 'static,
    M: MarketDataPort + 'static,
{
    loop {
        let summary = tick(&engine).await;
        let pause = if summary.all_failed() {
            record_monitor_tick_failure();
            warn!(
                failures = summary.failures,
                backoff_secs = config.error_backoff_secs,
                "Every order update failed, backing off"
            );
            config.error_backoff()
        } else {
            config.tick_interval()
        };
        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(pause) => {}
        }
    }
}

/// Run the loop in a child task and restart it when it panics.
async fn supervise<B, M>(
    engine: AdvancedOrderEngine<B, M>,
    config: MonitorConfig,
    token: CancellationToken,
) where
    B: BrokerPort + 'static,
    M: MarketDataPort + 'static,
{
    let mut restarts: u32 = 0;
    loop {
        let run = tokio::spawn(run_loop(engine.clone(), config.clone(), token.clone()));
        match run.await {
            Ok(()) => break,
            Err(join_error) if join_error.is_panic() => {
                if token.is_cancelled() {
                    break;
                }
                restarts += 1;
                record_monitor_restart();
                error!(restarts, "Order monitor loop panicked");
                if config.max_restarts.is_some_and(|max| restarts > max) {
                    error!(restarts, "Order monitor restart limit reached, giving up");
                    break;
                }
                engine
                    .publish(EngineEvent::MonitorRestarted {
                        restarts,
                        occurred_at: Utc::now(),
                    })
                    .await;
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(config.restart_backoff()) => {}
                }
            }
            Err(join_error) => {
                warn!(error = %join_error, "Order monitor loop aborted");
                break;
            }
        }
    }
}
