//! Order Engine Binary
//!
//! Loads configuration, connects to the broker and runs the order monitor
//! until SIGINT or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin order-engine
//! ```
//!
//! # Environment Variables
//!
//! - `ORDER_ENGINE_CONFIG`: config file path (default: `config.yaml`)
//! - `RUST_LOG`: overrides `observability.logging.level`
//!
//! Any `${VAR}` in the config file is interpolated, so credentials usually
//! arrive as `api_key: ${ALPACA_KEY}`. Without credentials the engine runs
//! PAPER mode against the in-memory broker.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use order_engine::application::ports::{BrokerPort, MarketDataPort};
use order_engine::application::services::{AdvancedOrderEngine, OrderMonitor, RiskManager};
use order_engine::config::{Config, load_config, load_config_from_string};
use order_engine::infrastructure::broker::{AlpacaBrokerAdapter, AlpacaConfig};
use order_engine::infrastructure::events::BroadcastEventPublisher;
use order_engine::infrastructure::marketdata::AlpacaMarketDataAdapter;
use order_engine::infrastructure::mock::{MockBroker, MockMarketData};
use order_engine::observability::{MetricsConfig, init_logging, init_metrics};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config = match std::env::var(order_engine::config::CONFIG_PATH_ENV) {
        Ok(path) => load_config(Some(&path)).with_context(|| format!("loading {path}"))?,
        Err(_) if std::path::Path::new("config.yaml").exists() => {
            load_config(None).context("loading config.yaml")?
        }
        Err(_) => load_config_from_string("").context("building default config")?,
    };

    init_logging(&config.observability.logging).context("installing tracing subscriber")?;
    tracing::info!(
        environment = %config.broker.alpaca.environment,
        default_mode = %config.risk.default_mode,
        "Starting order engine"
    );

    if config.observability.metrics.enabled {
        let addr = config
            .observability
            .metrics
            .listen_addr
            .parse()
            .context("parsing metrics listen address")?;
        init_metrics(&MetricsConfig::with_addr(addr)).context("installing metrics exporter")?;
    }

    if config.broker.alpaca.has_credentials() {
        let alpaca = AlpacaConfig::from_settings(&config.broker.alpaca, &config.retry)?;
        let broker = AlpacaBrokerAdapter::new(&alpaca)?;
        let market_data = AlpacaMarketDataAdapter::with_client(broker.http_client().clone());
        run(Arc::new(broker), Arc::new(market_data), &config).await
    } else {
        tracing::warn!("No broker credentials configured, running against the in-memory broker");
        run(
            Arc::new(MockBroker::new()),
            Arc::new(MockMarketData::new()),
            &config,
        )
        .await
    }
}

async fn run<B, M>(broker: Arc<B>, market_data: Arc<M>, config: &Config) -> anyhow::Result<()>
where
    B: BrokerPort + 'static,
    M: MarketDataPort + 'static,
{
    let shutdown = CancellationToken::new();
    let events = BroadcastEventPublisher::default();
    spawn_event_logger(&events, shutdown.clone());

    let engine = AdvancedOrderEngine::new(Arc::clone(&broker), Arc::clone(&market_data))
        .with_event_publisher(Arc::new(events))
        .with_slicing_policy(config.execution.clone())
        .with_retry_policy(config.retry.clone());

    let risk = RiskManager::new(broker, market_data, &config.risk)
        .with_retry_policy(config.retry.clone());
    match risk.assess_portfolio_risk("").await {
        Ok(portfolio) => tracing::info!(
            positions = portfolio.position_count,
            daily_pnl = %portfolio.daily_pnl,
            within_limits = portfolio.within_limits(),
            "Startup portfolio check"
        ),
        Err(e) => tracing::warn!(error = %e, "Startup portfolio check failed"),
    }

    let monitor = OrderMonitor::new(engine, config.monitor.clone(), shutdown.clone());
    if config.monitor.enabled {
        monitor.start().await;
    } else {
        tracing::info!("Order monitor disabled");
    }

    tracing::info!("Order engine ready");
    shutdown_signal().await?;

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, monitor.stop())
        .await
        .is_err()
    {
        tracing::warn!("Order monitor did not stop in time");
    }
    shutdown.cancel();

    tracing::info!("Order engine stopped");
    Ok(())
}

/// Log every engine event until shutdown.
fn spawn_event_logger(events: &BroadcastEventPublisher, shutdown: CancellationToken) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => tracing::info!(
                        event_type = event.event_type(),
                        order_id = ?event.order_id(),
                        "Engine event"
                    ),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event logger lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                tracing::info!("Received Ctrl+C, initiating shutdown");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, initiating shutdown");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C, initiating shutdown");
        Ok(())
    }
}
