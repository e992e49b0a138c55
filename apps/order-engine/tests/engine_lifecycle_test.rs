//! End-to-end order lifecycles against the in-memory broker.
//!
//! Each test places orders through the engine, scripts broker fills and
//! market prices, and drives the monitor by hand.

use std::sync::Arc;

use order_engine::application::ports::{BrokerError, BrokerPort, OrderQueryStatus};
use order_engine::application::services::{AdvancedOrderEngine, OrderMonitor, RiskManager};
use order_engine::broker::RetryPolicy;
use order_engine::config::{MonitorConfig, RiskConfig};
use order_engine::domain::advanced_orders::{
    BracketRequest, EngineEvent, ExitPhase, IcebergRequest, OrderSide, OrderStatus, OrderType,
    TimeInForce, TrailingStopRequest,
};
use order_engine::domain::execution_tactics::SliceRequest;
use order_engine::domain::risk_management::{Position, PositionSide};
use order_engine::domain::shared::{Bar, Symbol};
use order_engine::error::ErrorCode;
use order_engine::infrastructure::events::BroadcastEventPublisher;
use order_engine::infrastructure::mock::{MockBroker, MockMarketData};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

struct Harness {
    engine: AdvancedOrderEngine<MockBroker, MockMarketData>,
    monitor: OrderMonitor<MockBroker, MockMarketData>,
    broker: Arc<MockBroker>,
    market_data: Arc<MockMarketData>,
    events: BroadcastEventPublisher,
}

fn harness() -> Harness {
    let broker = Arc::new(MockBroker::new());
    let market_data = Arc::new(MockMarketData::new());
    let events = BroadcastEventPublisher::new(64);
    let engine = AdvancedOrderEngine::new(Arc::clone(&broker), Arc::clone(&market_data))
        .with_event_publisher(Arc::new(events.clone()))
        .with_retry_policy(RetryPolicy::disabled());
    let monitor = OrderMonitor::new(
        engine.clone(),
        MonitorConfig::default(),
        CancellationToken::new(),
    );
    Harness {
        engine,
        monitor,
        broker,
        market_data,
        events,
    }
}

#[tokio::test]
async fn bracket_runs_from_entry_to_stop_out() {
    let h = harness();
    let mut rx = h.events.subscribe();

    let bracket = h
        .engine
        .place_bracket(
            BracketRequest::new("AAPL", OrderSide::Buy, 100, dec!(150), dec!(145), dec!(160))
                .with_second_target(dec!(170)),
        )
        .await
        .unwrap();
    let entry = h.broker.submitted()[0].clone();
    assert_eq!(entry.order_type, OrderType::Limit);
    assert_eq!(entry.time_in_force, TimeInForce::Day);
    assert!(entry.client_order_id.as_str().starts_with("BRACKET_ENTRY_"));

    h.broker.fill(bracket.entry_order_id().unwrap(), 100, dec!(150));
    h.monitor.tick().await;

    let exits = &h.broker.submitted()[1..];
    assert_eq!(exits.len(), 3);
    assert!(exits.iter().all(|leg| leg.time_in_force == TimeInForce::Gtc));
    assert!(exits.iter().all(|leg| leg.side == OrderSide::Sell));

    let active = h.engine.get(bracket.id()).await.unwrap();
    let placed = active.as_bracket().unwrap().clone();
    assert_eq!(placed.exit_phase(), ExitPhase::Protected);

    // First target hits; the stop shrinks to the 50 shares still held.
    h.broker.fill(placed.take_profit_1_order_id().unwrap(), 50, dec!(160));
    h.monitor.tick().await;
    let replaced = h.broker.replaced();
    assert_eq!(replaced.len(), 1);
    assert_eq!(replaced[0].1.quantity, 50);
    assert_eq!(replaced[0].1.stop_price, Some(dec!(145)));

    let resized = h.engine.get(bracket.id()).await.unwrap();
    let stop = resized
        .as_bracket()
        .unwrap()
        .stop_loss_order_id()
        .unwrap()
        .clone();
    h.broker.fill(&stop, 50, dec!(145));
    let summary = h.monitor.tick().await;

    assert_eq!(summary.settled, 1);
    assert_eq!(
        h.broker.cancelled(),
        vec![placed.take_profit_2_order_id().unwrap().clone()]
    );
    assert!(h.engine.list_active().await.is_empty());
    let history = h.engine.list_history();
    assert_eq!(
        history[0].as_bracket().unwrap().exit_phase(),
        ExitPhase::StoppedOut
    );

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.event_type());
    }
    assert_eq!(kinds.first(), Some(&"ORDER_PLACED"));
    assert!(kinds.contains(&"EXIT_LEGS_PLACED"));
}

#[tokio::test]
async fn rejected_bracket_entry_is_not_registered() {
    let h = harness();
    h.broker.fail_next_submit(BrokerError::InsufficientFunds);

    let error = h
        .engine
        .place_bracket(BracketRequest::new(
            "AAPL",
            OrderSide::Buy,
            100,
            dec!(150),
            dec!(145),
            dec!(160),
        ))
        .await
        .unwrap_err();

    assert_eq!(error.code(), ErrorCode::InsufficientMargin);
    assert!(h.engine.list_active().await.is_empty());
    assert!(h.broker.submitted().is_empty());
}

#[tokio::test]
async fn invalid_bracket_never_reaches_the_broker() {
    let h = harness();
    let error = h
        .engine
        .place_bracket(BracketRequest::new(
            "AAPL",
            OrderSide::Buy,
            100,
            dec!(150),
            dec!(155),
            dec!(160),
        ))
        .await
        .unwrap_err();

    assert_eq!(error.code(), ErrorCode::InvalidOrderParams);
    assert!(h.broker.submitted().is_empty());
}

#[tokio::test]
async fn iceberg_works_through_every_slice() {
    let h = harness();
    let iceberg = h
        .engine
        .place_iceberg(IcebergRequest::new(
            "NVDA",
            OrderSide::Buy,
            500,
            200,
            dec!(120),
        ))
        .await
        .unwrap();

    for _ in 0..3 {
        let active = h.engine.get(iceberg.id()).await.unwrap();
        let order = active.as_iceberg().unwrap();
        let slice = order.current_slice_id().unwrap().clone();
        let quantity = h
            .broker
            .submitted()
            .last()
            .map(|request| request.quantity)
            .unwrap();
        h.broker.fill(&slice, quantity, dec!(120));
        h.monitor.tick().await;
    }

    let quantities: Vec<u64> = h.broker.submitted().iter().map(|r| r.quantity).collect();
    assert_eq!(quantities, vec![200, 200, 100]);
    let settled = &h.engine.list_history()[0];
    assert_eq!(settled.status(), OrderStatus::Filled);
    assert_eq!(settled.as_iceberg().unwrap().filled_quantity(), 500);
}

#[tokio::test]
async fn expired_slice_ends_the_iceberg_with_credit_for_the_partial() {
    let h = harness();
    let iceberg = h
        .engine
        .place_iceberg(IcebergRequest::new(
            "NVDA",
            OrderSide::Buy,
            300,
            100,
            dec!(120),
        ))
        .await
        .unwrap();
    let slice = iceberg.current_slice_id().unwrap().clone();

    h.broker.fill(&slice, 40, dec!(120));
    h.broker.set_status(&slice, OrderStatus::Expired);
    let summary = h.monitor.tick().await;

    assert_eq!(summary.settled, 1);
    assert_eq!(h.broker.submitted().len(), 1);
    let settled = &h.engine.list_history()[0];
    assert_eq!(settled.status(), OrderStatus::Expired);
    let order = settled.as_iceberg().unwrap();
    assert_eq!(order.filled_quantity(), 40);
    assert_eq!(order.remaining_quantity(), 260);
}

#[tokio::test]
async fn trailing_stop_ratchets_then_fills() {
    let h = harness();
    let mut rx = h.events.subscribe();
    h.market_data.set_price("TSLA", dec!(200));

    let order = h
        .engine
        .place_trailing_stop(
            TrailingStopRequest::new("TSLA", OrderSide::Buy, 10, dec!(0)).with_trail_percent(dec!(5)),
        )
        .await
        .unwrap();
    assert_eq!(order.current_stop_price(), dec!(190));

    h.market_data.set_price("TSLA", dec!(220));
    h.monitor.tick().await;
    let active = h.engine.get(order.id()).await.unwrap();
    let trailing = active.as_trailing_stop().unwrap();
    assert_eq!(trailing.current_stop_price(), dec!(209));
    assert_eq!(h.broker.replaced()[0].1.stop_price, Some(dec!(209)));

    let ratcheted = std::iter::from_fn(|| rx.try_recv().ok())
        .any(|event| matches!(event, EngineEvent::TrailingStopRatcheted { stop_price, .. } if stop_price == dec!(209)));
    assert!(ratcheted);

    let stop = trailing.stop_order_id().unwrap().clone();
    h.broker.fill(&stop, 10, dec!(209));
    let summary = h.monitor.tick().await;
    assert_eq!(summary.settled, 1);
    assert_eq!(h.engine.list_history()[0].status(), OrderStatus::Filled);
}

#[tokio::test]
async fn cancel_withdraws_every_live_leg() {
    let h = harness();
    let bracket = h
        .engine
        .place_bracket(BracketRequest::new(
            "AAPL",
            OrderSide::Buy,
            10,
            dec!(150),
            dec!(145),
            dec!(160),
        ))
        .await
        .unwrap();
    h.broker.fill(bracket.entry_order_id().unwrap(), 10, dec!(150));
    h.monitor.tick().await;

    assert!(h.engine.cancel(bracket.id()).await);
    assert!(!h.engine.cancel(bracket.id()).await);
    assert_eq!(h.broker.cancelled().len(), 2);
    let open = h.broker.get_orders(OrderQueryStatus::Open).await.unwrap();
    assert!(open.is_empty());
    let history = h.engine.list_history();
    assert_eq!(
        history[0].as_bracket().unwrap().exit_phase(),
        ExitPhase::Withdrawn
    );
}

#[tokio::test(start_paused = true)]
async fn twap_averages_the_executed_slices() {
    let h = harness();
    h.market_data.script_prices(
        "AAPL",
        &[dec!(100), dec!(101), dec!(102), dec!(101), dec!(100)],
    );

    let started = tokio::time::Instant::now();
    let report = h
        .engine
        .execute_twap(SliceRequest::new("AAPL", OrderSide::Buy, 100, 10))
        .await
        .unwrap();

    assert_eq!(report.intervals, 5);
    assert_eq!(report.total_filled, 100);
    assert_eq!(report.average_price, dec!(100.8));
    assert!(
        h.broker
            .submitted()
            .iter()
            .all(|slice| slice.order_type == OrderType::Market && slice.quantity == 20)
    );
    // Four waits of two minutes each.
    assert!(started.elapsed() >= std::time::Duration::from_secs(480));
}

#[tokio::test(start_paused = true)]
async fn twap_and_vwap_fallback_send_the_same_slices() {
    let twap = harness();
    twap.market_data.set_price("AAPL", dec!(100));
    let twap_report = twap
        .engine
        .execute_twap(SliceRequest::new("AAPL", OrderSide::Buy, 101, 10))
        .await
        .unwrap();

    let vwap = harness();
    vwap.market_data.set_price("AAPL", dec!(100));
    let thin: Vec<Bar> = (0..3)
        .map(|_| Bar {
            timestamp: chrono::Utc::now(),
            open: dec!(100),
            high: dec!(100),
            low: dec!(100),
            close: dec!(100),
            volume: 500,
        })
        .collect();
    vwap.market_data.set_bars("AAPL", thin);
    let vwap_report = vwap
        .engine
        .execute_vwap(SliceRequest::new("AAPL", OrderSide::Buy, 101, 10))
        .await
        .unwrap();

    let quantities = |broker: &MockBroker| -> Vec<u64> {
        broker.submitted().iter().map(|r| r.quantity).collect()
    };
    assert_eq!(quantities(&twap.broker), vec![20, 20, 20, 20, 21]);
    assert_eq!(quantities(&twap.broker), quantities(&vwap.broker));
    assert_eq!(twap_report.total_filled, vwap_report.total_filled);
    assert_eq!(twap_report.average_price, dec!(100));
}

#[tokio::test]
async fn risk_manager_sizes_against_the_broker_account() {
    let broker = Arc::new(MockBroker::new());
    let market_data = Arc::new(MockMarketData::new());
    broker.set_positions(vec![Position {
        symbol: Symbol::new("MSFT"),
        quantity: 10,
        side: PositionSide::Long,
        average_entry_price: dec!(400),
        current_price: dec!(410),
        market_value: dec!(4100),
        unrealized_pnl: dec!(100),
    }]);
    let risk = RiskManager::new(broker, market_data, &RiskConfig::default())
        .with_retry_policy(RetryPolicy::disabled());

    let metrics = risk
        .size_position(&Symbol::new("AAPL"), OrderSide::Buy, dec!(50), dec!(48), "conservative")
        .await
        .unwrap();

    assert_eq!(metrics.quantity, 200);
    assert_eq!(metrics.position_value, dec!(10000));
    assert_eq!(
        risk.compute_stop_and_targets(dec!(100), dec!(2), OrderSide::Buy, "conservative")
            .unwrap()
            .stop_loss,
        dec!(96)
    );
}

#[tokio::test]
async fn open_orders_listing_reflects_broker_state() {
    let h = harness();
    h.engine
        .place_iceberg(IcebergRequest::new("NVDA", OrderSide::Buy, 100, 50, dec!(120)))
        .await
        .unwrap();

    let open = h.broker.get_orders(OrderQueryStatus::Open).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].status, OrderStatus::Submitted);
}
