//! Alpaca adapters against a local HTTP server.

use order_engine::application::ports::{
    BrokerError, BrokerPort, MarketDataPort, SubmitOrderRequest,
};
use order_engine::broker::RetryPolicy;
use order_engine::domain::advanced_orders::{OrderSide, OrderStatus, TimeInForce};
use order_engine::domain::risk_management::PositionSide;
use order_engine::domain::shared::{BrokerOrderId, ClientOrderId, Symbol, Timeframe};
use order_engine::infrastructure::broker::{AlpacaBrokerAdapter, AlpacaConfig, AlpacaEnvironment};
use order_engine::infrastructure::marketdata::AlpacaMarketDataAdapter;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> AlpacaConfig {
    AlpacaConfig::new("key".into(), "secret".into(), AlpacaEnvironment::Paper)
        .with_base_url(&server.uri())
        .with_retry(RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            ..RetryPolicy::default()
        })
}

fn order_json(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "client_order_id": "BRACKET_ENTRY_abcd1234",
        "symbol": "AAPL",
        "filled_qty": "0",
        "filled_avg_price": null,
        "status": status,
    })
}

fn entry_request() -> SubmitOrderRequest {
    SubmitOrderRequest::limit(
        ClientOrderId::new("BRACKET_ENTRY_abcd1234"),
        Symbol::new("AAPL"),
        OrderSide::Buy,
        100,
        dec!(150.25),
    )
}

#[tokio::test]
async fn submit_posts_the_alpaca_order_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/orders"))
        .and(header("APCA-API-KEY-ID", "key"))
        .and(header("APCA-API-SECRET-KEY", "secret"))
        .and(body_json(json!({
            "symbol": "AAPL",
            "qty": "100",
            "side": "buy",
            "type": "limit",
            "time_in_force": "day",
            "limit_price": "150.25",
            "client_order_id": "BRACKET_ENTRY_abcd1234",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json("ord-1", "new")))
        .expect(1)
        .mount(&server)
        .await;

    let broker = AlpacaBrokerAdapter::new(&config(&server)).unwrap();
    let ack = broker.submit_order(entry_request()).await.unwrap();

    assert_eq!(ack.broker_order_id, BrokerOrderId::new("ord-1"));
    assert_eq!(ack.status, OrderStatus::Submitted);
    assert_eq!(
        ack.client_order_id,
        Some(ClientOrderId::new("BRACKET_ENTRY_abcd1234"))
    );
}

#[tokio::test]
async fn submit_is_not_retried_after_a_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/orders"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "code": 50_010_000,
            "message": "internal error",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let broker = AlpacaBrokerAdapter::new(&config(&server)).unwrap();
    let error = broker.submit_order(entry_request()).await.unwrap_err();

    assert!(matches!(error, BrokerError::Unknown { .. }));
}

#[tokio::test]
async fn buying_power_rejection_maps_to_insufficient_funds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/orders"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": 40_310_000,
            "message": "insufficient buying power",
        })))
        .mount(&server)
        .await;

    let broker = AlpacaBrokerAdapter::new(&config(&server)).unwrap();
    let error = broker.submit_order(entry_request()).await.unwrap_err();

    assert_eq!(error, BrokerError::InsufficientFunds);
}

#[tokio::test]
async fn reads_are_retried_through_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/orders/ord-1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/orders/ord-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ord-1",
            "symbol": "AAPL",
            "filled_qty": "40",
            "filled_avg_price": "150.1",
            "status": "partially_filled",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let broker = AlpacaBrokerAdapter::new(&config(&server)).unwrap();
    let ack = broker
        .get_order(&BrokerOrderId::new("ord-1"))
        .await
        .unwrap();

    assert_eq!(ack.status, OrderStatus::PartiallyFilled);
    assert_eq!(ack.filled_quantity, 40);
    assert_eq!(ack.average_fill_price, Some(dec!(150.1)));
    assert_eq!(ack.client_order_id, None);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/orders/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": 40_410_000,
            "message": "order not found",
        })))
        .mount(&server)
        .await;

    let broker = AlpacaBrokerAdapter::new(&config(&server)).unwrap();
    let error = broker
        .get_order(&BrokerOrderId::new("missing"))
        .await
        .unwrap_err();

    assert_eq!(
        error,
        BrokerError::OrderNotFound {
            order_id: "missing".into()
        }
    );
}

#[tokio::test]
async fn cancel_reads_back_the_resulting_status() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/orders/ord-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/orders/ord-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json("ord-1", "canceled")))
        .mount(&server)
        .await;

    let broker = AlpacaBrokerAdapter::new(&config(&server)).unwrap();
    let ack = broker
        .cancel_order(&BrokerOrderId::new("ord-1"))
        .await
        .unwrap();

    assert_eq!(ack.status, "canceled");
}

#[tokio::test]
async fn replace_patches_the_stop_in_place() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v2/orders/stop-1"))
        .and(body_json(json!({
            "qty": "50",
            "time_in_force": "gtc",
            "stop_price": "145",
            "client_order_id": "BRACKET_SL_0000beef",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json("stop-2", "accepted")))
        .expect(1)
        .mount(&server)
        .await;

    let broker = AlpacaBrokerAdapter::new(&config(&server)).unwrap();
    let replacement = SubmitOrderRequest::stop(
        ClientOrderId::new("BRACKET_SL_0000beef"),
        Symbol::new("AAPL"),
        OrderSide::Sell,
        50,
        dec!(145),
    )
    .with_time_in_force(TimeInForce::Gtc);
    let ack = broker
        .replace_order(&BrokerOrderId::new("stop-1"), replacement)
        .await
        .unwrap();

    assert_eq!(ack.broker_order_id, BrokerOrderId::new("stop-2"));
}

#[tokio::test]
async fn account_and_positions_are_converted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cash": "25000.50",
            "buying_power": "50000",
            "equity": "101000",
            "last_equity": "100000",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/positions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "symbol": "TSLA",
            "qty": "-20",
            "side": "short",
            "avg_entry_price": "250",
            "market_value": "-4800",
            "current_price": "240",
            "unrealized_pl": "200",
        }])))
        .mount(&server)
        .await;

    let broker = AlpacaBrokerAdapter::new(&config(&server)).unwrap();
    let account = broker.get_account().await.unwrap();
    let positions = broker.get_positions().await.unwrap();

    assert_eq!(account.portfolio_value, dec!(101000));
    assert_eq!(account.cash, dec!(25000.50));
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].side, PositionSide::Short);
    assert_eq!(positions[0].quantity, 20);
    assert_eq!(positions[0].market_value, dec!(4800));
}

#[tokio::test]
async fn snapshots_become_quotes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/snapshots"))
        .and(query_param("symbols", "AAPL,ZZZZ"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "AAPL": {
                "latestTrade": { "t": "2026-03-02T15:30:00Z", "p": 150.5 },
                "latestQuote": { "t": "2026-03-02T15:30:00Z", "bp": 150.25, "ap": 150.75 },
                "dailyBar": {
                    "t": "2026-03-02T05:00:00Z",
                    "o": 149, "h": 151, "l": 148.5, "c": 150.5, "v": 1200000
                }
            },
            "ZZZZ": null
        })))
        .mount(&server)
        .await;

    let market_data = AlpacaMarketDataAdapter::new(&config(&server)).unwrap();
    let quotes = market_data
        .get_quotes(&[Symbol::new("AAPL"), Symbol::new("ZZZZ")])
        .await
        .unwrap();

    assert_eq!(quotes.len(), 1);
    let quote = &quotes[&Symbol::new("AAPL")];
    assert_eq!(quote.price, dec!(150.5));
    assert_eq!(quote.bid, dec!(150.25));
    assert_eq!(quote.ask, dec!(150.75));
    assert_eq!(quote.volume, 1_200_000);
}

#[tokio::test]
async fn bars_come_back_oldest_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/bars"))
        .and(query_param("timeframe", "1Min"))
        .and(query_param("limit", "2"))
        .and(query_param("sort", "desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bars": [
                { "t": "2026-03-02T15:31:00Z", "o": 151, "h": 152, "l": 150, "c": 151.5, "v": 900 },
                { "t": "2026-03-02T15:30:00Z", "o": 150, "h": 151, "l": 149, "c": 151, "v": 1100 }
            ],
            "symbol": "AAPL",
            "next_page_token": null
        })))
        .mount(&server)
        .await;

    let market_data = AlpacaMarketDataAdapter::new(&config(&server)).unwrap();
    let bars = market_data
        .get_bars(&Symbol::new("AAPL"), Timeframe::OneMinute, 2)
        .await
        .unwrap();

    assert_eq!(bars.len(), 2);
    assert!(bars[0].timestamp < bars[1].timestamp);
    assert_eq!(bars[0].volume, 1100);
    assert_eq!(bars[1].close, dec!(151.5));
}
