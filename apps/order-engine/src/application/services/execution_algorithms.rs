//! TWAP and VWAP execution.
//!
//! Both run to completion inside the caller's task. A slice that cannot be
//! priced or submitted is skipped and logged; the run moves on to the next
//! slice and never retries a failed one.

use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use super::order_engine::AdvancedOrderEngine;
use crate::application::ports::{BrokerPort, MarketDataPort, SubmitOrderRequest};
use crate::broker::retry_transient;
use crate::domain::execution_tactics::{
    Algorithm, ExecutionReport, ExecutionSlice, SliceRequest, TwapPlan, VwapPlan,
    violates_price_limit,
};
use crate::domain::shared::{ClientOrderId, Timeframe};
use crate::error::EngineError;
use crate::observability::{record_algorithm_slice, record_algorithm_slice_skipped};

/// VWAP limit prices are sent with cent precision.
const PRICE_DECIMALS: u32 = 2;

impl<B, M> AdvancedOrderEngine<B, M>
where
    B: BrokerPort + 'static,
    M: MarketDataPort + 'static,
{
    /// Split `request` evenly across the window and send one MARKET order
    /// per interval.
    ///
    /// Interval `i` waits until `start + i × interval`. An interval whose
    /// quote breaches the price limit is skipped without consuming shares
    /// from later intervals.
    ///
    /// # Errors
    ///
    /// Only `Validation`; slice failures are reported as skipped intervals.
    pub async fn execute_twap(&self, request: SliceRequest) -> Result<ExecutionReport, EngineError> {
        request.validate(&self.slicing)?;
        let plan = TwapPlan::plan(request.total_quantity, request.duration_minutes, &self.slicing);
        let started_at = Utc::now();
        let start = Instant::now();
        let interval = Duration::from_secs(u64::from(plan.interval_minutes) * 60);

        info!(
            symbol = %request.symbol,
            side = %request.side,
            total_quantity = request.total_quantity,
            intervals = plan.interval_count(),
            interval_minutes = plan.interval_minutes,
            "TWAP started"
        );

        let mut executions = Vec::new();
        for (index, quantity) in (0_u32..).zip(plan.quantities.iter().copied()) {
            let number = index + 1;
            if index > 0 {
                sleep_until(start + interval * index).await;
            }
            if quantity == 0 {
                record_algorithm_slice_skipped("twap", "zero_quantity");
                continue;
            }

            let quote = match self.quote(&request.symbol).await {
                Ok(Some(quote)) => quote,
                Ok(None) => {
                    warn!(symbol = %request.symbol, interval = number, "No quote, skipping TWAP interval");
                    record_algorithm_slice_skipped("twap", "no_quote");
                    continue;
                }
                Err(failure) => {
                    warn!(
                        symbol = %request.symbol,
                        interval = number,
                        error = %failure,
                        "Quote failed, skipping TWAP interval"
                    );
                    record_algorithm_slice_skipped("twap", "market_data");
                    continue;
                }
            };
            if violates_price_limit(request.side, quote.price, request.price_limit) {
                info!(
                    symbol = %request.symbol,
                    interval = number,
                    price = %quote.price,
                    limit = ?request.price_limit,
                    "Price limit breached, skipping TWAP interval"
                );
                record_algorithm_slice_skipped("twap", "price_limit");
                continue;
            }

            let client_order_id = ClientOrderId::tagged(&format!("TWAP_{number}"));
            let order = SubmitOrderRequest::market(
                client_order_id.clone(),
                request.symbol.clone(),
                request.side,
                quantity,
            );
            match self.submit(order).await {
                Ok(ack) => {
                    debug!(
                        symbol = %request.symbol,
                        interval = number,
                        quantity,
                        price = %quote.price,
                        broker_order_id = %ack.broker_order_id,
                        "TWAP slice sent"
                    );
                    record_algorithm_slice("twap", quantity);
                    executions.push(ExecutionSlice {
                        interval: number,
                        quantity,
                        price: quote.price,
                        broker_order_id: ack.broker_order_id,
                        client_order_id,
                        volume_weight: None,
                        timestamp: Utc::now(),
                    });
                }
                Err(failure) => {
                    warn!(
                        symbol = %request.symbol,
                        interval = number,
                        error = %failure,
                        "TWAP slice rejected, moving on"
                    );
                    record_algorithm_slice_skipped("twap", "broker");
                }
            }
        }

        let report = ExecutionReport::from_slices(
            Algorithm::Twap,
            request.symbol,
            request.side,
            request.total_quantity,
            request.duration_minutes,
            plan.interval_count(),
            executions,
            started_at,
        );
        log_report(&report);
        Ok(report)
    }

    /// Weight the run by the volume profile of the last `duration` one-minute
    /// bars and send one LIMIT order per bar at its typical price.
    ///
    /// Falls back to [`execute_twap`](Self::execute_twap) with the same
    /// request when the bars are unavailable, too few, or carry no volume.
    ///
    /// # Errors
    ///
    /// Only `Validation`; slice failures are reported as skipped intervals.
    pub async fn execute_vwap(&self, request: SliceRequest) -> Result<ExecutionReport, EngineError> {
        request.validate(&self.slicing)?;
        let lookback = request.duration_minutes as usize;
        let bars = match retry_transient(&self.retry, "get_bars", || {
            self.market_data
                .get_bars(&request.symbol, Timeframe::OneMinute, lookback)
        })
        .await
        {
            Ok(bars) => bars,
            Err(failure) => {
                warn!(symbol = %request.symbol, error = %failure, "Bars unavailable, falling back to TWAP");
                return self.execute_twap(request).await;
            }
        };
        if bars.len() < self.slicing.vwap_min_bars {
            info!(
                symbol = %request.symbol,
                bars = bars.len(),
                required = self.slicing.vwap_min_bars,
                "Too few bars for VWAP, falling back to TWAP"
            );
            return self.execute_twap(request).await;
        }
        let Some(plan) = VwapPlan::plan(&bars, request.total_quantity, self.slicing.remainder)
        else {
            info!(symbol = %request.symbol, "Bars carry no volume, falling back to TWAP");
            return self.execute_twap(request).await;
        };

        let started_at = Utc::now();
        let start = Instant::now();
        let pause = Duration::from_secs(self.slicing.vwap_slice_seconds);
        info!(
            symbol = %request.symbol,
            side = %request.side,
            total_quantity = request.total_quantity,
            bars = plan.slices.len(),
            "VWAP started"
        );

        let mut executions = Vec::new();
        for (index, slice) in (0_u32..).zip(plan.slices.iter()) {
            let number = index + 1;
            if slice.quantity == 0 {
                record_algorithm_slice_skipped("vwap", "zero_quantity");
                continue;
            }
            if index > 0 {
                sleep_until(start + pause * index).await;
            }

            let price = slice.typical_price.round_dp(PRICE_DECIMALS);
            if violates_price_limit(request.side, price, request.price_limit) {
                info!(
                    symbol = %request.symbol,
                    interval = number,
                    price = %price,
                    limit = ?request.price_limit,
                    "Price limit breached, skipping VWAP slice"
                );
                record_algorithm_slice_skipped("vwap", "price_limit");
                continue;
            }

            let client_order_id = ClientOrderId::tagged(&format!("VWAP_{number}"));
            let order = SubmitOrderRequest::limit(
                client_order_id.clone(),
                request.symbol.clone(),
                request.side,
                slice.quantity,
                price,
            );
            match self.submit(order).await {
                Ok(ack) => {
                    debug!(
                        symbol = %request.symbol,
                        interval = number,
                        quantity = slice.quantity,
                        price = %price,
                        weight = %slice.volume_weight,
                        broker_order_id = %ack.broker_order_id,
                        "VWAP slice sent"
                    );
                    record_algorithm_slice("vwap", slice.quantity);
                    executions.push(ExecutionSlice {
                        interval: number,
                        quantity: slice.quantity,
                        price,
                        broker_order_id: ack.broker_order_id,
                        client_order_id,
                        volume_weight: Some(slice.volume_weight),
                        timestamp: Utc::now(),
                    });
                }
                Err(failure) => {
                    warn!(
                        symbol = %request.symbol,
                        interval = number,
                        error = %failure,
                        "VWAP slice rejected, moving on"
                    );
                    record_algorithm_slice_skipped("vwap", "broker");
                }
            }
        }

        let intervals = u32::try_from(plan.slices.len()).unwrap_or(u32::MAX);
        let report = ExecutionReport::from_slices(
            Algorithm::Vwap,
            request.symbol,
            request.side,
            request.total_quantity,
            request.duration_minutes,
            intervals,
            executions,
            started_at,
        );
        log_report(&report);
        Ok(report)
    }
}

fn log_report(report: &ExecutionReport) {
    let average_price = if report.total_filled == 0 {
        Decimal::ZERO
    } else {
        report.average_price.round_dp(4)
    };
    info!(
        algorithm = %report.algorithm,
        symbol = %report.symbol,
        total_filled = report.total_filled,
        unexecuted = report.unexecuted_quantity(),
        skipped = report.skipped,
        average_price = %average_price,
        "Execution complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::BrokerError;
    use crate::broker::RetryPolicy;
    use crate::domain::advanced_orders::{OrderSide, OrderType};
    use crate::domain::shared::Bar;
    use crate::infrastructure::mock::{MockBroker, MockMarketData};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn engine() -> (
        AdvancedOrderEngine<MockBroker, MockMarketData>,
        Arc<MockBroker>,
        Arc<MockMarketData>,
    ) {
        let broker = Arc::new(MockBroker::new());
        let market_data = Arc::new(MockMarketData::new());
        let engine = AdvancedOrderEngine::new(Arc::clone(&broker), Arc::clone(&market_data))
            .with_retry_policy(RetryPolicy::disabled());
        (engine, broker, market_data)
    }

    fn bars(volumes: &[u64]) -> Vec<Bar> {
        volumes
            .iter()
            .map(|&volume| Bar {
                timestamp: Utc::now(),
                open: dec!(100),
                high: dec!(101),
                low: dec!(99),
                close: dec!(100.5),
                volume,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn twap_averages_executed_intervals() {
        let (engine, broker, market_data) = engine();
        market_data.script_prices(
            "AAPL",
            &[dec!(100), dec!(101), dec!(102), dec!(101), dec!(100)],
        );

        let report = engine
            .execute_twap(SliceRequest::new("AAPL", OrderSide::Buy, 100, 10))
            .await
            .unwrap();

        assert_eq!(report.intervals, 5);
        assert_eq!(report.total_filled, 100);
        assert_eq!(report.average_price, dec!(100.8));
        assert!(
            broker
                .submitted()
                .iter()
                .all(|order| order.order_type == OrderType::Market && order.quantity == 20)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn twap_skips_intervals_beyond_limit() {
        let (engine, broker, market_data) = engine();
        market_data.script_prices(
            "AAPL",
            &[dec!(100), dec!(103), dec!(102), dec!(101), dec!(100)],
        );

        let report = engine
            .execute_twap(SliceRequest::new("AAPL", OrderSide::Buy, 100, 10).with_price_limit(dec!(101)))
            .await
            .unwrap();

        assert_eq!(report.skipped, 2);
        assert_eq!(report.total_filled, 60);
        assert_eq!(broker.submitted().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn twap_continues_after_rejected_slice() {
        let (engine, broker, market_data) = engine();
        market_data.set_price("AAPL", dec!(100));
        broker.fail_submit_at(2, BrokerError::OrderRejected {
            reason: "halted".into(),
        });

        let report = engine
            .execute_twap(SliceRequest::new("AAPL", OrderSide::Sell, 100, 10))
            .await
            .unwrap();

        assert_eq!(report.executions.len(), 4);
        assert_eq!(report.unexecuted_quantity(), 20);
        let intervals: Vec<_> = report.executions.iter().map(|s| s.interval).collect();
        assert_eq!(intervals, vec![1, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn twap_waits_between_intervals() {
        let (engine, _, market_data) = engine();
        market_data.set_price("AAPL", dec!(100));
        let started = Instant::now();

        engine
            .execute_twap(SliceRequest::new("AAPL", OrderSide::Buy, 100, 10))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(8 * 60));
    }

    #[tokio::test]
    async fn twap_rejects_short_window() {
        let (engine, broker, _) = engine();
        let error = engine
            .execute_twap(SliceRequest::new("AAPL", OrderSide::Buy, 100, 1))
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::Validation(_)));
        assert!(broker.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn vwap_with_few_bars_matches_twap() {
        let (engine, broker, market_data) = engine();
        market_data.set_bars("AAPL", bars(&[100; 5]));
        market_data.set_price("AAPL", dec!(100));

        let request = SliceRequest::new("AAPL", OrderSide::Buy, 100, 10);
        let report = engine.execute_vwap(request).await.unwrap();

        assert_eq!(report.algorithm, Algorithm::Twap);
        assert_eq!(report.total_filled, 100);
        assert!(
            broker
                .submitted()
                .iter()
                .all(|order| order.client_order_id.as_str().starts_with("TWAP_"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn vwap_places_limits_at_typical_price() {
        let (engine, broker, market_data) = engine();
        let mut volumes = vec![100; 9];
        volumes.push(1_000);
        market_data.set_bars("AAPL", bars(&volumes));

        let report = engine
            .execute_vwap(SliceRequest::new("AAPL", OrderSide::Buy, 190, 10))
            .await
            .unwrap();

        assert_eq!(report.algorithm, Algorithm::Vwap);
        assert_eq!(report.total_filled, 190);
        let submitted = broker.submitted();
        assert_eq!(submitted.len(), 10);
        assert_eq!(submitted[9].quantity, 100);
        assert!(submitted.iter().all(|order| order.order_type == OrderType::Limit
            && order.limit_price == Some(dec!(100.17))));
        assert_eq!(report.executions[9].volume_weight, Some(dec!(1000) / dec!(1900)));
    }

    #[tokio::test(start_paused = true)]
    async fn vwap_falls_back_when_bars_fail() {
        let (engine, _, market_data) = engine();
        market_data.fail_bars(crate::application::ports::MarketDataError::DataUnavailable {
            message: "closed".into(),
        });
        market_data.set_price("AAPL", dec!(100));

        let report = engine
            .execute_vwap(SliceRequest::new("AAPL", OrderSide::Buy, 100, 10))
            .await
            .unwrap();
        assert_eq!(report.algorithm, Algorithm::Twap);
    }
}
