//! Property tests for the order state machines and slice planners.

use chrono::Utc;
use order_engine::domain::advanced_orders::{
    IcebergOrder, IcebergRequest, LegState, OrderSide, OrderStatus, TrailingStopOrder,
    TrailingStopRequest,
};
use order_engine::domain::execution_tactics::{
    RemainderAllocation, SlicingPolicy, TwapPlan, VwapPlan,
};
use order_engine::domain::risk_management::{
    RiskParameters, SizingInput, SizingLimits, size_position,
};
use order_engine::domain::shared::{Bar, BrokerOrderId, OrderId};
use proptest::prelude::*;
use rust_decimal::Decimal;

proptest! {
    #[test]
    fn long_trailing_stop_follows_the_high(
        trail in 1u32..20,
        reference in 50u32..200,
        prices in prop::collection::vec(1u32..400, 1..40),
    ) {
        let request = TrailingStopRequest::new(
            "TSLA",
            OrderSide::Buy,
            10,
            Decimal::from(trail),
        );
        let mut order = TrailingStopOrder::new(
            OrderId::new("TRAILING_1"),
            &request,
            Decimal::from(reference),
            Utc::now(),
        )
        .unwrap();
        order.mark_submitted(BrokerOrderId::new("stop-1"), Utc::now()).unwrap();

        let mut previous = order.current_stop_price();
        for price in prices {
            order.observe_price(Decimal::from(price), Utc::now());
            let stop = order.current_stop_price();
            prop_assert!(stop >= previous);
            let high = order.highest_price_seen().unwrap();
            prop_assert_eq!(stop, high - Decimal::from(trail));
            previous = stop;
        }
    }

    #[test]
    fn short_trailing_stop_never_rises(
        trail in 1u32..20,
        reference in 50u32..200,
        prices in prop::collection::vec(1u32..400, 1..40),
    ) {
        let request = TrailingStopRequest::new(
            "TSLA",
            OrderSide::Sell,
            10,
            Decimal::from(trail),
        );
        let mut order = TrailingStopOrder::new(
            OrderId::new("TRAILING_2"),
            &request,
            Decimal::from(reference),
            Utc::now(),
        )
        .unwrap();
        order.mark_submitted(BrokerOrderId::new("stop-1"), Utc::now()).unwrap();

        let mut previous = order.current_stop_price();
        for price in prices {
            order.observe_price(Decimal::from(price), Utc::now());
            prop_assert!(order.current_stop_price() <= previous);
            previous = order.current_stop_price();
        }
    }

    #[test]
    fn iceberg_accounts_for_every_share(
        total in 1u64..5_000,
        visible in 1u64..700,
    ) {
        let request = IcebergRequest::new("NVDA", OrderSide::Buy, total, visible, Decimal::from(120));
        let mut order = IcebergOrder::new(OrderId::new("ICEBERG_1"), &request, Utc::now());

        let mut slices = 0u64;
        while order.needs_slice() {
            let quantity = order.next_slice_quantity();
            prop_assert!(quantity > 0 && quantity <= visible);
            slices += 1;
            order.record_slice(BrokerOrderId::new(format!("slice-{slices}")), quantity, Utc::now());
            order.apply_slice_update(&LegState::filled(quantity, Decimal::from(120)), Utc::now());
            prop_assert_eq!(order.filled_quantity() + order.remaining_quantity(), total);
        }

        prop_assert_eq!(order.status(), OrderStatus::Filled);
        prop_assert_eq!(order.filled_quantity(), total);
        prop_assert_eq!(slices, total.div_ceil(visible));
    }

    #[test]
    fn twap_plan_conserves_quantity(
        total in 1u64..100_000,
        duration in 2u32..600,
        first in any::<bool>(),
    ) {
        let policy = SlicingPolicy {
            remainder: if first { RemainderAllocation::First } else { RemainderAllocation::Last },
            ..SlicingPolicy::default()
        };
        let plan = TwapPlan::plan(total, duration, &policy);

        prop_assert_eq!(plan.planned_quantity(), total);
        prop_assert!(plan.interval_count() <= policy.max_intervals);
        prop_assert!(plan.interval_minutes * plan.interval_count() <= duration);
    }

    #[test]
    fn vwap_plan_conserves_quantity(
        total in 1u64..100_000,
        volumes in prop::collection::vec(0u64..1_000_000, 1..60),
    ) {
        prop_assume!(volumes.iter().any(|&v| v > 0));
        let bars: Vec<Bar> = volumes
            .iter()
            .map(|&volume| Bar {
                timestamp: Utc::now(),
                open: Decimal::from(100),
                high: Decimal::from(101),
                low: Decimal::from(99),
                close: Decimal::from(100),
                volume,
            })
            .collect();

        let plan = VwapPlan::plan(&bars, total, RemainderAllocation::Last).unwrap();
        prop_assert_eq!(plan.planned_quantity(), total);
        for slice in &plan.slices {
            if bars[slice.bar_index].volume == 0 {
                prop_assert_eq!(slice.quantity, 0);
            }
        }
    }

    #[test]
    fn sizing_respects_notional_ceiling(
        entry in 1u32..2_000,
        stop_offset in 0u32..50,
        portfolio in 1_000u32..5_000_000,
    ) {
        let entry = Decimal::from(entry);
        let limits = SizingLimits::default();
        let metrics = size_position(
            &RiskParameters::conservative(),
            &limits,
            &SizingInput {
                entry_price: entry,
                stop_loss: entry - Decimal::from(stop_offset).min(entry - Decimal::ONE),
                portfolio_value: Decimal::from(portfolio),
                cash: Decimal::from(portfolio),
                existing_quantity: None,
                sector_exposure: Decimal::ZERO,
                correlation: Decimal::ZERO,
                daily_pnl: Decimal::ZERO,
            },
        );

        prop_assert!(Decimal::from(metrics.quantity) * entry <= limits.max_position_notional);
        prop_assert_eq!(metrics.position_value, Decimal::from(metrics.quantity) * entry);
    }
}
