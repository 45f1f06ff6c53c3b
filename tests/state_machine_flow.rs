//! Exit-path scenarios: partial profit, trailing ratchet, secure-profit
//! lock, and stop-driven full exits, driven through the real order
//! manager against a scripted venue.

mod common;

use common::{flat_window, MockExchangeAdapter};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;

use tradepulse::application::market_data::MarketDataCache;
use tradepulse::application::orders::OrderManager;
use tradepulse::application::positions::{
    ManagementStyle, PositionCache, PositionStateMachine, TickOutcome,
};
use tradepulse::application::risk::RiskManager;
use tradepulse::config::{RiskEnvConfig, SniperEnvConfig};
use tradepulse::domain::market::Interval;
use tradepulse::domain::ports::ExchangeAdapter;
use tradepulse::domain::trading::types::{Exchange, OrderSide, OrderStatus};
use tradepulse::domain::trading::PositionUpdateData;
use tradepulse::infrastructure::repositories::{
    InMemoryOrderRepository, InMemorySignalPerformanceRepository,
};

struct Stack {
    adapter: Arc<MockExchangeAdapter>,
    cache: Arc<PositionCache>,
    orders: Arc<OrderManager>,
    machine: PositionStateMachine,
}

fn build_stack(adapter: Arc<MockExchangeAdapter>) -> Stack {
    let mut adapters: HashMap<Exchange, Arc<dyn ExchangeAdapter>> = HashMap::new();
    adapters.insert(Exchange::Bybit, adapter.clone() as Arc<dyn ExchangeAdapter>);

    let market_data = Arc::new(MarketDataCache::new(adapters.clone()));
    let cache = Arc::new(PositionCache::new());
    let orders = Arc::new(OrderManager::new(
        adapters,
        Arc::clone(&cache),
        Arc::new(InMemoryOrderRepository::new()),
    ));
    let risk = Arc::new(RiskManager::new(
        RiskEnvConfig::default(),
        market_data,
        Arc::clone(&cache),
        Arc::new(InMemorySignalPerformanceRepository::new()),
        0.01,
    ));
    let machine = PositionStateMachine::new(
        SniperEnvConfig::default(),
        Arc::clone(&orders),
        Arc::clone(&cache),
        risk,
    );

    Stack {
        adapter,
        cache,
        orders,
        machine,
    }
}

async fn seed_long(stack: &Stack, entry: rust_decimal::Decimal, stop: rust_decimal::Decimal) {
    let position = PositionUpdateData::new(
        "BTCUSDT",
        OrderSide::Buy,
        dec!(10),
        entry,
        25,
        Exchange::Bybit,
    );
    stack.adapter.set_position(position.clone()).await;
    stack.cache.apply_venue_update(position).await;
    stack
        .cache
        .update_strategy_info("BTCUSDT", Some(stop), None, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pt1_partial_close_at_two_r() {
    let adapter = Arc::new(MockExchangeAdapter::new());
    // Constant true range of 1.0 => ATR(14) == 1.0.
    adapter
        .set_candles("BTCUSDT", Interval::OneHour, flat_window(15, 100.0, 0.5))
        .await;
    let stack = build_stack(adapter);
    seed_long(&stack, dec!(100), dec!(99)).await;

    // R = 1, 2R target = 102; current price reaches it.
    let position = stack.cache.get("BTCUSDT").await.unwrap();
    let outcome = stack
        .machine
        .run_tick(
            &position,
            dec!(102),
            Interval::OneHour,
            Exchange::Bybit,
            ManagementStyle::Sniper,
        )
        .await
        .unwrap();

    // New stop: max(entry 100, 102 - 1.5 * ATR) = 100.5.
    assert_eq!(outcome, TickOutcome::Pt1Taken { new_stop: dec!(100.5) });

    let placed = stack.adapter.placed().await;
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].side, OrderSide::Sell);
    assert_eq!(placed[0].quantity, dec!(5));
    assert!(placed[0].strategy_name.contains("pt1"));

    let updated = stack.cache.get("BTCUSDT").await.unwrap();
    assert!(updated.pt1_taken);
    assert_eq!(updated.strategy_stop_loss, Some(dec!(100.5)));
}

#[tokio::test]
async fn test_pt1_taken_only_once() {
    let adapter = Arc::new(MockExchangeAdapter::new());
    adapter
        .set_candles("BTCUSDT", Interval::OneHour, flat_window(15, 100.0, 0.5))
        .await;
    let stack = build_stack(adapter);
    seed_long(&stack, dec!(100), dec!(99)).await;

    let position = stack.cache.get("BTCUSDT").await.unwrap();
    stack
        .machine
        .run_tick(
            &position,
            dec!(102),
            Interval::OneHour,
            Exchange::Bybit,
            ManagementStyle::Sniper,
        )
        .await
        .unwrap();

    // Second tick at the same price: the flag blocks a second partial;
    // with the stop at 100.5 and price 102 nothing else fires either.
    let position = stack.cache.get("BTCUSDT").await.unwrap();
    assert!(position.pt1_taken);
    let outcome = stack
        .machine
        .run_tick(
            &position,
            dec!(102),
            Interval::OneHour,
            Exchange::Bybit,
            ManagementStyle::Sniper,
        )
        .await
        .unwrap();

    let partials = stack
        .adapter
        .placed()
        .await
        .iter()
        .filter(|r| r.strategy_name.contains("pt1"))
        .count();
    assert_eq!(partials, 1);
    // Trailing from 102 with ATR 1: candidate 100.5 does not improve.
    assert_eq!(outcome, TickOutcome::NoAction);
}

#[tokio::test]
async fn test_trailing_ratchet_short_then_stop_out() {
    let adapter = Arc::new(MockExchangeAdapter::new());
    // Constant true range 0.5 => ATR == 0.5; trail distance 0.75.
    adapter
        .set_candles("BTCUSDT", Interval::OneHour, flat_window(15, 100.0, 0.25))
        .await;
    let stack = build_stack(adapter);

    let mut position = PositionUpdateData::new(
        "BTCUSDT",
        OrderSide::Sell,
        dec!(10),
        dec!(100),
        25,
        Exchange::Bybit,
    );
    position.pt1_taken = true;
    stack.adapter.set_position(position.clone()).await;
    stack.cache.apply_venue_update(position).await;
    stack
        .cache
        .update_strategy_info("BTCUSDT", Some(dec!(99)), Some(true), None)
        .await
        .unwrap();

    // Tick 1 at 95: candidate 95.75 improves on 99.
    let position = stack.cache.get("BTCUSDT").await.unwrap();
    let outcome = stack
        .machine
        .run_tick(
            &position,
            dec!(95),
            Interval::OneHour,
            Exchange::Bybit,
            ManagementStyle::Sniper,
        )
        .await
        .unwrap();
    assert_eq!(outcome, TickOutcome::StopRatcheted { new_stop: dec!(95.75) });

    // Tick 2 at 96: candidate 96.75 would loosen the stop, so it stays at
    // 95.75 — and 96 >= 95.75 stops the position out.
    let position = stack.cache.get("BTCUSDT").await.unwrap();
    assert_eq!(position.strategy_stop_loss, Some(dec!(95.75)));
    let outcome = stack
        .machine
        .run_tick(
            &position,
            dec!(96),
            Interval::OneHour,
            Exchange::Bybit,
            ManagementStyle::Sniper,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, TickOutcome::FullExit { .. }));

    let placed = stack.adapter.placed().await;
    let exit = placed.last().unwrap();
    assert_eq!(exit.side, OrderSide::Buy);
    assert_eq!(exit.quantity, dec!(10));
}

#[tokio::test]
async fn test_secure_profit_lock_long() {
    let adapter = Arc::new(MockExchangeAdapter::new());
    adapter
        .set_candles("BTCUSDT", Interval::FourHour, flat_window(15, 100.0, 0.5))
        .await;
    let stack = build_stack(adapter);

    let position = PositionUpdateData::new(
        "BTCUSDT",
        OrderSide::Buy,
        dec!(10),
        dec!(100),
        1,
        Exchange::Bybit,
    );
    stack.adapter.set_position(position.clone()).await;
    stack.cache.apply_venue_update(position).await;

    // +31% unrealized: stop pinned at entry * 1.30.
    let position = stack.cache.get("BTCUSDT").await.unwrap();
    let outcome = stack
        .machine
        .run_tick(
            &position,
            dec!(131),
            Interval::FourHour,
            Exchange::Bybit,
            ManagementStyle::SecureProfit,
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        TickOutcome::SecureProfitLocked { new_stop: dec!(130.0) }
    );

    let updated = stack.cache.get("BTCUSDT").await.unwrap();
    assert!(updated.secure_profit_sl_applied);

    // Applied once; the next tick does nothing new.
    let outcome = stack
        .machine
        .run_tick(
            &updated,
            dec!(135),
            Interval::FourHour,
            Exchange::Bybit,
            ManagementStyle::SecureProfit,
        )
        .await
        .unwrap();
    assert_eq!(outcome, TickOutcome::NoAction);
}

#[tokio::test]
async fn test_cancel_after_fill_is_noop() {
    let adapter = Arc::new(MockExchangeAdapter::new());
    let stack = build_stack(Arc::clone(&adapter));

    let request = tradepulse::domain::trading::types::OrderRequest::market(
        "BTCUSDT",
        OrderSide::Buy,
        dec!(1),
        "test",
    );
    let order = stack.orders.place(&request, Exchange::Bybit).await.unwrap();
    assert_eq!(order.status, OrderStatus::Filled);

    let canceled = stack
        .orders
        .cancel("BTCUSDT", &order.order_id, Exchange::Bybit)
        .await
        .unwrap();
    assert_eq!(canceled.status, OrderStatus::Filled);
    assert_eq!(canceled.order_id, order.order_id);
    // The venue cancel endpoint was never touched.
    assert_eq!(
        adapter
            .cancel_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}
