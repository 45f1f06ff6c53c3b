//! Shared test doubles: a scriptable exchange adapter and stack builders.
#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use tradepulse::domain::market::{Candle, Interval};
use tradepulse::domain::ports::{ExchangeAdapter, InstrumentScales};
use tradepulse::domain::trading::types::{
    Exchange, MarketType, Order, OrderRequest, OrderStatus,
};
use tradepulse::domain::trading::PositionUpdateData;

pub struct MockExchangeAdapter {
    pub candles: Mutex<HashMap<(String, Interval), Vec<Candle>>>,
    pub prices: Mutex<HashMap<String, Decimal>>,
    pub equity: Decimal,
    pub positions: Mutex<Vec<PositionUpdateData>>,
    pub orders: Mutex<HashMap<String, Order>>,
    pub placed_requests: Mutex<Vec<OrderRequest>>,
    pub kline_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub kline_delay_ms: u64,
    next_id: AtomicU64,
}

impl Default for MockExchangeAdapter {
    fn default() -> Self {
        Self {
            candles: Mutex::new(HashMap::new()),
            prices: Mutex::new(HashMap::new()),
            equity: dec!(10000),
            positions: Mutex::new(Vec::new()),
            orders: Mutex::new(HashMap::new()),
            placed_requests: Mutex::new(Vec::new()),
            kline_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            kline_delay_ms: 0,
            next_id: AtomicU64::new(1),
        }
    }
}

impl MockExchangeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_candles(&self, symbol: &str, interval: Interval, candles: Vec<Candle>) {
        self.candles
            .lock()
            .await
            .insert((symbol.to_string(), interval), candles);
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().await.insert(symbol.to_string(), price);
    }

    pub async fn set_position(&self, position: PositionUpdateData) {
        self.positions.lock().await.push(position);
    }

    pub async fn placed(&self) -> Vec<OrderRequest> {
        self.placed_requests.lock().await.clone()
    }
}

#[allow(dead_code)]
pub fn mock_candle(open: f64, high: f64, low: f64, close: f64, vol: f64) -> Candle {
    use rust_decimal::prelude::FromPrimitive;
    Candle {
        symbol: "TEST".to_string(),
        open_time: 0,
        open: Decimal::from_f64(open).unwrap(),
        high: Decimal::from_f64(high).unwrap(),
        low: Decimal::from_f64(low).unwrap(),
        close: Decimal::from_f64(close).unwrap(),
        volume: Decimal::from_f64(vol).unwrap(),
    }
}

/// A flat window of identical candles with the given bar range.
#[allow(dead_code)]
pub fn flat_window(len: usize, price: f64, half_range: f64) -> Vec<Candle> {
    (0..len)
        .map(|_| mock_candle(price, price + half_range, price - half_range, price, 1000.0))
        .collect()
}

#[async_trait]
impl ExchangeAdapter for MockExchangeAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Bybit
    }

    async fn get_last_price(&self, symbol: &str, _market_type: MarketType) -> anyhow::Result<Decimal> {
        self.prices
            .lock()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no mock price for {}", symbol))
    }

    async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
        _market_type: MarketType,
    ) -> anyhow::Result<Vec<Candle>> {
        self.kline_calls.fetch_add(1, Ordering::SeqCst);
        if self.kline_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.kline_delay_ms)).await;
        }
        let candles = self
            .candles
            .lock()
            .await
            .get(&(symbol.to_string(), interval))
            .cloned()
            .unwrap_or_default();
        let start = candles.len().saturating_sub(limit);
        Ok(candles[start..].to_vec())
    }

    async fn get_wallet_equity(&self) -> anyhow::Result<Decimal> {
        Ok(self.equity)
    }

    async fn place_order(&self, request: &OrderRequest) -> anyhow::Result<Order> {
        self.placed_requests.lock().await.push(request.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let order = Order {
            order_id: id.clone(),
            client_order_id: format!("mock-{}", id),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            executed_qty: request.quantity,
            price: request.price,
            status: OrderStatus::Filled,
            exchange: Exchange::Bybit,
            strategy_name: request.strategy_name.clone(),
            created_at: 0,
        };
        self.orders.lock().await.insert(id, order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> anyhow::Result<Order> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| anyhow::anyhow!("unknown order {}", order_id))?;
        if order.status != OrderStatus::Filled {
            order.status = OrderStatus::Canceled;
        }
        Ok(order.clone())
    }

    async fn get_order(&self, _symbol: &str, order_id: &str) -> anyhow::Result<Order> {
        self.orders
            .lock()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown order {}", order_id))
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> anyhow::Result<Vec<Order>> {
        Ok(self
            .orders
            .lock()
            .await
            .values()
            .filter(|o| !o.status.is_terminal())
            .filter(|o| symbol.map(|s| o.symbol == s).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn get_positions(&self) -> anyhow::Result<Vec<PositionUpdateData>> {
        Ok(self.positions.lock().await.clone())
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32, _isolated: bool) -> anyhow::Result<()> {
        Ok(())
    }

    async fn instrument_scales(&self, _symbol: &str) -> anyhow::Result<InstrumentScales> {
        Ok(InstrumentScales {
            qty_step: dec!(0.001),
            price_tick: dec!(0.01),
        })
    }
}
