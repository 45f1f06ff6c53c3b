use crate::domain::market::{Candle, Interval};
use crate::domain::signal::SignalPerformance;
use crate::domain::trading::types::{Exchange, MarketType, Order, OrderRequest};
use crate::domain::trading::PositionUpdateData;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Quantity step and price tick for one instrument, used for rounding
/// before submission.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentScales {
    pub qty_step: Decimal,
    pub price_tick: Decimal,
}

/// Capability interface over a concrete venue: normalized market data,
/// authenticated order flow, and position snapshots.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn exchange(&self) -> Exchange;

    /// Latest traded price for a symbol.
    async fn get_last_price(&self, symbol: &str, market_type: MarketType) -> Result<Decimal>;

    /// Most recent `limit` candles, oldest first.
    async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
        market_type: MarketType,
    ) -> Result<Vec<Candle>>;

    /// Total account equity in the quote currency.
    async fn get_wallet_equity(&self) -> Result<Decimal>;

    async fn place_order(&self, request: &OrderRequest) -> Result<Order>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<Order>;

    /// Current state of one order, reconciled from the venue.
    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<Order>;

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>>;

    /// Authoritative open-position snapshot.
    async fn get_positions(&self) -> Result<Vec<PositionUpdateData>>;

    /// Configure leverage and isolated margin before an aggressive entry.
    async fn set_leverage(&self, symbol: &str, leverage: u32, isolated: bool) -> Result<()>;

    async fn instrument_scales(&self, symbol: &str) -> Result<InstrumentScales>;
}

/// Persisted order log, insertion-ordered.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn save(&self, order: &Order) -> Result<()>;
    async fn history(&self, symbol: Option<&str>) -> Result<Vec<Order>>;
}

/// Append-only signal outcome log.
#[async_trait]
pub trait SignalPerformanceRepository: Send + Sync {
    async fn record(&self, performance: &SignalPerformance) -> Result<()>;
    async fn all(&self) -> Result<Vec<SignalPerformance>>;
    async fn for_symbol(&self, symbol: &str) -> Result<Vec<SignalPerformance>>;
}
