//! Fibonacci retracement strategy: entries in the deep retracement zone
//! of the window swing, confirmed by a rejection wick.

use crate::analysis::{fibonacci, indicators};
use crate::application::market_data::MarketDataCache;
use crate::application::risk::RiskManager;
use crate::domain::market::{Candle, Interval};
use crate::domain::signal::{SignalKind, SignalTier};
use crate::domain::trading::types::{Exchange, MarketType, OrderSide};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::sync::Arc;

const WINDOW: usize = 120;
const ZONE_TOLERANCE: f64 = 0.005;
const WICK_BODY_MIN: f64 = 1.0;

pub struct FibonacciStrategy {
    market_data: Arc<MarketDataCache>,
    risk_manager: Arc<RiskManager>,
}

impl FibonacciStrategy {
    pub const ID: &'static str = "fibonacci";

    pub fn new(market_data: Arc<MarketDataCache>, risk_manager: Arc<RiskManager>) -> Self {
        Self {
            market_data,
            risk_manager,
        }
    }

    fn rejection_wick_confirms(candle: &Candle, side: OrderSide) -> bool {
        let body = candle.body().to_f64().unwrap_or(0.0);
        if body <= 0.0 {
            return false;
        }
        let wick = match side {
            OrderSide::Buy => candle.lower_wick().to_f64().unwrap_or(0.0),
            OrderSide::Sell => candle.upper_wick().to_f64().unwrap_or(0.0),
        };
        wick / body >= WICK_BODY_MIN
    }
}

#[async_trait]
impl super::Strategy for FibonacciStrategy {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Fibonacci"
    }

    fn interval(&self) -> Interval {
        Interval::OneHour
    }

    async fn evaluate_entry(
        &self,
        symbol: &str,
        exchange: Exchange,
        interval: Interval,
        side: OrderSide,
    ) -> Result<SignalTier> {
        let candles = self
            .market_data
            .candles(symbol, interval, WINDOW, exchange, MarketType::Linear)
            .await?;
        if candles.len() < WINDOW / 2 {
            return Ok(SignalTier::NoSignal);
        }

        let swing_high = candles.iter().map(Candle::high_f64).fold(f64::MIN, f64::max);
        let swing_low = candles.iter().map(Candle::low_f64).fold(f64::MAX, f64::min);
        let closes = indicators::closes(&candles);
        let Some(&price) = closes.last() else {
            return Ok(SignalTier::NoSignal);
        };

        if !fibonacci::near_retracement(price, swing_high, swing_low, side, ZONE_TOLERANCE) {
            return Ok(SignalTier::NoSignal);
        }

        let confirmed = candles
            .last()
            .map(|c| Self::rejection_wick_confirms(c, side))
            .unwrap_or(false);
        let tier = if confirmed { 2 } else { 3 };
        Ok(SignalTier::graded(tier, SignalKind::Confluence, side))
    }

    async fn evaluate_exit(
        &self,
        _symbol: &str,
        _exchange: Exchange,
        _interval: Interval,
    ) -> Result<bool> {
        // Position protection is entirely stop-driven for this strategy.
        Ok(false)
    }

    async fn calculate_position_size(
        &self,
        _symbol: &str,
        equity: Decimal,
        entry_price: Decimal,
    ) -> Result<Decimal> {
        if entry_price <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        let risk = Decimal::from_f64(0.004).unwrap_or(Decimal::ZERO);
        Ok(equity * risk / entry_price)
    }

    async fn initial_stop_loss(
        &self,
        symbol: &str,
        exchange: Exchange,
        interval: Interval,
        side: OrderSide,
        entry_price: Decimal,
    ) -> Result<Decimal> {
        // Below/above the swing extreme beats a fixed percentage here when
        // ATR is available.
        let atr = self
            .risk_manager
            .calculate_atr(symbol, exchange, interval, 14)
            .await
            .ok();
        Ok(crate::application::risk::atr_or_percent_stop(
            entry_price,
            side,
            atr,
            1.5,
            self.risk_manager.stop_loss_percent_max(),
        ))
    }
}
