//! Configurable moving-average crossover strategy with a volume filter.

use crate::analysis::{indicators, volume};
use crate::application::market_data::MarketDataCache;
use crate::application::risk::RiskManager;
use crate::domain::market::Interval;
use crate::domain::signal::{SignalKind, SignalTier};
use crate::domain::trading::types::{Exchange, MarketType, OrderSide};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct MaCrossoverStrategy {
    market_data: Arc<MarketDataCache>,
    risk_manager: Arc<RiskManager>,
    fast_period: usize,
    slow_period: usize,
    volume_lookback: usize,
    volume_multiplier: f64,
}

impl MaCrossoverStrategy {
    pub const ID: &'static str = "ma-crossover";

    pub fn new(market_data: Arc<MarketDataCache>, risk_manager: Arc<RiskManager>) -> Self {
        Self {
            market_data,
            risk_manager,
            fast_period: 9,
            slow_period: 21,
            volume_lookback: 20,
            volume_multiplier: 1.3,
        }
    }
}

#[async_trait]
impl super::Strategy for MaCrossoverStrategy {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "MA Crossover"
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
        let window = self.slow_period + self.volume_lookback + 2;
        let candles = self
            .market_data
            .candles(symbol, interval, window, exchange, MarketType::Linear)
            .await?;
        if candles.len() < window {
            return Ok(SignalTier::NoSignal);
        }

        let closes = indicators::closes(&candles);
        let volumes = indicators::volumes(&candles);

        // Cross on the latest bar: previous fast/slow on the other side.
        let fast_now = indicators::ema(&closes, self.fast_period);
        let slow_now = indicators::ema(&closes, self.slow_period);
        let prev = &closes[..closes.len() - 1];
        let fast_prev = indicators::ema(prev, self.fast_period);
        let slow_prev = indicators::ema(prev, self.slow_period);

        let (Some(fast_now), Some(slow_now), Some(fast_prev), Some(slow_prev)) =
            (fast_now, slow_now, fast_prev, slow_prev)
        else {
            return Ok(SignalTier::NoSignal);
        };

        let crossed = match side {
            OrderSide::Buy => fast_prev <= slow_prev && fast_now > slow_now,
            OrderSide::Sell => fast_prev >= slow_prev && fast_now < slow_now,
        };
        if !crossed {
            return Ok(SignalTier::NoSignal);
        }

        let confirmed = volume::is_volume_spike(
            &volumes,
            self.volume_lookback,
            self.volume_multiplier,
        );
        let tier = if confirmed { 2 } else { 3 };
        Ok(SignalTier::graded(tier, SignalKind::Confluence, side))
    }

    async fn evaluate_exit(
        &self,
        symbol: &str,
        exchange: Exchange,
        interval: Interval,
    ) -> Result<bool> {
        // Exits ride on the opposite crossover; stop management is left to
        // the protective stop submitted with the entry.
        let candles = self
            .market_data
            .candles(
                symbol,
                interval,
                self.slow_period + 2,
                exchange,
                MarketType::Linear,
            )
            .await?;
        let closes = indicators::closes(&candles);
        let (Some(fast), Some(slow)) = (
            indicators::ema(&closes, self.fast_period),
            indicators::ema(&closes, self.slow_period),
        ) else {
            return Ok(false);
        };
        Ok(fast < slow)
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
        let risk = Decimal::from_f64(0.005).unwrap_or(Decimal::ZERO);
        Ok(equity * risk / entry_price)
    }

    async fn initial_stop_loss(
        &self,
        _symbol: &str,
        _exchange: Exchange,
        _interval: Interval,
        side: OrderSide,
        entry_price: Decimal,
    ) -> Result<Decimal> {
        Ok(self.risk_manager.calculate_stop_loss(entry_price, side))
    }
}
