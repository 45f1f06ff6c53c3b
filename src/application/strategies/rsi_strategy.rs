//! RSI extremes strategy: buy oversold, sell overbought, with a trend
//! guard against catching falling knives.

use crate::analysis::indicators;
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
use tracing::debug;

const RSI_PERIOD: usize = 14;
const OVERSOLD: f64 = 30.0;
const OVERBOUGHT: f64 = 70.0;
const TREND_PERIOD: usize = 100;

pub struct RsiStrategy {
    market_data: Arc<MarketDataCache>,
    risk_manager: Arc<RiskManager>,
}

impl RsiStrategy {
    pub const ID: &'static str = "rsi";

    pub fn new(market_data: Arc<MarketDataCache>, risk_manager: Arc<RiskManager>) -> Self {
        Self {
            market_data,
            risk_manager,
        }
    }
}

#[async_trait]
impl super::Strategy for RsiStrategy {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "RSI"
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
        let window = TREND_PERIOD + 10;
        let candles = self
            .market_data
            .candles(symbol, interval, window, exchange, MarketType::Linear)
            .await?;
        let closes = indicators::closes(&candles);

        let Some(rsi) = indicators::rsi(&closes, RSI_PERIOD) else {
            return Ok(SignalTier::NoSignal);
        };
        let trend = indicators::sma(&closes, TREND_PERIOD);
        let Some(&price) = closes.last() else {
            return Ok(SignalTier::NoSignal);
        };

        let triggered = match side {
            OrderSide::Buy => rsi <= OVERSOLD,
            OrderSide::Sell => rsi >= OVERBOUGHT,
        };
        if !triggered {
            return Ok(SignalTier::NoSignal);
        }

        // Counter-trend extremes grade lower than with-trend ones.
        let with_trend = match (trend, side) {
            (Some(t), OrderSide::Buy) => price > t,
            (Some(t), OrderSide::Sell) => price < t,
            (None, _) => false,
        };
        debug!(
            "RSI [{}]: {} at RSI {:.1} ({})",
            symbol,
            side,
            rsi,
            if with_trend { "with trend" } else { "counter-trend" }
        );
        let tier = if with_trend { 2 } else { 3 };
        Ok(SignalTier::graded(tier, SignalKind::Confluence, side))
    }

    async fn evaluate_exit(
        &self,
        symbol: &str,
        exchange: Exchange,
        interval: Interval,
    ) -> Result<bool> {
        // Mean-reversion exit: RSI back through the midline.
        let candles = self
            .market_data
            .candles(symbol, interval, RSI_PERIOD * 3, exchange, MarketType::Linear)
            .await?;
        let closes = indicators::closes(&candles);
        Ok(indicators::rsi(&closes, RSI_PERIOD)
            .map(|rsi| (45.0..=55.0).contains(&rsi))
            .unwrap_or(false))
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
        _symbol: &str,
        _exchange: Exchange,
        _interval: Interval,
        side: OrderSide,
        entry_price: Decimal,
    ) -> Result<Decimal> {
        Ok(self.risk_manager.calculate_stop_loss(entry_price, side))
    }
}
