//! Default strategy: conservative SMA-crossover entries on the 4h
//! interval, with the secure-profit stop lock managing open positions.

use crate::analysis::indicators;
use crate::application::market_data::MarketDataCache;
use crate::application::positions::{
    ManagementStyle, PositionCache, PositionStateMachine, TickOutcome,
};
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

const FAST_PERIOD: usize = 20;
const SLOW_PERIOD: usize = 50;
/// Conservative fixed risk fraction; the default path never uses leverage.
const RISK_FRACTION: f64 = 0.005;

pub struct DefaultStrategy {
    market_data: Arc<MarketDataCache>,
    position_cache: Arc<PositionCache>,
    risk_manager: Arc<RiskManager>,
    state_machine: Arc<PositionStateMachine>,
}

impl DefaultStrategy {
    pub const ID: &'static str = "default";

    pub fn new(
        market_data: Arc<MarketDataCache>,
        position_cache: Arc<PositionCache>,
        risk_manager: Arc<RiskManager>,
        state_machine: Arc<PositionStateMachine>,
    ) -> Self {
        Self {
            market_data,
            position_cache,
            risk_manager,
            state_machine,
        }
    }
}

#[async_trait]
impl super::Strategy for DefaultStrategy {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Default"
    }

    fn interval(&self) -> Interval {
        Interval::FourHour
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
            .candles(symbol, interval, SLOW_PERIOD + 10, exchange, MarketType::Linear)
            .await?;
        let closes = indicators::closes(&candles);

        let (Some(fast), Some(slow)) = (
            indicators::sma(&closes, FAST_PERIOD),
            indicators::sma(&closes, SLOW_PERIOD),
        ) else {
            return Ok(SignalTier::NoSignal);
        };
        let Some(&price) = closes.last() else {
            return Ok(SignalTier::NoSignal);
        };

        let aligned = match side {
            OrderSide::Buy => fast > slow && price > fast,
            OrderSide::Sell => fast < slow && price < fast,
        };
        if !aligned {
            return Ok(SignalTier::NoSignal);
        }

        debug!(
            "Default [{}]: {} crossover aligned (fast {:.4}, slow {:.4})",
            symbol, side, fast, slow
        );
        Ok(SignalTier::graded(3, SignalKind::Confluence, side))
    }

    async fn evaluate_exit(
        &self,
        symbol: &str,
        exchange: Exchange,
        interval: Interval,
    ) -> Result<bool> {
        let Some(position) = self.position_cache.get(symbol).await else {
            return Ok(false);
        };
        let current_price = self
            .market_data
            .last_price(symbol, exchange, MarketType::Linear)
            .await?;

        let outcome = self
            .state_machine
            .run_tick(
                &position,
                current_price,
                interval,
                exchange,
                ManagementStyle::SecureProfit,
            )
            .await?;
        Ok(matches!(outcome, TickOutcome::FullExit { .. }))
    }

    async fn calculate_position_size(
        &self,
        symbol: &str,
        equity: Decimal,
        entry_price: Decimal,
    ) -> Result<Decimal> {
        if entry_price <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        let risk = Decimal::from_f64(RISK_FRACTION).unwrap_or(Decimal::ZERO);
        let base = equity * risk / entry_price;

        // Kelly-style modulation once the symbol has enough history.
        let stats = self.risk_manager.win_stats(symbol).await?;
        let multiplier = match stats.win_rate() {
            Some(rate) if stats.total() >= 30 && rate < 0.4 => Decimal::new(5, 1),
            Some(rate) if stats.total() >= 30 && rate > 0.6 => Decimal::new(125, 2),
            _ => Decimal::ONE,
        };
        if multiplier != Decimal::ONE {
            debug!(
                "Default [{}]: win rate {:?} over {} trades, sizing x{}",
                symbol,
                stats.win_rate(),
                stats.total(),
                multiplier
            );
        }
        Ok(base * multiplier)
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
