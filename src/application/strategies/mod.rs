//! Polymorphic trading strategies behind a common interface, addressed by
//! stable string ids through the registry.

mod default_strategy;
mod fibonacci_strategy;
mod ma_crossover;
mod news_sentiment;
mod rsi_strategy;
mod sniper;

pub use default_strategy::DefaultStrategy;
pub use fibonacci_strategy::FibonacciStrategy;
pub use ma_crossover::MaCrossoverStrategy;
pub use news_sentiment::NewsSentimentStrategy;
pub use rsi_strategy::RsiStrategy;
pub use sniper::SniperStrategy;

use crate::domain::market::Interval;
use crate::domain::signal::SignalTier;
use crate::domain::trading::types::{Exchange, OrderSide};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable registry id.
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    /// The interval this strategy evaluates on.
    fn interval(&self) -> Interval;

    /// Grade an entry opportunity for one side. `NoSignal` means stand
    /// aside.
    async fn evaluate_entry(
        &self,
        symbol: &str,
        exchange: Exchange,
        interval: Interval,
        side: OrderSide,
    ) -> Result<SignalTier>;

    /// Manage an open position for one tick. Returns true when the
    /// position was fully exited.
    async fn evaluate_exit(&self, symbol: &str, exchange: Exchange, interval: Interval)
        -> Result<bool>;

    /// Position size in base units for the most recent signal, before
    /// venue-step rounding.
    async fn calculate_position_size(
        &self,
        symbol: &str,
        equity: Decimal,
        entry_price: Decimal,
    ) -> Result<Decimal>;

    /// Initial protective stop for an entry at `entry_price`.
    async fn initial_stop_loss(
        &self,
        symbol: &str,
        exchange: Exchange,
        interval: Interval,
        side: OrderSide,
        entry_price: Decimal,
    ) -> Result<Decimal>;

    /// Leverage for the next entry; tier-driven for the sniper, 1x
    /// elsewhere.
    async fn entry_leverage(&self, _symbol: &str) -> u32 {
        1
    }
}

/// Registry mapping stable strategy ids to instances.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(strategy.id(), strategy);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.strategies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
