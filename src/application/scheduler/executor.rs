//! Per-symbol evaluation and execution: the path a scheduler tick takes
//! from "look at this symbol" to a managed position or a placed entry.

use crate::application::market_data::MarketDataCache;
use crate::application::orders::OrderManager;
use crate::application::positions::PositionCache;
use crate::application::risk::RiskManager;
use crate::application::strategies::StrategyRegistry;
use crate::domain::errors::SignalError;
use crate::domain::ports::ExchangeAdapter;
use crate::domain::trading::types::{
    Exchange, MarketType, OrderRequest, OrderSide, OrderType,
};
use anyhow::Result;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct TradeExecutor {
    registry: Arc<StrategyRegistry>,
    adapters: HashMap<Exchange, Arc<dyn ExchangeAdapter>>,
    market_data: Arc<MarketDataCache>,
    position_cache: Arc<PositionCache>,
    order_manager: Arc<OrderManager>,
    risk_manager: Arc<RiskManager>,
}

impl TradeExecutor {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        adapters: HashMap<Exchange, Arc<dyn ExchangeAdapter>>,
        market_data: Arc<MarketDataCache>,
        position_cache: Arc<PositionCache>,
        order_manager: Arc<OrderManager>,
        risk_manager: Arc<RiskManager>,
    ) -> Self {
        Self {
            registry,
            adapters,
            market_data,
            position_cache,
            order_manager,
            risk_manager,
        }
    }

    /// Evaluate one symbol under one strategy and act on the outcome:
    /// manage the open position if there is one, otherwise look for an
    /// entry on either side and place it when risk allows.
    pub async fn evaluate_and_execute(
        &self,
        symbol: &str,
        exchange: Exchange,
        strategy_id: &str,
    ) -> Result<()> {
        let strategy = self.registry.get(strategy_id).ok_or_else(|| {
            SignalError::UnknownStrategy {
                id: strategy_id.to_string(),
            }
        })?;
        let interval = strategy.interval();

        if self.position_cache.get(symbol).await.is_some() {
            let exited = strategy.evaluate_exit(symbol, exchange, interval).await?;
            if exited {
                info!("Executor [{}]: position fully exited", symbol);
            }
            return Ok(());
        }

        let mut entry = None;
        for candidate in [OrderSide::Buy, OrderSide::Sell] {
            let tier = strategy
                .evaluate_entry(symbol, exchange, interval, candidate)
                .await?;
            if tier.is_signal() {
                entry = Some((tier, candidate));
                break;
            }
        }
        let Some((signal, side)) = entry else {
            return Ok(());
        };

        let entry_price = self
            .market_data
            .last_price(symbol, exchange, MarketType::Linear)
            .await?;
        let equity = self.equity(exchange).await?;

        let quantity = strategy
            .calculate_position_size(symbol, equity, entry_price)
            .await?;
        if quantity <= Decimal::ZERO {
            return Ok(());
        }

        let leverage = strategy.entry_leverage(symbol).await;
        let allowed = self
            .risk_manager
            .validate_trade(symbol, quantity, entry_price, leverage, exchange, side, equity)
            .await?;
        if !allowed {
            // Vetoes are expected; skip quietly this tick.
            return Ok(());
        }

        let stop_loss = match strategy
            .initial_stop_loss(symbol, exchange, interval, side, entry_price)
            .await
        {
            Ok(sl) => sl,
            Err(e) => {
                warn!(
                    "Executor [{}]: strategy stop failed ({:#}), using percent fallback",
                    symbol, e
                );
                self.risk_manager.calculate_stop_loss(entry_price, side)
            }
        };

        info!(
            "Executor [{}]: {} {} qty {} @ ~{} SL {} lev {}x ({})",
            symbol, signal, side, quantity, entry_price, stop_loss, leverage, strategy_id
        );

        let request = OrderRequest {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_loss: Some(stop_loss),
            leverage,
            market_type: MarketType::Linear,
            strategy_name: strategy_id.to_string(),
        };
        self.order_manager.place(&request, exchange).await?;

        // Record the strategy stop on the freshly cached position. The
        // cache refresh ran inside place(); if the venue is slow to report
        // the position, the next tick will still see the attached SL.
        if let Err(e) = self
            .position_cache
            .update_strategy_info(symbol, Some(stop_loss), None, None)
            .await
        {
            warn!(
                "Executor [{}]: position not yet visible for stop annotation: {:#}",
                symbol, e
            );
        }
        Ok(())
    }

    async fn equity(&self, exchange: Exchange) -> Result<Decimal> {
        match self.adapters.get(&exchange) {
            Some(adapter) => adapter.get_wallet_equity().await,
            None => anyhow::bail!("No adapter registered for {}", exchange),
        }
    }
}
