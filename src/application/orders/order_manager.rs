//! Order manager: validates, rounds, submits, cancels, and reconciles
//! orders across the registered venues. The only component that talks to
//! the authenticated order endpoints.

use crate::domain::errors::TradingError;
use crate::domain::ports::{ExchangeAdapter, InstrumentScales, OrderRepository};
use crate::domain::trading::types::{
    Exchange, MarketType, Order, OrderRequest, OrderSide, OrderStatus, OrderType,
};
use crate::application::positions::PositionCache;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct OrderManager {
    adapters: HashMap<Exchange, Arc<dyn ExchangeAdapter>>,
    position_cache: Arc<PositionCache>,
    order_repository: Arc<dyn OrderRepository>,
    /// Local order log, insertion-ordered, for history and idempotent cancel.
    known_orders: Mutex<Vec<Order>>,
}

impl OrderManager {
    pub fn new(
        adapters: HashMap<Exchange, Arc<dyn ExchangeAdapter>>,
        position_cache: Arc<PositionCache>,
        order_repository: Arc<dyn OrderRepository>,
    ) -> Self {
        Self {
            adapters,
            position_cache,
            order_repository,
            known_orders: Mutex::new(Vec::new()),
        }
    }

    fn adapter(&self, exchange: Exchange) -> Result<&Arc<dyn ExchangeAdapter>> {
        self.adapters
            .get(&exchange)
            .with_context(|| format!("No adapter registered for {}", exchange))
    }

    /// Submit an order. Quantity and price are floored to the venue's step
    /// and tick; leverage/isolated margin is configured first on aggressive
    /// linear entries (a failure there is logged and the trade proceeds).
    /// On acknowledgement the position cache is refreshed and the order is
    /// persisted.
    pub async fn place(&self, request: &OrderRequest, exchange: Exchange) -> Result<Order> {
        request.validate()?;
        let adapter = self.adapter(exchange)?;

        let scales = adapter
            .instrument_scales(&request.symbol)
            .await
            .with_context(|| format!("Failed to fetch scales for {}", request.symbol))?;

        let mut rounded = request.clone();
        rounded.quantity = round_down_to_step(request.quantity, scales.qty_step);
        if rounded.quantity <= Decimal::ZERO {
            return Err(TradingError::InvalidRequest {
                reason: format!(
                    "quantity {} rounds to zero at step {}",
                    request.quantity, scales.qty_step
                ),
            }
            .into());
        }
        if let Some(price) = request.price {
            rounded.price = Some(round_down_to_step(price, scales.price_tick));
        }
        if let Some(sl) = request.stop_loss {
            rounded.stop_loss = Some(round_down_to_step(sl, scales.price_tick));
        }

        if rounded.market_type == MarketType::Linear && rounded.leverage > 1 {
            if let Err(e) = adapter
                .set_leverage(&rounded.symbol, rounded.leverage, true)
                .await
            {
                // Left as a warning: the venue may already hold the wanted
                // leverage, and the entry itself will still be validated.
                warn!(
                    "OrderManager: set-leverage {}x/isolated failed for {} on {}: {:#}",
                    rounded.leverage, rounded.symbol, exchange, e
                );
            }
        }

        let order = adapter.place_order(&rounded).await.map_err(|e| {
            warn!(
                "OrderManager: {} order for {} rejected by {}: {:#}",
                rounded.side, rounded.symbol, exchange, e
            );
            e
        })?;

        info!(
            "OrderManager: placed {} {} {} qty {} on {} -> id {} ({})",
            order.order_type,
            order.side,
            order.symbol,
            order.quantity,
            exchange,
            order.order_id,
            order.status
        );

        if let Err(e) = self.order_repository.save(&order).await {
            warn!("OrderManager: failed to persist order {}: {:#}", order.order_id, e);
        }
        self.known_orders.lock().await.push(order.clone());

        self.refresh_positions(exchange).await;
        Ok(order)
    }

    /// Cancel an order. Canceling an already-filled order is a no-op that
    /// returns the filled order unchanged.
    pub async fn cancel(&self, symbol: &str, order_id: &str, exchange: Exchange) -> Result<Order> {
        let current = self.get_order(symbol, order_id, exchange).await?;
        if current.status == OrderStatus::Filled {
            info!(
                "OrderManager: cancel of filled order {} is a no-op",
                order_id
            );
            return Ok(current);
        }

        let canceled = self
            .adapter(exchange)?
            .cancel_order(symbol, order_id)
            .await
            .with_context(|| format!("Failed to cancel order {} on {}", order_id, exchange))?;
        self.record_status(&canceled).await;
        Ok(canceled)
    }

    /// Reconciled state of one order.
    pub async fn get_order(
        &self,
        symbol: &str,
        order_id: &str,
        exchange: Exchange,
    ) -> Result<Order> {
        let order = self
            .adapter(exchange)?
            .get_order(symbol, order_id)
            .await
            .with_context(|| format!("Failed to reconcile order {} on {}", order_id, exchange))?;
        self.record_status(&order).await;
        Ok(order)
    }

    pub async fn open_orders(
        &self,
        symbol: Option<&str>,
        exchange: Exchange,
    ) -> Result<Vec<Order>> {
        self.adapter(exchange)?.get_open_orders(symbol).await
    }

    /// Insertion-ordered order history, optionally filtered by symbol.
    pub async fn history(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        self.order_repository.history(symbol).await
    }

    /// Close the remaining size of an open position with a market order.
    pub async fn close_position(
        &self,
        symbol: &str,
        reason: &str,
        exchange: Exchange,
    ) -> Result<Order> {
        let position = self
            .position_cache
            .get(symbol)
            .await
            .ok_or_else(|| TradingError::PositionNotFound {
                symbol: symbol.to_string(),
            })?;

        info!(
            "OrderManager: closing {} {} (size {}) on {}: {}",
            position.side, symbol, position.size, exchange, reason
        );

        let request = OrderRequest {
            symbol: symbol.to_string(),
            side: position.side.opposite(),
            order_type: OrderType::Market,
            quantity: position.size,
            price: None,
            stop_loss: None,
            leverage: position.leverage,
            market_type: MarketType::Linear,
            strategy_name: format!("close:{}", reason),
        };
        self.place(&request, exchange).await
    }

    /// Submit a partial market close for an open position.
    pub async fn partial_close(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reason: &str,
        exchange: Exchange,
    ) -> Result<Order> {
        let request = OrderRequest {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_loss: None,
            leverage: 1,
            market_type: MarketType::Linear,
            strategy_name: format!("partial:{}", reason),
        };
        self.place(&request, exchange).await
    }

    /// Pull a fresh position snapshot from the venue into the cache.
    pub async fn refresh_positions(&self, exchange: Exchange) {
        match self.adapter(exchange) {
            Ok(adapter) => match adapter.get_positions().await {
                Ok(snapshot) => self.position_cache.apply_venue_snapshot(snapshot).await,
                Err(e) => warn!(
                    "OrderManager: position refresh from {} failed: {:#}",
                    exchange, e
                ),
            },
            Err(e) => warn!("OrderManager: {:#}", e),
        }
    }

    async fn record_status(&self, order: &Order) {
        let mut known = self.known_orders.lock().await;
        match known
            .iter()
            .position(|o| o.order_id == order.order_id && o.symbol == order.symbol)
        {
            Some(idx) => {
                // FILLED is terminal; a late CANCELED reconciliation must
                // not regress it.
                let existing = &mut known[idx];
                if existing.status != OrderStatus::Filled {
                    existing.status = order.status;
                    existing.executed_qty = order.executed_qty;
                }
            }
            None => known.push(order.clone()),
        }
    }
}

/// Floor a value to an exchange step (quantity step or price tick).
pub fn round_down_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).floor() * step
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_down_to_step() {
        assert_eq!(round_down_to_step(dec!(1.2345), dec!(0.01)), dec!(1.23));
        assert_eq!(round_down_to_step(dec!(0.999), dec!(0.1)), dec!(0.9));
        assert_eq!(round_down_to_step(dec!(5), dec!(1)), dec!(5));
        // Never rounds up.
        assert_eq!(round_down_to_step(dec!(0.09), dec!(0.1)), dec!(0.0));
        // Degenerate step leaves the value untouched.
        assert_eq!(round_down_to_step(dec!(1.23), Decimal::ZERO), dec!(1.23));
    }
}
