use crate::domain::trading::types::{Exchange, OrderSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Live view of an open position. Size, side, entry, and leverage come from
/// the venue (WebSocket push or REST reconciliation); the strategy fields
/// are annotations written only through the position cache's
/// `update_strategy_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionUpdateData {
    pub symbol: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub leverage: u32,
    pub exchange: Exchange,
    /// Stop maintained by the owning strategy; not a venue order.
    pub strategy_stop_loss: Option<Decimal>,
    /// First partial profit target already taken.
    pub pt1_taken: bool,
    /// The slow strategy locked in a +30% stop.
    pub secure_profit_sl_applied: bool,
    pub updated_at: i64,
}

impl PositionUpdateData {
    pub fn new(
        symbol: &str,
        side: OrderSide,
        size: Decimal,
        entry_price: Decimal,
        leverage: u32,
        exchange: Exchange,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            size,
            entry_price,
            leverage,
            exchange,
            strategy_stop_loss: None,
            pt1_taken: false,
            secure_profit_sl_applied: false,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Unrealized P/L as a fraction of entry price (0.15 = +15%), signed in
    /// the position's favor.
    pub fn unrealized_pnl_pct(&self, current_price: Decimal) -> Decimal {
        if self.entry_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let raw = (current_price - self.entry_price) / self.entry_price;
        match self.side {
            OrderSide::Buy => raw,
            OrderSide::Sell => -raw,
        }
    }

    /// Initial risk per unit: |entry - strategy stop|. None until a strategy
    /// stop has been recorded.
    pub fn risk_per_unit(&self) -> Option<Decimal> {
        self.strategy_stop_loss
            .map(|sl| (self.entry_price - sl).abs())
    }

    /// Whether `candidate` is a strictly more favorable stop than the
    /// current one. With no stop recorded, any candidate is an improvement.
    pub fn improves_stop(&self, candidate: Decimal) -> bool {
        match self.strategy_stop_loss {
            None => true,
            Some(current) => match self.side {
                OrderSide::Buy => candidate > current,
                OrderSide::Sell => candidate < current,
            },
        }
    }
}
