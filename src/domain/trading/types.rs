use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, OrderSide::Buy)
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" | "LONG" => Ok(OrderSide::Buy),
            "SELL" | "SHORT" => Ok(OrderSide::Sell),
            _ => anyhow::bail!("Unknown order side: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Spot or linear-perpetual market on the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketType {
    Spot,
    Linear,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::Spot => write!(f, "spot"),
            MarketType::Linear => write!(f, "linear"),
        }
    }
}

/// Connected venues. The scheduler addresses them by this enum; the string
/// form matches what operators put into the exchange map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    Bybit,
    Mexc,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Bybit => write!(f, "BYBIT"),
            Exchange::Mexc => write!(f, "MEXC"),
        }
    }
}

impl FromStr for Exchange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BYBIT" => Ok(Exchange::Bybit),
            "MEXC" => Ok(Exchange::Mexc),
            _ => anyhow::bail!("Unknown exchange: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    /// Filled is terminal; everything else may still transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
        };
        write!(f, "{}", s)
    }
}

/// A candidate order produced by a strategy, consumed by the order manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub leverage: u32,
    pub market_type: MarketType,
    pub strategy_name: String,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, quantity: Decimal, strategy: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_loss: None,
            leverage: 1,
            market_type: MarketType::Linear,
            strategy_name: strategy.to_string(),
        }
    }

    pub fn with_stop_loss(mut self, stop_loss: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = leverage;
        self
    }

    /// Structural validation before anything touches a venue.
    pub fn validate(&self) -> Result<(), crate::domain::errors::TradingError> {
        use crate::domain::errors::TradingError;
        if self.symbol.trim().is_empty() {
            return Err(TradingError::InvalidRequest {
                reason: "symbol is empty".to_string(),
            });
        }
        if self.quantity <= Decimal::ZERO {
            return Err(TradingError::InvalidRequest {
                reason: format!("quantity must be positive, got {}", self.quantity),
            });
        }
        if let Some(p) = self.price {
            if p <= Decimal::ZERO {
                return Err(TradingError::InvalidRequest {
                    reason: format!("price must be positive, got {}", p),
                });
            }
        }
        if let Some(sl) = self.stop_loss {
            if sl <= Decimal::ZERO {
                return Err(TradingError::InvalidRequest {
                    reason: format!("stop loss must be positive, got {}", sl),
                });
            }
        }
        if self.leverage == 0 {
            return Err(TradingError::InvalidRequest {
                reason: "leverage must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

/// A venue-acknowledged order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub executed_qty: Decimal,
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    pub exchange: Exchange,
    pub strategy_name: String,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_request_validation() {
        let ok = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(0.5), "sniper");
        assert!(ok.validate().is_ok());

        let mut bad_qty = ok.clone();
        bad_qty.quantity = Decimal::ZERO;
        assert!(bad_qty.validate().is_err());

        let mut bad_symbol = ok.clone();
        bad_symbol.symbol = "  ".to_string();
        assert!(bad_symbol.validate().is_err());

        let mut bad_sl = ok;
        bad_sl.stop_loss = Some(dec!(-1));
        assert!(bad_sl.validate().is_err());
    }

    #[test]
    fn test_side_helpers() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!("LONG".parse::<OrderSide>().unwrap(), OrderSide::Buy);
        assert_eq!("sell".parse::<OrderSide>().unwrap(), OrderSide::Sell);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }
}
