use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while validating or executing orders.
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("Invalid order request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Order {order_id} not found for {symbol}")]
    OrderNotFound { symbol: String, order_id: String },

    #[error("Position not found: {symbol}")]
    PositionNotFound { symbol: String },

    #[error("Venue rejected order for {symbol}: {reason}")]
    VenueRejection { symbol: String, reason: String },

    #[error("Insufficient equity: need {need}, available {available}")]
    InsufficientEquity { need: Decimal, available: Decimal },
}

/// Errors raised by exchange adapters (REST and WebSocket).
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Request to {venue} failed: {reason}")]
    RequestFailed { venue: String, reason: String },

    #[error("Malformed response from {venue}: {excerpt}")]
    MalformedResponse { venue: String, excerpt: String },

    #[error("Invalid interval {interval} for {venue} (code {code})")]
    InvalidInterval {
        venue: String,
        interval: String,
        code: i64,
    },

    #[error("WebSocket authentication failed for {venue}: {reason}")]
    AuthFailed { venue: String, reason: String },
}

/// Errors raised during signal evaluation.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Insufficient candle history for {symbol}: have {have}, need {need}")]
    InsufficientHistory {
        symbol: String,
        have: usize,
        need: usize,
    },

    #[error("ATR requires {need} candles for period {period}, got {have}")]
    AtrWindowTooShort {
        period: usize,
        need: usize,
        have: usize,
    },

    #[error("Unknown strategy id: {id}")]
    UnknownStrategy { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let e = SignalError::InsufficientHistory {
            symbol: "BTCUSDT".to_string(),
            have: 90,
            need: 110,
        };
        assert!(e.to_string().contains("BTCUSDT"));
        assert!(e.to_string().contains("110"));
    }
}
