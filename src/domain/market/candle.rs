use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// A single normalized candlestick. Adapters transpose every venue format
/// into this shape; it is immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    /// Bar open time in epoch milliseconds.
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Checks the OHLC ordering invariant: high >= max(open, close) and
    /// low <= min(open, close), with non-negative volume.
    pub fn is_well_formed(&self) -> bool {
        let body_high = self.open.max(self.close);
        let body_low = self.open.min(self.close);
        self.high >= body_high && self.low <= body_low && self.volume >= Decimal::ZERO
    }

    /// Total bar range (high - low).
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// Absolute body size |close - open|.
    pub fn body(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    /// Upper wick length.
    pub fn upper_wick(&self) -> Decimal {
        self.high - self.open.max(self.close)
    }

    /// Lower wick length.
    pub fn lower_wick(&self) -> Decimal {
        self.open.min(self.close) - self.low
    }

    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(0.0)
    }

    pub fn high_f64(&self) -> f64 {
        self.high.to_f64().unwrap_or(0.0)
    }

    pub fn low_f64(&self) -> f64 {
        self.low.to_f64().unwrap_or(0.0)
    }

    pub fn volume_f64(&self) -> f64 {
        self.volume.to_f64().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle {
            symbol: "TEST".to_string(),
            open_time: 0,
            open,
            high,
            low,
            close,
            volume: dec!(100),
        }
    }

    #[test]
    fn test_well_formed_candle() {
        let c = candle(dec!(100), dec!(105), dec!(98), dec!(103));
        assert!(c.is_well_formed());
        assert_eq!(c.range(), dec!(7));
        assert_eq!(c.body(), dec!(3));
        assert_eq!(c.upper_wick(), dec!(2));
        assert_eq!(c.lower_wick(), dec!(2));
    }

    #[test]
    fn test_malformed_candle_detected() {
        // High below the body
        let c = candle(dec!(100), dec!(101), dec!(98), dec!(103));
        assert!(!c.is_well_formed());
    }
}
