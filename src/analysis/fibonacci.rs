//! Fibonacci retracement levels over a swing.

use crate::domain::trading::types::OrderSide;

/// The retracement ratios the confluence scorer cares about.
pub const RETRACEMENT_RATIOS: [f64; 2] = [0.618, 0.786];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FibLevel {
    pub ratio: f64,
    pub price: f64,
}

/// Retracement prices for a swing between `swing_low` and `swing_high`.
///
/// For a BUY the swing runs low -> high and each ratio is measured from the
/// high downwards; for a SELL it is mirrored. A degenerate swing
/// (high == low, or inverted) yields no levels.
pub fn retracement_levels(swing_high: f64, swing_low: f64, side: OrderSide) -> Vec<FibLevel> {
    let range = swing_high - swing_low;
    if range <= 0.0 {
        return Vec::new();
    }
    RETRACEMENT_RATIOS
        .iter()
        .map(|&ratio| {
            let price = match side {
                OrderSide::Buy => swing_high - range * ratio,
                OrderSide::Sell => swing_low + range * ratio,
            };
            FibLevel { ratio, price }
        })
        .collect()
}

/// Whether `price` sits within `tolerance` (relative) of any retracement
/// level of the swing.
pub fn near_retracement(
    price: f64,
    swing_high: f64,
    swing_low: f64,
    side: OrderSide,
    tolerance: f64,
) -> bool {
    retracement_levels(swing_high, swing_low, side)
        .iter()
        .any(|level| level.price > 0.0 && ((price - level.price) / level.price).abs() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_retracements_measured_from_high() {
        let levels = retracement_levels(200.0, 100.0, OrderSide::Buy);
        assert_eq!(levels.len(), 2);
        // 0.618 from the high: 200 - 61.8
        assert!((levels[0].price - 138.2).abs() < 1e-9);
        assert!((levels[1].price - 121.4).abs() < 1e-9);
    }

    #[test]
    fn test_sell_retracements_mirrored() {
        let levels = retracement_levels(200.0, 100.0, OrderSide::Sell);
        assert!((levels[0].price - 161.8).abs() < 1e-9);
        assert!((levels[1].price - 178.6).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_swing_is_empty() {
        assert!(retracement_levels(100.0, 100.0, OrderSide::Buy).is_empty());
        assert!(retracement_levels(90.0, 100.0, OrderSide::Buy).is_empty());
    }

    #[test]
    fn test_near_retracement_tolerance() {
        // 0.618 of the 100..200 swing sits at 138.2.
        assert!(near_retracement(138.5, 200.0, 100.0, OrderSide::Buy, 0.005));
        assert!(!near_retracement(145.0, 200.0, 100.0, OrderSide::Buy, 0.005));
        // Degenerate swing scores false rather than erroring.
        assert!(!near_retracement(100.0, 100.0, 100.0, OrderSide::Buy, 0.005));
    }
}
