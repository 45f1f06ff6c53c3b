//! Moving-average and oscillator helpers over close-price series.
//!
//! Thin pure-function wrappers around the `ta` crate indicators: callers
//! hand in a slice of closes (oldest first) and get the latest value back.

use crate::domain::errors::SignalError;
use crate::domain::market::Candle;
use rust_decimal::prelude::ToPrimitive;
use ta::indicators::{ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage};
use ta::Next;

/// Latest simple moving average over `period` closes. None when the series
/// is shorter than the period.
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let mut ind = SimpleMovingAverage::new(period).ok()?;
    let mut last = 0.0;
    for &c in closes {
        last = ind.next(c);
    }
    Some(last)
}

/// Latest exponential moving average over `period` closes.
pub fn ema(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let mut ind = ExponentialMovingAverage::new(period).ok()?;
    let mut last = 0.0;
    for &c in closes {
        last = ind.next(c);
    }
    Some(last)
}

/// Latest Wilder-smoothed RSI. None when fewer than `period + 1` closes.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let mut ind = RelativeStrengthIndex::new(period).ok()?;
    let mut last = 50.0;
    for &c in closes {
        last = ind.next(c);
    }
    Some(last)
}

/// Wilder-smoothed Average True Range.
///
/// TR = max(high - low, |high - prev_close|, |low - prev_close|); the first
/// `period` TR values seed the average, the rest are smoothed with
/// `(atr * (period - 1) + tr) / period`. Requires exactly `period + 1`
/// candles or more; fewer is an error the caller surfaces as an invariant
/// violation.
pub fn atr(candles: &[Candle], period: usize) -> Result<f64, SignalError> {
    if period == 0 || candles.len() < period + 1 {
        return Err(SignalError::AtrWindowTooShort {
            period,
            need: period + 1,
            have: candles.len(),
        });
    }

    let mut tr_values = Vec::with_capacity(candles.len() - 1);
    for pair in candles.windows(2) {
        let prev_close = pair[0].close_f64();
        let high = pair[1].high_f64();
        let low = pair[1].low_f64();
        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        tr_values.push(tr);
    }

    let period_f = period as f64;
    let mut value: f64 = tr_values[..period].iter().sum::<f64>() / period_f;
    for &tr in &tr_values[period..] {
        value = (value * (period_f - 1.0) + tr) / period_f;
    }
    Ok(value)
}

/// Extract the close series from a candle window as f64, oldest first.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close_f64()).collect()
}

/// Extract the volume series from a candle window as f64, oldest first.
pub fn volumes(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .map(|c| c.volume.to_f64().unwrap_or(0.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            symbol: "TEST".to_string(),
            open_time: 0,
            open: Decimal::from_f64(open).unwrap(),
            high: Decimal::from_f64(high).unwrap(),
            low: Decimal::from_f64(low).unwrap(),
            close: Decimal::from_f64(close).unwrap(),
            volume: Decimal::from_f64(100.0).unwrap(),
        }
    }

    #[test]
    fn test_sma_basic() {
        let series = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&series, 5), Some(3.0));
        // Rolling window: last 3 of [3, 4, 5]
        assert_eq!(sma(&series, 3), Some(4.0));
        assert_eq!(sma(&series, 6), None);
    }

    #[test]
    fn test_rsi_bounds() {
        // Monotonic rise pushes RSI toward 100.
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let v = rsi(&rising, 14).unwrap();
        assert!(v > 70.0, "rising series should be overbought, got {v}");

        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let v = rsi(&falling, 14).unwrap();
        assert!(v < 30.0, "falling series should be oversold, got {v}");
    }

    #[test]
    fn test_atr_needs_period_plus_one() {
        let window: Vec<Candle> = (0..15)
            .map(|i| candle(100.0 + i as f64, 102.0 + i as f64, 99.0 + i as f64, 101.0 + i as f64))
            .collect();
        // 15 candles, period 14: exactly period + 1.
        assert!(atr(&window, 14).is_ok());
        // One fewer is an error.
        assert!(atr(&window[..14], 14).is_err());
    }

    #[test]
    fn test_atr_constant_range_converges() {
        let window: Vec<Candle> = (0..40)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.01;
                candle(base, base + 5.0, base - 5.0, base)
            })
            .collect();
        let v = atr(&window, 14).unwrap();
        assert!((v - 10.0).abs() < 0.5, "expected ~10, got {v}");
    }

    #[test]
    fn test_atr_accounts_for_gaps() {
        let window = vec![
            candle(100.0, 105.0, 95.0, 95.0),
            // Gap up: |115 - 95| = 20 dominates the 7-point bar range.
            candle(110.0, 115.0, 108.0, 112.0),
            candle(112.0, 118.0, 110.0, 115.0),
            candle(115.0, 120.0, 113.0, 118.0),
        ];
        let v = atr(&window, 3).unwrap();
        assert!(v > 7.0, "ATR should include the gap, got {v}");
    }
}
