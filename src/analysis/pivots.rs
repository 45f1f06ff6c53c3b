//! Swing-pivot support/resistance extraction.
//!
//! A pivot high is a bar whose high exceeds every high within `lookback`
//! bars on each side; pivot lows mirror that. Nearby pivots of the same
//! kind are grouped within a relative tolerance, and the group size becomes
//! the level's strength.

use crate::domain::market::Candle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SrKind {
    Support,
    Resistance,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SrLevel {
    pub price: f64,
    pub kind: SrKind,
    /// Number of grouped pivots backing this level; always >= 1.
    pub strength: u32,
}

/// Extract grouped support/resistance levels from a candle window.
///
/// Needs at least `2 * lookback + 1` candles; shorter windows yield an
/// empty list. `group_tolerance` is relative (0.01 = 1%).
pub fn find_sr_levels(candles: &[Candle], lookback: usize, group_tolerance: f64) -> Vec<SrLevel> {
    if lookback == 0 || candles.len() < 2 * lookback + 1 {
        return Vec::new();
    }

    let mut resistance_pivots = Vec::new();
    let mut support_pivots = Vec::new();

    for i in lookback..candles.len() - lookback {
        let high = candles[i].high_f64();
        let low = candles[i].low_f64();

        let is_pivot_high = (1..=lookback).all(|off| {
            candles[i - off].high_f64() < high && candles[i + off].high_f64() < high
        });
        if is_pivot_high {
            resistance_pivots.push(high);
        }

        let is_pivot_low = (1..=lookback)
            .all(|off| candles[i - off].low_f64() > low && candles[i + off].low_f64() > low);
        if is_pivot_low {
            support_pivots.push(low);
        }
    }

    let mut levels = group_pivots(&resistance_pivots, SrKind::Resistance, group_tolerance);
    levels.extend(group_pivots(&support_pivots, SrKind::Support, group_tolerance));
    levels
}

/// Collapse raw pivot prices into levels: pivots within `tolerance` of a
/// group's running mean merge into it and raise its strength.
fn group_pivots(pivots: &[f64], kind: SrKind, tolerance: f64) -> Vec<SrLevel> {
    let mut sorted: Vec<f64> = pivots.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut levels: Vec<SrLevel> = Vec::new();
    for price in sorted {
        let merged = match levels.last_mut() {
            Some(level)
                if level.price > 0.0
                    && ((price - level.price) / level.price).abs() <= tolerance =>
            {
                // Running mean keeps the level centred as pivots accumulate.
                let n = level.strength as f64;
                level.price = (level.price * n + price) / (n + 1.0);
                level.strength += 1;
                true
            }
            _ => false,
        };
        if !merged {
            levels.push(SrLevel {
                price,
                kind,
                strength: 1,
            });
        }
    }
    levels
}

/// The level (if any) whose price is within `tolerance` of `price`.
pub fn nearest_level<'a>(
    levels: &'a [SrLevel],
    price: f64,
    tolerance: f64,
) -> Option<&'a SrLevel> {
    levels
        .iter()
        .filter(|l| l.price > 0.0 && ((price - l.price) / l.price).abs() <= tolerance)
        .min_by(|a, b| {
            let da = (price - a.price).abs();
            let db = (price - b.price).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
}
