//! Sniper strategy tuning parameters from environment variables.

use crate::domain::market::Interval;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct SniperEnvConfig {
    /// Interval the evaluator runs on.
    pub primary_interval: Interval,

    // S/R extraction
    pub sr_lookback: usize,
    pub sr_group_tolerance: f64,
    /// Tolerance for "price near level" confluence checks.
    pub sr_proximity_tolerance: f64,

    // Structural events
    pub wick_body_ratio_min: f64,
    /// Minimum candle range as a fraction of price for a valid rejection.
    pub rejection_min_range_pct: f64,

    // Trend / MA confluence
    pub short_ma_period: usize,
    pub medium_ma_period: usize,
    pub long_ma_period: usize,

    // Oscillators & volume
    pub rsi_period: usize,
    pub volume_lookback: usize,
    pub volume_spike_multiplier: f64,
    pub fib_proximity_tolerance: f64,

    // Scoring thresholds
    pub ai_trigger_score: f64,
    pub tier1_threshold: f64,
    pub tier2_threshold: f64,
    pub tier3_threshold: f64,

    // Stops & targets
    pub atr_period: usize,
    pub atr_stop_multiplier: f64,
    pub trailing_atr_multiplier: f64,
    /// Fallback stop distance and the fixed sizing assumption (fraction).
    pub stop_loss_percent_max: f64,
    pub first_profit_target_rr: f64,
    /// Fraction of the position closed at the first profit target.
    pub pt1_close_fraction: f64,
}

impl Default for SniperEnvConfig {
    fn default() -> Self {
        Self {
            primary_interval: Interval::OneHour,
            sr_lookback: 50,
            sr_group_tolerance: 0.01,
            sr_proximity_tolerance: 0.005,
            wick_body_ratio_min: 1.5,
            rejection_min_range_pct: 0.003,
            short_ma_period: 20,
            medium_ma_period: 50,
            long_ma_period: 200,
            rsi_period: 14,
            volume_lookback: 20,
            volume_spike_multiplier: 2.0,
            fib_proximity_tolerance: 0.005,
            ai_trigger_score: 3.0,
            tier1_threshold: 4.5,
            tier2_threshold: 3.5,
            tier3_threshold: 2.5,
            atr_period: 14,
            atr_stop_multiplier: 1.5,
            trailing_atr_multiplier: 1.5,
            stop_loss_percent_max: 0.01,
            first_profit_target_rr: 2.0,
            pt1_close_fraction: 0.5,
        }
    }
}

impl SniperEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            primary_interval: match env::var("SNIPER_PRIMARY_INTERVAL") {
                Ok(v) => Interval::from_str(&v).context("Invalid SNIPER_PRIMARY_INTERVAL")?,
                Err(_) => defaults.primary_interval,
            },
            sr_lookback: parse_or("SNIPER_SR_LOOKBACK", defaults.sr_lookback)?,
            sr_group_tolerance: parse_or("SNIPER_SR_GROUP_TOLERANCE", defaults.sr_group_tolerance)?,
            sr_proximity_tolerance: parse_or(
                "SNIPER_SR_PROXIMITY_TOLERANCE",
                defaults.sr_proximity_tolerance,
            )?,
            wick_body_ratio_min: parse_or("SNIPER_WICK_BODY_RATIO", defaults.wick_body_ratio_min)?,
            rejection_min_range_pct: parse_or(
                "SNIPER_REJECTION_MIN_RANGE_PCT",
                defaults.rejection_min_range_pct,
            )?,
            short_ma_period: parse_or("SNIPER_SHORT_MA", defaults.short_ma_period)?,
            medium_ma_period: parse_or("SNIPER_MEDIUM_MA", defaults.medium_ma_period)?,
            long_ma_period: parse_or("SNIPER_LONG_MA", defaults.long_ma_period)?,
            rsi_period: parse_or("SNIPER_RSI_PERIOD", defaults.rsi_period)?,
            volume_lookback: parse_or("SNIPER_VOLUME_LOOKBACK", defaults.volume_lookback)?,
            volume_spike_multiplier: parse_or(
                "SNIPER_VOLUME_SPIKE_MULTIPLIER",
                defaults.volume_spike_multiplier,
            )?,
            fib_proximity_tolerance: parse_or(
                "SNIPER_FIB_PROXIMITY_TOLERANCE",
                defaults.fib_proximity_tolerance,
            )?,
            ai_trigger_score: parse_or("SNIPER_AI_TRIGGER_SCORE", defaults.ai_trigger_score)?,
            tier1_threshold: parse_or("SNIPER_TIER1_THRESHOLD", defaults.tier1_threshold)?,
            tier2_threshold: parse_or("SNIPER_TIER2_THRESHOLD", defaults.tier2_threshold)?,
            tier3_threshold: parse_or("SNIPER_TIER3_THRESHOLD", defaults.tier3_threshold)?,
            atr_period: parse_or("SNIPER_ATR_PERIOD", defaults.atr_period)?,
            atr_stop_multiplier: parse_or("SNIPER_ATR_STOP_MULTIPLIER", defaults.atr_stop_multiplier)?,
            trailing_atr_multiplier: parse_or(
                "SNIPER_TRAILING_ATR_MULTIPLIER",
                defaults.trailing_atr_multiplier,
            )?,
            stop_loss_percent_max: parse_or(
                "SNIPER_STOP_LOSS_PERCENT_MAX",
                defaults.stop_loss_percent_max,
            )?,
            first_profit_target_rr: parse_or(
                "SNIPER_FIRST_PROFIT_TARGET_RR",
                defaults.first_profit_target_rr,
            )?,
            pt1_close_fraction: parse_or("SNIPER_PT1_CLOSE_FRACTION", defaults.pt1_close_fraction)?,
        })
    }

    /// Minimum candle window the evaluator demands before doing any work.
    pub fn min_window(&self) -> usize {
        (self.long_ma_period + 10).max(110)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(v) => v.parse::<T>().with_context(|| format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_window_honors_long_ma() {
        let mut cfg = SniperEnvConfig::default();
        assert_eq!(cfg.min_window(), 210);
        cfg.long_ma_period = 50;
        assert_eq!(cfg.min_window(), 110);
    }
}
