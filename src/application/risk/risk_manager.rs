//! Risk checks and stop/target arithmetic shared by every strategy.

use crate::analysis::indicators;
use crate::application::market_data::MarketDataCache;
use crate::application::positions::PositionCache;
use crate::config::RiskEnvConfig;
use crate::domain::market::Interval;
use crate::domain::ports::SignalPerformanceRepository;
use crate::domain::trading::types::{Exchange, MarketType, OrderSide};
use anyhow::Result;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Historical outcome statistics for one symbol, Kelly inputs for the
/// enhanced sizing path.
#[derive(Debug, Clone, Default)]
pub struct WinStats {
    pub wins: usize,
    pub losses: usize,
    pub breakevens: usize,
}

impl WinStats {
    pub fn total(&self) -> usize {
        self.wins + self.losses + self.breakevens
    }

    pub fn win_rate(&self) -> Option<f64> {
        let decided = self.wins + self.losses;
        if decided == 0 {
            return None;
        }
        Some(self.wins as f64 / decided as f64)
    }
}

pub struct RiskManager {
    config: RiskEnvConfig,
    market_data: Arc<MarketDataCache>,
    position_cache: Arc<PositionCache>,
    performance_repository: Arc<dyn SignalPerformanceRepository>,
    /// Stop distance assumed when no ATR stop is available, as a fraction.
    stop_loss_percent_max: f64,
}

impl RiskManager {
    pub fn new(
        config: RiskEnvConfig,
        market_data: Arc<MarketDataCache>,
        position_cache: Arc<PositionCache>,
        performance_repository: Arc<dyn SignalPerformanceRepository>,
        stop_loss_percent_max: f64,
    ) -> Self {
        Self {
            config,
            market_data,
            position_cache,
            performance_repository,
            stop_loss_percent_max,
        }
    }

    /// Gate a candidate trade against position-count, per-trade risk, and
    /// per-symbol exposure limits. A veto is an info-level skip, not an
    /// error.
    #[allow(clippy::too_many_arguments)]
    pub async fn validate_trade(
        &self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        leverage: u32,
        _exchange: Exchange,
        _side: OrderSide,
        equity: Decimal,
    ) -> Result<bool> {
        if equity <= Decimal::ZERO || quantity <= Decimal::ZERO || price <= Decimal::ZERO {
            return Ok(false);
        }

        let open = self.position_cache.open_count().await;
        let already_open = self.position_cache.get(symbol).await.is_some();
        if !already_open && open >= self.config.max_open_positions {
            info!(
                "RiskManager: {} vetoed, {} open positions at the {} cap",
                symbol, open, self.config.max_open_positions
            );
            return Ok(false);
        }

        let notional = quantity * price;
        // The sizing stop assumption bounds the worst-case loss estimate.
        let sl_pct = Decimal::from_f64(self.stop_loss_percent_max).unwrap_or(Decimal::ONE);
        let estimated_risk = notional * sl_pct;
        if estimated_risk > equity * self.config.max_risk_per_trade {
            info!(
                "RiskManager: {} vetoed, estimated risk {} exceeds {} of equity {}",
                symbol, estimated_risk, self.config.max_risk_per_trade, equity
            );
            return Ok(false);
        }

        // Exposure is capped on margin, not leveraged notional.
        let margin = notional / Decimal::from(leverage.max(1));
        if margin > equity * self.config.max_symbol_exposure {
            info!(
                "RiskManager: {} vetoed, margin {} exceeds symbol exposure cap",
                symbol, margin
            );
            return Ok(false);
        }

        Ok(true)
    }

    /// Wilder ATR from `period + 1` fresh candles. Fewer candles surface as
    /// an error (invariant violation at the call site).
    pub async fn calculate_atr(
        &self,
        symbol: &str,
        exchange: Exchange,
        interval: Interval,
        period: usize,
    ) -> Result<f64> {
        let candles = self
            .market_data
            .candles(symbol, interval, period + 1, exchange, MarketType::Linear)
            .await?;
        Ok(indicators::atr(&candles, period)?)
    }

    /// Percentage-based stop around an entry using the configured max stop
    /// distance.
    pub fn calculate_stop_loss(&self, entry: Decimal, side: OrderSide) -> Decimal {
        let pct = Decimal::from_f64(self.stop_loss_percent_max).unwrap_or(Decimal::ZERO);
        match side {
            OrderSide::Buy => entry * (Decimal::ONE - pct),
            OrderSide::Sell => entry * (Decimal::ONE + pct),
        }
    }

    /// Take-profit at `rr` times the stop distance from entry.
    pub fn calculate_take_profit(
        &self,
        entry: Decimal,
        stop_loss: Decimal,
        side: OrderSide,
        rr: f64,
    ) -> Decimal {
        let risk = (entry - stop_loss).abs();
        let rr = Decimal::from_f64(rr).unwrap_or(Decimal::ONE);
        match side {
            OrderSide::Buy => entry + risk * rr,
            OrderSide::Sell => entry - risk * rr,
        }
    }

    /// Append a closed signal's outcome to the performance log.
    pub async fn record_outcome(
        &self,
        symbol: &str,
        tier: &str,
        outcome: crate::domain::signal::SignalOutcome,
        technical_score: f64,
        ai_confirmed: bool,
    ) -> Result<()> {
        use crate::domain::signal::SignalPerformance;
        let record = SignalPerformance {
            signal_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            tier: tier.to_string(),
            outcome,
            technical_score,
            ai_confirmed,
            mtf_adjustment: 0.0,
            recorded_at: chrono::Utc::now().timestamp_millis(),
        };
        self.performance_repository.record(&record).await
    }

    /// Outcome statistics for one symbol from the performance log.
    pub async fn win_stats(&self, symbol: &str) -> Result<WinStats> {
        use crate::domain::signal::SignalOutcome;
        let records = self.performance_repository.for_symbol(symbol).await?;
        let mut stats = WinStats::default();
        for r in records {
            match r.outcome {
                SignalOutcome::Win => stats.wins += 1,
                SignalOutcome::Loss => stats.losses += 1,
                SignalOutcome::Breakeven => stats.breakevens += 1,
            }
        }
        Ok(stats)
    }

    pub fn stop_loss_percent_max(&self) -> f64 {
        self.stop_loss_percent_max
    }
}

/// ATR-preferred stop: `entry -/+ atr * multiplier` when ATR is available,
/// otherwise the percentage fallback.
pub fn atr_or_percent_stop(
    entry: Decimal,
    side: OrderSide,
    atr: Option<f64>,
    atr_multiplier: f64,
    fallback_pct: f64,
) -> Decimal {
    let distance = match atr {
        Some(atr) if atr > 0.0 => Decimal::from_f64(atr * atr_multiplier)
            .unwrap_or_else(|| entry * Decimal::from_f64(fallback_pct).unwrap_or(Decimal::ZERO)),
        _ => entry * Decimal::from_f64(fallback_pct).unwrap_or(Decimal::ZERO),
    };
    match side {
        OrderSide::Buy => entry - distance,
        OrderSide::Sell => entry + distance,
    }
}

/// Tiered position size: `equity * risk_fraction * leverage / entry`,
/// before venue-step rounding.
pub fn tiered_position_size(
    equity: Decimal,
    risk_fraction: Decimal,
    leverage: u32,
    entry_price: Decimal,
) -> Decimal {
    if entry_price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    equity * risk_fraction * Decimal::from(leverage) / entry_price
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tiered_position_size() {
        // equity 10_000, tier-1: 1.5% at 25x, entry 105
        let size = tiered_position_size(dec!(10000), dec!(0.015), 25, dec!(105));
        let expected = dec!(10000) * dec!(0.015) * dec!(25) / dec!(105);
        assert_eq!(size, expected);
        assert_eq!(
            tiered_position_size(dec!(10000), dec!(0.015), 25, Decimal::ZERO),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_atr_stop_preferred_over_percent() {
        let stop = atr_or_percent_stop(dec!(105), OrderSide::Buy, Some(2.0), 1.5, 0.01);
        assert_eq!(stop, dec!(102));

        let stop = atr_or_percent_stop(dec!(100), OrderSide::Sell, Some(2.0), 1.5, 0.01);
        assert_eq!(stop, dec!(103));
    }

    #[test]
    fn test_percent_fallback_when_atr_missing() {
        let stop = atr_or_percent_stop(dec!(100), OrderSide::Buy, None, 1.5, 0.01);
        assert_eq!(stop, dec!(99));
    }

    #[test]
    fn test_win_stats_rate() {
        let stats = WinStats {
            wins: 6,
            losses: 4,
            breakevens: 2,
        };
        assert_eq!(stats.total(), 12);
        assert_eq!(stats.win_rate(), Some(0.6));
        assert_eq!(WinStats::default().win_rate(), None);
    }
}
