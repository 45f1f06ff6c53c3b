//! Hedging decision loop: every cycle, open positions are checked against
//! loss, regime, AI-reversal, volatility, and correlation triggers; any
//! firing trigger opens an opposing hedge, throttled by a per-symbol
//! cooldown.

use crate::analysis::indicators;
use crate::application::ai::AiOracle;
use crate::application::market_data::MarketDataCache;
use crate::application::orders::OrderManager;
use crate::application::positions::PositionCache;
use crate::config::HedgeEnvConfig;
use crate::domain::market::Interval;
use crate::domain::trading::types::{
    Exchange, MarketType, OrderRequest, OrderSide, OrderType,
};
use crate::domain::trading::{HedgePosition, HedgeReason, HedgeType, PositionUpdateData};
use anyhow::Result;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const REGIME_FAST_MA: usize = 50;
const REGIME_SLOW_MA: usize = 200;

/// Correlated symbol clusters for the correlation-risk trigger.
const CORRELATION_CLUSTERS: &[&[&str]] = &[
    &["BTCUSDT", "ETHUSDT"],
    &["SOLUSDT", "AVAXUSDT", "ADAUSDT"],
    &["DOGEUSDT", "SHIBUSDT"],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Regime {
    Bullish,
    Bearish,
}

/// Inputs for one position's trigger evaluation, separated from I/O so the
/// decision table is testable.
#[derive(Debug, Clone, Copy)]
pub struct TriggerInputs {
    /// Unrealized P/L as a signed fraction of entry.
    pub unrealized_pnl_pct: f64,
    /// ATR as a fraction of current price.
    pub atr_pct: f64,
    /// Regime flipped against the position since the last check.
    pub regime_flipped_against: bool,
    /// AI verdict currently opposes the position side.
    pub ai_opposes: bool,
    /// Correlated-cluster notional share of total exposure.
    pub correlated_share: f64,
}

/// Which triggers fire for the given inputs and configuration.
pub fn evaluate_triggers(inputs: &TriggerInputs, config: &HedgeEnvConfig) -> Vec<HedgeReason> {
    let mut reasons = Vec::new();
    if inputs.unrealized_pnl_pct <= config.loss_trigger_pct {
        reasons.push(HedgeReason::HighUnrealizedLoss);
    }
    if inputs.regime_flipped_against {
        reasons.push(HedgeReason::MarketRegimeChange);
    }
    if inputs.ai_opposes {
        reasons.push(HedgeReason::AiSignalReversal);
    }
    if inputs.atr_pct > config.volatility_trigger_pct {
        reasons.push(HedgeReason::VolatilitySpike);
    }
    if inputs.correlated_share > config.correlation_exposure_limit {
        reasons.push(HedgeReason::CorrelationRisk);
    }
    reasons
}

pub struct HedgingService {
    config: HedgeEnvConfig,
    market_data: Arc<MarketDataCache>,
    position_cache: Arc<PositionCache>,
    order_manager: Arc<OrderManager>,
    ai_oracle: Arc<dyn AiOracle>,
    hedges: Mutex<Vec<HedgePosition>>,
    last_hedge_at: Mutex<HashMap<String, Instant>>,
    last_regime: Mutex<HashMap<String, Regime>>,
}

impl HedgingService {
    pub fn new(
        config: HedgeEnvConfig,
        market_data: Arc<MarketDataCache>,
        position_cache: Arc<PositionCache>,
        order_manager: Arc<OrderManager>,
        ai_oracle: Arc<dyn AiOracle>,
    ) -> Self {
        Self {
            config,
            market_data,
            position_cache,
            order_manager,
            ai_oracle,
            hedges: Mutex::new(Vec::new()),
            last_hedge_at: Mutex::new(HashMap::new()),
            last_regime: Mutex::new(HashMap::new()),
        }
    }

    /// One hedging cycle over every open position.
    pub async fn run_once(&self) -> Result<()> {
        self.expire_hedges().await;
        self.close_orphaned_hedges().await;

        let positions = self.position_cache.snapshot().await;
        if positions.is_empty() {
            return Ok(());
        }

        let total_notional: Decimal = positions.iter().map(|p| p.size * p.entry_price).sum();

        for position in &positions {
            if self.has_active_hedge(&position.symbol).await {
                continue;
            }
            if !self.cooldown_elapsed(&position.symbol).await {
                debug!(
                    "Hedging: {} inside cooldown window, skipping",
                    position.symbol
                );
                continue;
            }

            let inputs = match self.collect_inputs(position, total_notional).await {
                Ok(inputs) => inputs,
                Err(e) => {
                    warn!(
                        "Hedging: trigger inputs for {} unavailable: {:#}",
                        position.symbol, e
                    );
                    continue;
                }
            };

            let reasons = evaluate_triggers(&inputs, &self.config);
            if let Some(&reason) = reasons.first() {
                info!(
                    "Hedging: {} fired {:?} (pnl {:.1}%, atr {:.2}%)",
                    position.symbol,
                    reasons,
                    inputs.unrealized_pnl_pct * 100.0,
                    inputs.atr_pct * 100.0
                );
                if let Err(e) = self.open_hedge(position, reason).await {
                    warn!("Hedging: failed to open hedge for {}: {:#}", position.symbol, e);
                }
            }
        }
        Ok(())
    }

    async fn collect_inputs(
        &self,
        position: &PositionUpdateData,
        total_notional: Decimal,
    ) -> Result<TriggerInputs> {
        let symbol = position.symbol.as_str();
        let exchange = position.exchange;

        let price = self
            .market_data
            .last_price(symbol, exchange, MarketType::Linear)
            .await?;
        let pnl = position
            .unrealized_pnl_pct(price)
            .to_f64()
            .unwrap_or(0.0);

        let candles = self
            .market_data
            .candles(
                symbol,
                Interval::OneHour,
                REGIME_SLOW_MA + 10,
                exchange,
                MarketType::Linear,
            )
            .await?;
        let atr_pct = match indicators::atr(&candles, 14) {
            Ok(atr) => {
                let p = price.to_f64().unwrap_or(0.0);
                if p > 0.0 { atr / p } else { 0.0 }
            }
            Err(_) => 0.0,
        };

        let regime_flipped_against = self.regime_flip(symbol, position.side, &candles).await;

        // The reversal check reuses the verdict oracle; a failure just
        // means no AI trigger this cycle.
        let ai_opposes = match self
            .ai_oracle
            .analyze(symbol, Interval::OneHour, exchange, price)
            .await
        {
            Ok(verdict) => verdict.opposes(position.side),
            Err(e) => {
                debug!("Hedging: AI reversal check failed for {}: {:#}", symbol, e);
                false
            }
        };

        let correlated_share = correlated_share(
            symbol,
            position,
            &self.position_cache.snapshot().await,
            total_notional,
        );

        Ok(TriggerInputs {
            unrealized_pnl_pct: pnl,
            atr_pct,
            regime_flipped_against,
            ai_opposes,
            correlated_share,
        })
    }

    /// Detect a regime flip against the position since the previous cycle.
    async fn regime_flip(
        &self,
        symbol: &str,
        side: OrderSide,
        candles: &[crate::domain::market::Candle],
    ) -> bool {
        let closes = indicators::closes(candles);
        let (Some(fast), Some(slow)) = (
            indicators::sma(&closes, REGIME_FAST_MA),
            indicators::sma(&closes, REGIME_SLOW_MA),
        ) else {
            return false;
        };
        let regime = if fast > slow {
            Regime::Bullish
        } else {
            Regime::Bearish
        };

        let mut last = self.last_regime.lock().await;
        let previous = last.insert(symbol.to_string(), regime);

        let against = matches!(
            (regime, side),
            (Regime::Bearish, OrderSide::Buy) | (Regime::Bullish, OrderSide::Sell)
        );
        match previous {
            Some(prev) => prev != regime && against,
            None => false,
        }
    }

    async fn open_hedge(&self, position: &PositionUpdateData, reason: HedgeReason) -> Result<()> {
        // Correlation risk is offset in a cluster peer; everything else
        // mirrors the same symbol.
        let (hedge_symbol, hedge_type) = match (reason, cluster_peer(&position.symbol)) {
            (HedgeReason::CorrelationRisk, Some(peer)) => {
                (peer.to_string(), HedgeType::CorrelationHedge)
            }
            _ => (position.symbol.clone(), HedgeType::DirectOpposite),
        };

        let trigger_price = self
            .market_data
            .last_price(&position.symbol, position.exchange, MarketType::Linear)
            .await?;

        // Size the hedge leg to mirror the ratio of the primary notional in
        // the hedge instrument's own units.
        let quantity = if hedge_symbol == position.symbol {
            position.size * self.config.hedge_ratio
        } else {
            let hedge_price = self
                .market_data
                .last_price(&hedge_symbol, position.exchange, MarketType::Linear)
                .await?;
            if hedge_price <= Decimal::ZERO {
                anyhow::bail!("hedge instrument {} has no price", hedge_symbol);
            }
            position.size * trigger_price * self.config.hedge_ratio / hedge_price
        };

        let hedge_side = position.side.opposite();
        let request = OrderRequest {
            symbol: hedge_symbol.clone(),
            side: hedge_side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_loss: None,
            leverage: position.leverage,
            market_type: MarketType::Linear,
            strategy_name: format!("hedge:{}", reason),
        };
        self.order_manager.place(&request, position.exchange).await?;

        let hedge = HedgePosition {
            primary_symbol: position.symbol.clone(),
            hedge_symbol,
            hedge_side,
            ratio: self.config.hedge_ratio,
            quantity,
            reason,
            hedge_type,
            trigger_price,
            opened_at: chrono::Utc::now().timestamp_millis(),
            active: true,
        };
        info!(
            "Hedging: opened {} hedge {} {} x{} ({})",
            hedge.hedge_type_label(),
            hedge.hedge_side,
            hedge.hedge_symbol,
            hedge.quantity,
            reason
        );
        self.hedges.lock().await.push(hedge);
        self.last_hedge_at
            .lock()
            .await
            .insert(position.symbol.clone(), Instant::now());
        Ok(())
    }

    /// Explicitly close the active hedge for a primary symbol.
    pub async fn close_hedge(&self, primary_symbol: &str, reason: &str) -> Result<()> {
        let hedge = {
            let mut hedges = self.hedges.lock().await;
            let Some(hedge) = hedges
                .iter_mut()
                .find(|h| h.active && h.primary_symbol == primary_symbol)
            else {
                return Ok(());
            };
            hedge.active = false;
            hedge.clone()
        };

        info!(
            "Hedging: closing hedge on {} ({})",
            hedge.hedge_symbol, reason
        );
        let exchange = self
            .position_cache
            .get(primary_symbol)
            .await
            .map(|p| p.exchange)
            .unwrap_or(Exchange::Bybit);
        let request = OrderRequest {
            symbol: hedge.hedge_symbol.clone(),
            side: hedge.hedge_side.opposite(),
            order_type: OrderType::Market,
            quantity: hedge.quantity,
            price: None,
            stop_loss: None,
            leverage: 1,
            market_type: MarketType::Linear,
            strategy_name: format!("hedge-close:{}", reason),
        };
        self.order_manager.place(&request, exchange).await?;
        Ok(())
    }

    /// Hedges whose underlying position has disappeared get closed out.
    async fn close_orphaned_hedges(&self) {
        let orphans: Vec<String> = {
            let hedges = self.hedges.lock().await;
            let mut orphans = Vec::new();
            for hedge in hedges.iter().filter(|h| h.active) {
                if self.position_cache.get(&hedge.primary_symbol).await.is_none() {
                    orphans.push(hedge.primary_symbol.clone());
                }
            }
            orphans
        };
        for symbol in orphans {
            if let Err(e) = self.close_hedge(&symbol, "underlying-closed").await {
                warn!("Hedging: orphan close for {} failed: {:#}", symbol, e);
            }
        }
    }

    /// Time-based expiry, when configured.
    async fn expire_hedges(&self) {
        if self.config.expiry_secs == 0 {
            return;
        }
        let cutoff =
            chrono::Utc::now().timestamp_millis() - (self.config.expiry_secs as i64) * 1000;
        let expired: Vec<String> = self
            .hedges
            .lock()
            .await
            .iter()
            .filter(|h| h.active && h.opened_at < cutoff)
            .map(|h| h.primary_symbol.clone())
            .collect();
        for symbol in expired {
            if let Err(e) = self.close_hedge(&symbol, "expiry").await {
                warn!("Hedging: expiry close for {} failed: {:#}", symbol, e);
            }
        }
    }

    pub async fn has_active_hedge(&self, primary_symbol: &str) -> bool {
        self.hedges
            .lock()
            .await
            .iter()
            .any(|h| h.active && h.primary_symbol == primary_symbol)
    }

    pub async fn active_hedges(&self) -> Vec<HedgePosition> {
        self.hedges
            .lock()
            .await
            .iter()
            .filter(|h| h.active)
            .cloned()
            .collect()
    }

    async fn cooldown_elapsed(&self, symbol: &str) -> bool {
        let last = self.last_hedge_at.lock().await;
        match last.get(symbol) {
            Some(at) => at.elapsed() >= Duration::from_secs(self.config.cooldown_secs),
            None => true,
        }
    }
}

impl HedgePosition {
    fn hedge_type_label(&self) -> &'static str {
        match self.hedge_type {
            HedgeType::DirectOpposite => "DIRECT_OPPOSITE",
            HedgeType::CorrelationHedge => "CORRELATION_HEDGE",
        }
    }
}

/// Another member of `symbol`'s correlation cluster, if it has one.
fn cluster_peer(symbol: &str) -> Option<&'static str> {
    CORRELATION_CLUSTERS
        .iter()
        .find(|cluster| cluster.contains(&symbol))
        .and_then(|cluster| cluster.iter().find(|s| **s != symbol).copied())
}

/// Share of total open notional sitting in symbols correlated with
/// `symbol` (the position itself included).
fn correlated_share(
    symbol: &str,
    position: &PositionUpdateData,
    all_positions: &[PositionUpdateData],
    total_notional: Decimal,
) -> f64 {
    if total_notional <= Decimal::ZERO {
        return 0.0;
    }
    let Some(cluster) = CORRELATION_CLUSTERS
        .iter()
        .find(|cluster| cluster.contains(&symbol))
    else {
        return 0.0;
    };

    let cluster_positions: Vec<_> = all_positions
        .iter()
        .filter(|p| cluster.contains(&p.symbol.as_str()) && p.side == position.side)
        .collect();
    // Aggregate risk needs more than one leg; a lone position is just
    // directional exposure.
    if cluster_positions.len() < 2 {
        return 0.0;
    }

    let cluster_notional: Decimal = cluster_positions
        .iter()
        .map(|p| p.size * p.entry_price)
        .sum();

    (cluster_notional / total_notional).to_f64().unwrap_or(0.0)
}
