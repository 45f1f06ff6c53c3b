//! Exit-path state machine for open positions.
//!
//! Each evaluation tick walks one position through, in order: the first
//! partial profit target, the trailing stop ratchet (sniper style) or the
//! secure-profit lock (default style), then the stop-loss check. At most
//! one stop mutation happens per tick, and stops only ever move in the
//! position's favor.

use crate::application::orders::OrderManager;
use crate::application::positions::PositionCache;
use crate::application::risk::RiskManager;
use crate::config::SniperEnvConfig;
use crate::domain::market::Interval;
use crate::domain::trading::types::{Exchange, OrderSide, OrderStatus};
use crate::domain::trading::PositionUpdateData;
use anyhow::Result;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Which strategy's management rules apply to the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementStyle {
    /// PT1 partial close + ATR trailing stop.
    Sniper,
    /// Secure-profit stop lock at +30% unrealized.
    SecureProfit,
}

/// What the tick did. A full exit supersedes any stop mutation made
/// earlier in the same tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    NoAction,
    Pt1Taken { new_stop: Decimal },
    StopRatcheted { new_stop: Decimal },
    SecureProfitLocked { new_stop: Decimal },
    FullExit { order_id: String },
}

pub struct PositionStateMachine {
    config: SniperEnvConfig,
    order_manager: Arc<OrderManager>,
    position_cache: Arc<PositionCache>,
    risk_manager: Arc<RiskManager>,
}

impl PositionStateMachine {
    pub fn new(
        config: SniperEnvConfig,
        order_manager: Arc<OrderManager>,
        position_cache: Arc<PositionCache>,
        risk_manager: Arc<RiskManager>,
    ) -> Self {
        Self {
            config,
            order_manager,
            position_cache,
            risk_manager,
        }
    }

    /// Run one management tick for a position at the given price. Reads,
    /// computes, submits, polls to a terminal status, then writes — all
    /// inside the calling evaluation task, so PT1 and full exit cannot
    /// race each other.
    pub async fn run_tick(
        &self,
        position: &PositionUpdateData,
        current_price: Decimal,
        interval: Interval,
        exchange: Exchange,
        style: ManagementStyle,
    ) -> Result<TickOutcome> {
        let symbol = position.symbol.as_str();
        let mut local_stop = position.strategy_stop_loss;
        let mut mutation: Option<TickOutcome> = None;

        if style == ManagementStyle::Sniper {
            if !position.pt1_taken {
                if let Some(outcome) = self
                    .try_take_pt1(position, current_price, interval, exchange)
                    .await?
                {
                    // The remaining half stays open; nothing else runs this
                    // tick.
                    return Ok(outcome);
                }
            } else if let Some(stop) = local_stop {
                if let Some(new_stop) = self
                    .trail_stop(position, current_price, stop, interval, exchange)
                    .await?
                {
                    local_stop = Some(new_stop);
                    mutation = Some(TickOutcome::StopRatcheted { new_stop });
                }
            }
        }

        if style == ManagementStyle::SecureProfit && !position.secure_profit_sl_applied {
            if let Some(new_stop) = self.try_secure_profit(position, current_price).await? {
                local_stop = Some(new_stop);
                mutation = Some(TickOutcome::SecureProfitLocked { new_stop });
            }
        }

        if let Some(stop) = local_stop {
            let hit = match position.side {
                OrderSide::Buy => current_price <= stop,
                OrderSide::Sell => current_price >= stop,
            };
            if hit {
                info!(
                    "StateMachine: {} stop {} hit at {}, exiting remaining {}",
                    symbol, stop, current_price, position.size
                );
                let order = self
                    .order_manager
                    .close_position(symbol, "stop-loss", exchange)
                    .await?;
                return Ok(TickOutcome::FullExit {
                    order_id: order.order_id,
                });
            }
        }

        Ok(mutation.unwrap_or(TickOutcome::NoAction))
    }

    /// First partial profit target: close half the position once price has
    /// travelled `first_profit_target_rr` times the initial risk.
    async fn try_take_pt1(
        &self,
        position: &PositionUpdateData,
        current_price: Decimal,
        interval: Interval,
        exchange: Exchange,
    ) -> Result<Option<TickOutcome>> {
        let symbol = position.symbol.as_str();
        let Some(risk) = position.risk_per_unit() else {
            return Ok(None);
        };
        if risk <= Decimal::ZERO {
            return Ok(None);
        }

        let rr =
            Decimal::from_f64(self.config.first_profit_target_rr).unwrap_or(Decimal::TWO);
        let target = match position.side {
            OrderSide::Buy => position.entry_price + risk * rr,
            OrderSide::Sell => position.entry_price - risk * rr,
        };
        let reached = match position.side {
            OrderSide::Buy => current_price >= target,
            OrderSide::Sell => current_price <= target,
        };
        if !reached {
            return Ok(None);
        }

        let close_qty = position.size
            * Decimal::from_f64(self.config.pt1_close_fraction).unwrap_or(Decimal::new(5, 1));
        info!(
            "StateMachine: {} reached PT1 at {} (target {}), closing {}",
            symbol, current_price, target, close_qty
        );

        let order = self
            .order_manager
            .partial_close(
                symbol,
                position.side.opposite(),
                close_qty,
                "pt1",
                exchange,
            )
            .await?;

        let status = self
            .poll_until_terminal(symbol, &order.order_id, exchange)
            .await;
        if status != OrderStatus::Filled {
            warn!(
                "StateMachine: PT1 order {} for {} ended {} — PT1 not recorded",
                order.order_id, symbol, status
            );
            return Ok(None);
        }

        // Move the stop off the current price, never past breakeven.
        let atr = self
            .risk_manager
            .calculate_atr(symbol, exchange, interval, self.config.atr_period)
            .await
            .ok();
        let raw = crate::application::risk::atr_or_percent_stop(
            current_price,
            position.side,
            atr,
            self.config.atr_stop_multiplier,
            self.config.stop_loss_percent_max,
        );
        let new_stop = match position.side {
            OrderSide::Buy => raw.max(position.entry_price),
            OrderSide::Sell => raw.min(position.entry_price),
        };

        self.position_cache
            .update_strategy_info(symbol, Some(new_stop), Some(true), None)
            .await?;
        info!(
            "StateMachine: {} PT1 filled, stop moved to {} (pt1_taken=true)",
            symbol, new_stop
        );
        Ok(Some(TickOutcome::Pt1Taken { new_stop }))
    }

    /// ATR trailing candidate; adopted only when it ratchets in the
    /// position's favor.
    async fn trail_stop(
        &self,
        position: &PositionUpdateData,
        current_price: Decimal,
        current_stop: Decimal,
        interval: Interval,
        exchange: Exchange,
    ) -> Result<Option<Decimal>> {
        let symbol = position.symbol.as_str();
        let atr = match self
            .risk_manager
            .calculate_atr(symbol, exchange, interval, self.config.atr_period)
            .await
        {
            Ok(atr) => atr,
            Err(e) => {
                warn!("StateMachine: {} trailing skipped, ATR failed: {:#}", symbol, e);
                return Ok(None);
            }
        };

        let distance = Decimal::from_f64(atr * self.config.trailing_atr_multiplier)
            .unwrap_or(Decimal::ZERO);
        if distance <= Decimal::ZERO {
            return Ok(None);
        }
        let candidate = match position.side {
            OrderSide::Buy => current_price - distance,
            OrderSide::Sell => current_price + distance,
        };

        let improves = match position.side {
            OrderSide::Buy => candidate > current_stop,
            OrderSide::Sell => candidate < current_stop,
        };
        if !improves {
            return Ok(None);
        }

        self.position_cache
            .update_strategy_info(symbol, Some(candidate), None, None)
            .await?;
        info!(
            "StateMachine: {} trailing stop ratcheted {} -> {}",
            symbol, current_stop, candidate
        );
        Ok(Some(candidate))
    }

    /// Secure-profit lock: once unrealized P/L reaches +30% of entry, pin
    /// the stop at entry +/- 30%, favorable-direction only.
    async fn try_secure_profit(
        &self,
        position: &PositionUpdateData,
        current_price: Decimal,
    ) -> Result<Option<Decimal>> {
        const PROFIT_LOCK_THRESHOLD: f64 = 0.30;
        let pnl = position.unrealized_pnl_pct(current_price);
        if pnl < Decimal::from_f64(PROFIT_LOCK_THRESHOLD).unwrap_or(Decimal::ONE) {
            return Ok(None);
        }

        let lock = Decimal::from_f64(1.0 + PROFIT_LOCK_THRESHOLD).unwrap_or(Decimal::ONE);
        let candidate = match position.side {
            OrderSide::Buy => position.entry_price * lock,
            OrderSide::Sell => position.entry_price * (Decimal::TWO - lock),
        };
        if !position.improves_stop(candidate) {
            return Ok(None);
        }

        self.position_cache
            .update_strategy_info(&position.symbol, Some(candidate), None, Some(true))
            .await?;
        info!(
            "StateMachine: {} secure-profit stop locked at {} (+{}% unrealized)",
            position.symbol,
            candidate,
            pnl * Decimal::ONE_HUNDRED
        );
        Ok(Some(candidate))
    }

    /// Poll an order up to five times at one-second intervals until it
    /// reaches a terminal status. Returns the last observed status.
    async fn poll_until_terminal(
        &self,
        symbol: &str,
        order_id: &str,
        exchange: Exchange,
    ) -> OrderStatus {
        const MAX_POLLS: usize = 5;
        let mut last = OrderStatus::New;
        for attempt in 0..MAX_POLLS {
            match self.order_manager.get_order(symbol, order_id, exchange).await {
                Ok(order) => {
                    last = order.status;
                    if last.is_terminal() {
                        return last;
                    }
                }
                Err(e) => warn!(
                    "StateMachine: poll {} of order {} failed: {:#}",
                    attempt + 1,
                    order_id,
                    e
                ),
            }
            if attempt + 1 < MAX_POLLS {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        last
    }
}
