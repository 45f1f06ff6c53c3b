//! Authoritative in-memory view of open positions.
//!
//! Two writers feed the cache: the private WebSocket stream (authoritative
//! for size, side, entry, leverage, exchange) and the strategies, which may
//! only touch their annotations through `update_strategy_info`. All writes
//! serialize through a single async mutex; readers get cloned snapshots.

use crate::domain::errors::TradingError;
use crate::domain::trading::PositionUpdateData;
use anyhow::Result;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Default)]
pub struct PositionCache {
    inner: Mutex<HashMap<String, PositionUpdateData>>,
}

impl PositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single venue push for one symbol. Size zero removes the
    /// position; otherwise venue fields are overwritten and strategy
    /// annotations survive.
    pub async fn apply_venue_update(&self, update: PositionUpdateData) {
        let mut map = self.inner.lock().await;
        if update.size <= Decimal::ZERO {
            if map.remove(&update.symbol).is_some() {
                info!("PositionCache: {} closed (venue push)", update.symbol);
            }
            return;
        }

        use std::collections::hash_map::Entry;
        match map.entry(update.symbol.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                existing.side = update.side;
                existing.size = update.size;
                existing.entry_price = update.entry_price;
                existing.leverage = update.leverage;
                existing.exchange = update.exchange;
                existing.updated_at = update.updated_at;
            }
            Entry::Vacant(vacant) => {
                info!(
                    "PositionCache: tracking new {} position {} size {}",
                    update.side, update.symbol, update.size
                );
                vacant.insert(update);
            }
        }
    }

    /// Replace the venue view with a full snapshot (REST reconciliation or
    /// a fresh post-reconnect push). Symbols absent from the snapshot are
    /// dropped; annotations of surviving symbols are preserved.
    pub async fn apply_venue_snapshot(&self, snapshot: Vec<PositionUpdateData>) {
        let mut map = self.inner.lock().await;
        let mut next: HashMap<String, PositionUpdateData> = HashMap::new();

        for update in snapshot {
            if update.size <= Decimal::ZERO {
                continue;
            }
            let merged = match map.remove(&update.symbol) {
                Some(mut existing) => {
                    existing.side = update.side;
                    existing.size = update.size;
                    existing.entry_price = update.entry_price;
                    existing.leverage = update.leverage;
                    existing.exchange = update.exchange;
                    existing.updated_at = update.updated_at;
                    existing
                }
                None => update,
            };
            next.insert(merged.symbol.clone(), merged);
        }

        for gone in map.keys() {
            debug!("PositionCache: {} absent from snapshot, dropping", gone);
        }
        *map = next;
    }

    /// Strategy-side annotation write: stop, PT1 flag, secure-profit flag.
    /// Never touches size or entry. Stop updates that would move against
    /// the position are refused to keep stops monotone-favorable.
    pub async fn update_strategy_info(
        &self,
        symbol: &str,
        stop_loss: Option<Decimal>,
        pt1_taken: Option<bool>,
        secure_profit_sl_applied: Option<bool>,
    ) -> Result<()> {
        let mut map = self.inner.lock().await;
        let position = map
            .get_mut(symbol)
            .ok_or_else(|| TradingError::PositionNotFound {
                symbol: symbol.to_string(),
            })?;

        if let Some(candidate) = stop_loss {
            if position.improves_stop(candidate) {
                position.strategy_stop_loss = Some(candidate);
            } else {
                warn!(
                    "PositionCache: refused unfavorable stop {} for {} (current {:?})",
                    candidate, symbol, position.strategy_stop_loss
                );
            }
        }
        if let Some(flag) = pt1_taken {
            // The flag can only be set, never cleared, within one lifetime.
            position.pt1_taken = position.pt1_taken || flag;
        }
        if let Some(flag) = secure_profit_sl_applied {
            position.secure_profit_sl_applied = position.secure_profit_sl_applied || flag;
        }
        position.updated_at = chrono::Utc::now().timestamp_millis();
        Ok(())
    }

    pub async fn get(&self, symbol: &str) -> Option<PositionUpdateData> {
        self.inner.lock().await.get(symbol).cloned()
    }

    pub async fn snapshot(&self) -> Vec<PositionUpdateData> {
        self.inner.lock().await.values().cloned().collect()
    }

    pub async fn open_count(&self) -> usize {
        self.inner.lock().await.len()
    }
}
