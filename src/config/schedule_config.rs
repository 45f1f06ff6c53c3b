//! Scheduler cadence and symbol universe configuration.

use crate::domain::trading::types::Exchange;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ScheduleEnvConfig {
    /// Sniper tick rate in milliseconds.
    pub sniper_tick_ms: u64,
    /// Default-strategy tick rate in milliseconds.
    pub default_tick_ms: u64,
    /// Hedging loop rate in milliseconds (fixed cadence, not session-gated).
    pub hedge_tick_ms: u64,
    pub sniper_symbols: Vec<String>,
    pub default_symbols: Vec<String>,
    /// Per-symbol exchange routing for the default strategy.
    pub default_exchange_map: HashMap<String, Exchange>,
    /// Worker pool sizing for per-symbol evaluation tasks.
    pub pool_core_workers: usize,
    pub pool_max_workers: usize,
    /// Bounded wait when draining the pool at shutdown.
    pub shutdown_drain_secs: u64,
}

impl Default for ScheduleEnvConfig {
    fn default() -> Self {
        Self {
            sniper_tick_ms: 60_000,
            default_tick_ms: 300_000,
            hedge_tick_ms: 60_000,
            sniper_symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            default_symbols: vec!["BTCUSDT".to_string()],
            default_exchange_map: HashMap::new(),
            pool_core_workers: 4,
            pool_max_workers: 8,
            shutdown_drain_secs: 5,
        }
    }
}

impl ScheduleEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let sniper_symbols = parse_symbols("SNIPER_SYMBOLS", &defaults.sniper_symbols);
        let default_symbols = parse_symbols("DEFAULT_SYMBOLS", &defaults.default_symbols);

        // Format: "BTCUSDT=BYBIT,TONUSDT=MEXC". Symbols without an entry
        // route to Bybit.
        let mut default_exchange_map = HashMap::new();
        if let Ok(raw) = env::var("DEFAULT_EXCHANGE_MAP") {
            for pair in raw.split(',').filter(|p| !p.trim().is_empty()) {
                let (symbol, venue) = pair
                    .split_once('=')
                    .with_context(|| format!("Malformed DEFAULT_EXCHANGE_MAP entry: {}", pair))?;
                let exchange = Exchange::from_str(venue.trim())
                    .with_context(|| format!("Unknown exchange in map entry: {}", pair))?;
                default_exchange_map.insert(symbol.trim().to_uppercase(), exchange);
            }
        }

        Ok(Self {
            sniper_tick_ms: parse_u64("SNIPER_TICK_MS", defaults.sniper_tick_ms)?,
            default_tick_ms: parse_u64("DEFAULT_TICK_MS", defaults.default_tick_ms)?,
            hedge_tick_ms: parse_u64("HEDGE_TICK_MS", defaults.hedge_tick_ms)?,
            sniper_symbols,
            default_symbols,
            default_exchange_map,
            pool_core_workers: parse_usize("POOL_CORE_WORKERS", defaults.pool_core_workers)?,
            pool_max_workers: parse_usize("POOL_MAX_WORKERS", defaults.pool_max_workers)?,
            shutdown_drain_secs: parse_u64("SHUTDOWN_DRAIN_SECS", defaults.shutdown_drain_secs)?,
        })
    }

    pub fn exchange_for(&self, symbol: &str) -> Exchange {
        self.default_exchange_map
            .get(symbol)
            .copied()
            .unwrap_or(Exchange::Bybit)
    }
}

fn parse_symbols(key: &str, default: &[String]) -> Vec<String> {
    match env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.to_vec(),
    }
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}

fn parse_usize(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}
