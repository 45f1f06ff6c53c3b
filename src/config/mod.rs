//! Configuration loading from environment variables, organized by concern:
//! exchange credentials, scheduler cadence, sniper tuning, risk limits,
//! hedging, and the AI analyzer endpoint.

mod exchange_config;
mod schedule_config;
mod sniper_config;

pub use exchange_config::{BybitConfig, MexcConfig};
pub use schedule_config::ScheduleEnvConfig;
pub use sniper_config::SniperEnvConfig;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Risk-limit configuration.
#[derive(Debug, Clone)]
pub struct RiskEnvConfig {
    pub max_open_positions: usize,
    /// Hard ceiling on the equity fraction a single trade may risk.
    pub max_risk_per_trade: Decimal,
    /// Per-symbol notional cap as a fraction of equity.
    pub max_symbol_exposure: Decimal,
}

impl Default for RiskEnvConfig {
    fn default() -> Self {
        Self {
            max_open_positions: 10,
            max_risk_per_trade: Decimal::from_str("0.02").expect("static decimal"),
            max_symbol_exposure: Decimal::from_str("0.25").expect("static decimal"),
        }
    }
}

impl RiskEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_open_positions: parse_or("RISK_MAX_OPEN_POSITIONS", defaults.max_open_positions)?,
            max_risk_per_trade: parse_or("RISK_MAX_PER_TRADE", defaults.max_risk_per_trade)?,
            max_symbol_exposure: parse_or("RISK_MAX_SYMBOL_EXPOSURE", defaults.max_symbol_exposure)?,
        })
    }
}

/// Hedging loop configuration.
#[derive(Debug, Clone)]
pub struct HedgeEnvConfig {
    /// Unrealized loss fraction that fires HIGH_UNREALIZED_LOSS (negative).
    pub loss_trigger_pct: f64,
    /// ATR as a fraction of price that fires VOLATILITY_SPIKE.
    pub volatility_trigger_pct: f64,
    /// Aggregate correlated exposure fraction that fires CORRELATION_RISK.
    pub correlation_exposure_limit: f64,
    pub hedge_ratio: Decimal,
    pub cooldown_secs: u64,
    /// Hedge lifetime before time-based expiry, seconds. Zero disables.
    pub expiry_secs: u64,
}

impl Default for HedgeEnvConfig {
    fn default() -> Self {
        Self {
            loss_trigger_pct: -0.15,
            volatility_trigger_pct: 0.04,
            correlation_exposure_limit: 0.5,
            hedge_ratio: Decimal::from_str("0.5").expect("static decimal"),
            cooldown_secs: 300,
            expiry_secs: 0,
        }
    }
}

impl HedgeEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            loss_trigger_pct: parse_or("HEDGE_LOSS_TRIGGER_PCT", defaults.loss_trigger_pct)?,
            volatility_trigger_pct: parse_or(
                "HEDGE_VOLATILITY_TRIGGER_PCT",
                defaults.volatility_trigger_pct,
            )?,
            correlation_exposure_limit: parse_or(
                "HEDGE_CORRELATION_EXPOSURE_LIMIT",
                defaults.correlation_exposure_limit,
            )?,
            hedge_ratio: parse_or("HEDGE_RATIO", defaults.hedge_ratio)?,
            cooldown_secs: parse_or("HEDGE_COOLDOWN_SECS", defaults.cooldown_secs)?,
            expiry_secs: parse_or("HEDGE_EXPIRY_SECS", defaults.expiry_secs)?,
        })
    }
}

/// AI analyzer endpoint configuration.
#[derive(Debug, Clone)]
pub struct AiEnvConfig {
    pub endpoint: String,
    pub api_key: String,
    /// Per-request timeout for verdict queries, seconds.
    pub timeout_secs: u64,
    /// Timeout for full custom scans, seconds.
    pub scan_timeout_secs: u64,
}

impl AiEnvConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var("AI_ENDPOINT").unwrap_or_default(),
            api_key: env::var("AI_API_KEY").unwrap_or_default(),
            timeout_secs: env::var("AI_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            scan_timeout_secs: env::var("AI_SCAN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty()
    }
}

/// Aggregated application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bybit: BybitConfig,
    pub mexc: MexcConfig,
    pub schedule: ScheduleEnvConfig,
    pub sniper: SniperEnvConfig,
    pub risk: RiskEnvConfig,
    pub hedge: HedgeEnvConfig,
    pub ai: AiEnvConfig,
    pub database_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bybit: BybitConfig::from_env(),
            mexc: MexcConfig::from_env(),
            schedule: ScheduleEnvConfig::from_env()?,
            sniper: SniperEnvConfig::from_env()?,
            risk: RiskEnvConfig::from_env()?,
            hedge: HedgeEnvConfig::from_env()?,
            ai: AiEnvConfig::from_env(),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/tradepulse.db".to_string()),
        })
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
