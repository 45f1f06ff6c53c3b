//! Venue credential and endpoint configuration from environment variables.

use std::env;

/// Bybit V5 API configuration.
#[derive(Debug, Clone, Default)]
pub struct BybitConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub private_ws_url: String,
    pub recv_window_ms: u64,
}

impl BybitConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("BYBIT_API_KEY").unwrap_or_default(),
            api_secret: env::var("BYBIT_API_SECRET").unwrap_or_default(),
            base_url: env::var("BYBIT_BASE_URL")
                .unwrap_or_else(|_| "https://api.bybit.com".to_string()),
            private_ws_url: env::var("BYBIT_PRIVATE_WS_URL")
                .unwrap_or_else(|_| "wss://stream.bybit.com/v5/private".to_string()),
            recv_window_ms: env::var("BYBIT_RECV_WINDOW_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

/// MEXC API configuration (spot and futures endpoints).
#[derive(Debug, Clone, Default)]
pub struct MexcConfig {
    pub api_key: String,
    pub api_secret: String,
    pub spot_base_url: String,
    pub futures_base_url: String,
}

impl MexcConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("MEXC_API_KEY").unwrap_or_default(),
            api_secret: env::var("MEXC_API_SECRET").unwrap_or_default(),
            spot_base_url: env::var("MEXC_SPOT_BASE_URL")
                .unwrap_or_else(|_| "https://api.mexc.com".to_string()),
            futures_base_url: env::var("MEXC_FUTURES_BASE_URL")
                .unwrap_or_else(|_| "https://contract.mexc.com".to_string()),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}
