//! AI oracle adapter: synchronous request/response to the external
//! language-model analyzer. The oracle never blocks a tier decision — any
//! failure degrades to "no confirmation".

use crate::application::ai::setup_parser::{parse_setups, TradeSetup};
use crate::config::AiEnvConfig;
use crate::domain::market::Interval;
use crate::domain::signal::AiVerdict;
use crate::domain::trading::types::Exchange;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

#[async_trait]
pub trait AiOracle: Send + Sync {
    /// Directional verdict for one symbol at its current price.
    async fn analyze(
        &self,
        symbol: &str,
        interval: Interval,
        exchange: Exchange,
        price: Decimal,
    ) -> Result<AiVerdict>;

    /// Free-form market scan; structured setup blocks in the response
    /// become candidate trades.
    async fn custom_scan(&self, prompt: &str) -> Result<Vec<TradeSetup>>;

    /// Fire-and-forget notification of a structural event (breakout or
    /// rejection). Must never block the evaluation tick; implementations
    /// log failures and move on.
    async fn notify_event(&self, symbol: &str, event: &str, price: Decimal);
}

/// HTTP implementation posting text prompts to the configured endpoint.
pub struct HttpAiOracle {
    config: AiEnvConfig,
    client: reqwest::Client,
    scan_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OracleResponse {
    #[serde(default)]
    text: String,
}

impl HttpAiOracle {
    pub fn new(config: AiEnvConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build AI oracle HTTP client")?;
        let scan_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.scan_timeout_secs))
            .build()
            .context("Failed to build AI scan HTTP client")?;
        Ok(Self {
            config,
            client,
            scan_client,
        })
    }

    async fn post_prompt(&self, client: &reqwest::Client, prompt: &str) -> Result<String> {
        let response = client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&json!({ "prompt": prompt }))
            .send()
            .await
            .context("AI oracle request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("AI oracle returned {}: {}", status, truncate(&body, 200));
        }

        // The endpoint may answer with a JSON envelope or raw text.
        let body = response.text().await.context("AI oracle body unreadable")?;
        if let Ok(parsed) = serde_json::from_str::<OracleResponse>(&body) {
            if !parsed.text.is_empty() {
                return Ok(parsed.text);
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl AiOracle for HttpAiOracle {
    async fn analyze(
        &self,
        symbol: &str,
        interval: Interval,
        exchange: Exchange,
        price: Decimal,
    ) -> Result<AiVerdict> {
        let prompt = format!(
            "Analyze {} on the {} timeframe ({}) trading at {}. \
             Answer with exactly one of: STRONG_BUY, BUY, NEUTRAL, SELL, STRONG_SELL, \
             followed by a short rationale.",
            symbol, interval, exchange, price
        );

        let text = self.post_prompt(&self.client, &prompt).await?;
        debug!("AI oracle answer for {}: {}", symbol, truncate(&text, 160));

        match AiVerdict::parse(&text) {
            Some(verdict) => {
                info!("AI oracle verdict for {}: {}", symbol, verdict);
                Ok(verdict)
            }
            None => {
                warn!(
                    "AI oracle answer for {} had no verdict token: {}",
                    symbol,
                    truncate(&text, 120)
                );
                Ok(AiVerdict::Neutral)
            }
        }
    }

    async fn custom_scan(&self, prompt: &str) -> Result<Vec<TradeSetup>> {
        let text = self.post_prompt(&self.scan_client, prompt).await?;
        let setups = parse_setups(&text);
        info!("AI scan produced {} setup(s)", setups.len());
        Ok(setups)
    }

    async fn notify_event(&self, symbol: &str, event: &str, price: Decimal) {
        let prompt = format!("Event on {}: {} at {}", symbol, event, price);
        let client = self.client.clone();
        let endpoint = self.config.endpoint.clone();
        let api_key = self.config.api_key.clone();
        tokio::spawn(async move {
            let result = client
                .post(&endpoint)
                .bearer_auth(&api_key)
                .json(&json!({ "prompt": prompt, "notify": true }))
                .send()
                .await;
            if let Err(e) = result {
                debug!("AI event notification dropped: {}", e);
            }
        });
    }
}

/// Oracle used when no endpoint is configured: always neutral, no setups.
pub struct DisabledAiOracle;

#[async_trait]
impl AiOracle for DisabledAiOracle {
    async fn analyze(
        &self,
        _symbol: &str,
        _interval: Interval,
        _exchange: Exchange,
        _price: Decimal,
    ) -> Result<AiVerdict> {
        Ok(AiVerdict::Neutral)
    }

    async fn custom_scan(&self, _prompt: &str) -> Result<Vec<TradeSetup>> {
        Ok(Vec::new())
    }

    async fn notify_event(&self, _symbol: &str, _event: &str, _price: Decimal) {}
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
