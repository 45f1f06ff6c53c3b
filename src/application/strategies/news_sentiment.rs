//! News-sentiment strategy: VADER-scored RSS headlines, gated by a volume
//! spike so that stale news cannot fire into a dead market.

use crate::analysis::{indicators, volume};
use crate::application::market_data::MarketDataCache;
use crate::application::risk::RiskManager;
use crate::domain::market::Interval;
use crate::domain::signal::{SignalKind, SignalTier};
use crate::domain::trading::types::{Exchange, MarketType, OrderSide};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rss::Channel;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};
use vader_sentiment::SentimentIntensityAnalyzer;

const BULLISH_THRESHOLD: f64 = 0.5;
const BEARISH_THRESHOLD: f64 = -0.5;
const HEADLINE_LIMIT: usize = 20;

pub struct NewsSentimentStrategy {
    market_data: Arc<MarketDataCache>,
    risk_manager: Arc<RiskManager>,
    feed_url: String,
    client: reqwest::Client,
}

impl NewsSentimentStrategy {
    pub const ID: &'static str = "news-sentiment";

    pub fn new(
        market_data: Arc<MarketDataCache>,
        risk_manager: Arc<RiskManager>,
        feed_url: String,
    ) -> Self {
        Self {
            market_data,
            risk_manager,
            feed_url,
            client: reqwest::Client::new(),
        }
    }

    /// Mean VADER compound score over headlines mentioning the symbol's
    /// base asset. None when nothing relevant was published.
    fn score_headlines(symbol: &str, headlines: &[String]) -> Option<f64> {
        // "BTCUSDT" -> "BTC"
        let base = symbol
            .strip_suffix("USDT")
            .or_else(|| symbol.strip_suffix("USD"))
            .unwrap_or(symbol);
        let analyzer = SentimentIntensityAnalyzer::new();

        let scores: Vec<f64> = headlines
            .iter()
            .filter(|h| h.to_uppercase().contains(base))
            .map(|h| {
                analyzer
                    .polarity_scores(h)
                    .get("compound")
                    .copied()
                    .unwrap_or(0.0)
            })
            .collect();

        if scores.is_empty() {
            return None;
        }
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    async fn fetch_headlines(&self) -> Result<Vec<String>> {
        let bytes = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .context("RSS feed request failed")?
            .bytes()
            .await
            .context("RSS feed body unreadable")?;
        let channel =
            Channel::read_from(Cursor::new(bytes)).context("RSS feed is not valid XML")?;
        Ok(channel
            .items()
            .iter()
            .take(HEADLINE_LIMIT)
            .filter_map(|item| item.title().map(str::to_string))
            .collect())
    }
}

#[async_trait]
impl super::Strategy for NewsSentimentStrategy {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "News Sentiment"
    }

    fn interval(&self) -> Interval {
        Interval::FifteenMin
    }

    async fn evaluate_entry(
        &self,
        symbol: &str,
        exchange: Exchange,
        interval: Interval,
        side: OrderSide,
    ) -> Result<SignalTier> {
        let headlines = match self.fetch_headlines().await {
            Ok(h) => h,
            Err(e) => {
                warn!("NewsSentiment [{}]: feed unavailable: {:#}", symbol, e);
                return Ok(SignalTier::NoSignal);
            }
        };

        let Some(score) = Self::score_headlines(symbol, &headlines) else {
            return Ok(SignalTier::NoSignal);
        };
        debug!("NewsSentiment [{}]: compound score {:.3}", symbol, score);

        let triggered = match side {
            OrderSide::Buy => score >= BULLISH_THRESHOLD,
            OrderSide::Sell => score <= BEARISH_THRESHOLD,
        };
        if !triggered {
            return Ok(SignalTier::NoSignal);
        }

        // Require the market to actually be reacting.
        let candles = self
            .market_data
            .candles(symbol, interval, 22, exchange, MarketType::Linear)
            .await?;
        let volumes = indicators::volumes(&candles);
        if !volume::is_volume_spike(&volumes, 20, 1.5) {
            debug!(
                "NewsSentiment [{}]: sentiment {:.3} without volume, standing aside",
                symbol, score
            );
            return Ok(SignalTier::NoSignal);
        }

        Ok(SignalTier::graded(3, SignalKind::Confluence, side))
    }

    async fn evaluate_exit(
        &self,
        symbol: &str,
        _exchange: Exchange,
        _interval: Interval,
    ) -> Result<bool> {
        // Exit when sentiment flips hard against the position; otherwise
        // rely on the protective stop.
        let headlines = match self.fetch_headlines().await {
            Ok(h) => h,
            Err(_) => return Ok(false),
        };
        Ok(Self::score_headlines(symbol, &headlines)
            .map(|score| score <= BEARISH_THRESHOLD)
            .unwrap_or(false))
    }

    async fn calculate_position_size(
        &self,
        _symbol: &str,
        equity: Decimal,
        entry_price: Decimal,
    ) -> Result<Decimal> {
        if entry_price <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        let risk = Decimal::from_f64(0.003).unwrap_or(Decimal::ZERO);
        Ok(equity * risk / entry_price)
    }

    async fn initial_stop_loss(
        &self,
        _symbol: &str,
        _exchange: Exchange,
        _interval: Interval,
        side: OrderSide,
        entry_price: Decimal,
    ) -> Result<Decimal> {
        Ok(self.risk_manager.calculate_stop_loss(entry_price, side))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headline_filter_matches_base_asset() {
        let headlines = vec![
            "BTC ETF approval is a great success for investors".to_string(),
            "Ethereum upgrade delayed again".to_string(),
        ];
        let score = NewsSentimentStrategy::score_headlines("BTCUSDT", &headlines);
        assert!(score.is_some());
        assert!(score.unwrap() > 0.0);

        // No SOL headline present.
        assert!(NewsSentimentStrategy::score_headlines("SOLUSDT", &headlines).is_none());
    }

    #[test]
    fn test_negative_headlines_score_below_zero() {
        let headlines =
            vec!["BTC investors fear the worst after terrible exchange failure".to_string()];
        let score = NewsSentimentStrategy::score_headlines("BTCUSDT", &headlines).unwrap();
        assert!(score < 0.0, "expected bearish score, got {score}");
    }
}
