//! Market data service: latest prices and candlestick windows per
//! (symbol, interval, exchange), cached in front of the venue adapters.

use crate::domain::errors::ExchangeError;
use crate::domain::market::{Candle, Interval};
use crate::domain::ports::ExchangeAdapter;
use crate::domain::trading::types::{Exchange, MarketType};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const PRICE_TTL: Duration = Duration::from_secs(5);
const CANDLE_TTL: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct CachedPrice {
    price: Decimal,
    fetched_at: Instant,
}

#[derive(Clone)]
struct CachedWindow {
    candles: Vec<Candle>,
    fetched_at: Instant,
}

pub struct MarketDataCache {
    adapters: HashMap<Exchange, Arc<dyn ExchangeAdapter>>,
    prices: RwLock<HashMap<(String, Exchange), CachedPrice>>,
    windows: RwLock<HashMap<(String, Interval, Exchange), CachedWindow>>,
}

impl MarketDataCache {
    pub fn new(adapters: HashMap<Exchange, Arc<dyn ExchangeAdapter>>) -> Self {
        Self {
            adapters,
            prices: RwLock::new(HashMap::new()),
            windows: RwLock::new(HashMap::new()),
        }
    }

    fn adapter(&self, exchange: Exchange) -> Result<&Arc<dyn ExchangeAdapter>> {
        self.adapters
            .get(&exchange)
            .with_context(|| format!("No adapter registered for {}", exchange))
    }

    /// Latest traded price, served from cache while fresh.
    pub async fn last_price(
        &self,
        symbol: &str,
        exchange: Exchange,
        market_type: MarketType,
    ) -> Result<Decimal> {
        let key = (symbol.to_string(), exchange);
        {
            let prices = self.prices.read().await;
            if let Some(cached) = prices.get(&key) {
                if cached.fetched_at.elapsed() < PRICE_TTL {
                    return Ok(cached.price);
                }
            }
        }

        let price = self
            .adapter(exchange)?
            .get_last_price(symbol, market_type)
            .await
            .with_context(|| format!("Failed to fetch last price for {} on {}", symbol, exchange))?;

        self.prices.write().await.insert(
            key,
            CachedPrice {
                price,
                fetched_at: Instant::now(),
            },
        );
        Ok(price)
    }

    /// Candle window for (symbol, interval), oldest first. A venue-rejected
    /// interval is retried once on the daily fallback before giving up.
    pub async fn candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
        exchange: Exchange,
        market_type: MarketType,
    ) -> Result<Vec<Candle>> {
        let key = (symbol.to_string(), interval, exchange);
        {
            let windows = self.windows.read().await;
            if let Some(cached) = windows.get(&key) {
                if cached.fetched_at.elapsed() < CANDLE_TTL && cached.candles.len() >= limit {
                    let start = cached.candles.len() - limit;
                    return Ok(cached.candles[start..].to_vec());
                }
            }
        }

        let adapter = self.adapter(exchange)?;
        let candles = match adapter.get_klines(symbol, interval, limit, market_type).await {
            Ok(candles) => candles,
            Err(e) => {
                if let Some(ExchangeError::InvalidInterval { .. }) =
                    e.downcast_ref::<ExchangeError>()
                {
                    warn!(
                        "{}: interval {} rejected by {}, retrying on {}",
                        symbol,
                        interval,
                        exchange,
                        Interval::fallback()
                    );
                    adapter
                        .get_klines(symbol, Interval::fallback(), limit, market_type)
                        .await?
                } else {
                    return Err(e);
                }
            }
        };

        debug!(
            "MarketDataCache: fetched {} candles for {} {} on {}",
            candles.len(),
            symbol,
            interval,
            exchange
        );

        self.windows.write().await.insert(
            key,
            CachedWindow {
                candles: candles.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(candles)
    }

    /// Drop any cached window for a symbol, forcing the next read through
    /// to the venue.
    pub async fn invalidate(&self, symbol: &str) {
        let mut prices = self.prices.write().await;
        prices.retain(|(s, _), _| s != symbol);
        drop(prices);
        let mut windows = self.windows.write().await;
        windows.retain(|(s, _, _), _| s != symbol);
    }
}
