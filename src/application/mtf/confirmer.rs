//! Multi-timeframe confirmation: does the higher-timeframe trend agree
//! with the intended trade direction?

use crate::analysis::indicators;
use crate::application::market_data::MarketDataCache;
use crate::domain::market::Interval;
use crate::domain::signal::MtfConfirmation;
use crate::domain::trading::types::{Exchange, MarketType, OrderSide};
use std::sync::Arc;
use tracing::{debug, warn};

const TREND_MA_PERIOD: usize = 50;

pub struct MtfConfirmer {
    market_data: Arc<MarketDataCache>,
}

impl MtfConfirmer {
    pub fn new(market_data: Arc<MarketDataCache>) -> Self {
        Self { market_data }
    }

    /// Check every confirmation timeframe above `interval`. All aligned =>
    /// strong; a majority but not all => weak; all opposed => contradiction;
    /// otherwise none. The daily interval has nothing above it.
    pub async fn confirm(
        &self,
        symbol: &str,
        exchange: Exchange,
        interval: Interval,
        side: OrderSide,
    ) -> MtfConfirmation {
        let timeframes = interval.confirmation_timeframes();
        if timeframes.is_empty() {
            return MtfConfirmation::NotApplicable;
        }

        let mut aligned = 0usize;
        let mut opposed = 0usize;

        for tf in &timeframes {
            let candles = match self
                .market_data
                .candles(symbol, *tf, TREND_MA_PERIOD + 10, exchange, MarketType::Linear)
                .await
            {
                Ok(candles) => candles,
                Err(e) => {
                    warn!(
                        "MtfConfirmer: {} {} fetch failed: {:#}",
                        symbol, tf, e
                    );
                    return MtfConfirmation::Error;
                }
            };

            let closes = indicators::closes(&candles);
            let Some(trend_ma) = indicators::sma(&closes, TREND_MA_PERIOD) else {
                debug!(
                    "MtfConfirmer: {} {} too short for SMA({})",
                    symbol, tf, TREND_MA_PERIOD
                );
                continue;
            };
            let Some(&last_close) = closes.last() else {
                continue;
            };

            let bullish = last_close > trend_ma;
            let agrees = match side {
                OrderSide::Buy => bullish,
                OrderSide::Sell => !bullish,
            };
            if agrees {
                aligned += 1;
            } else {
                opposed += 1;
            }
        }

        let checked = aligned + opposed;
        if checked == 0 {
            return MtfConfirmation::None;
        }
        if opposed == checked {
            MtfConfirmation::Contradiction
        } else if aligned == checked {
            MtfConfirmation::StrongConfirmation
        } else if aligned > 0 {
            MtfConfirmation::Weak
        } else {
            MtfConfirmation::None
        }
    }
}
