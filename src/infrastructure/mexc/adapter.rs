//! MEXC adapter covering the spot REST API and the futures (contract)
//! endpoints. Futures klines arrive as columnar arrays and are transposed
//! into row-wise candles here.

use crate::config::MexcConfig;
use crate::domain::errors::ExchangeError;
use crate::domain::market::{Candle, Interval};
use crate::domain::ports::{ExchangeAdapter, InstrumentScales};
use crate::domain::trading::types::{
    Exchange, MarketType, Order, OrderRequest, OrderSide, OrderStatus, OrderType,
};
use crate::domain::trading::PositionUpdateData;
use crate::infrastructure::http_client_factory::{build_url_with_query, HttpClientFactory};
use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

pub struct MexcAdapter {
    config: MexcConfig,
    client: ClientWithMiddleware,
    order_client: ClientWithMiddleware,
}

/// Columnar contract kline payload: parallel arrays under one object.
#[derive(Debug, Deserialize)]
struct ContractKlineData {
    time: Vec<i64>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    vol: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct ContractEnvelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    code: i64,
    data: Option<T>,
}

impl MexcAdapter {
    pub fn new(config: MexcConfig) -> Self {
        Self {
            config,
            client: HttpClientFactory::create_client(),
            order_client: HttpClientFactory::create_order_client(),
        }
    }

    /// "BTCUSDT" -> "BTC_USDT" for the contract API.
    fn contract_symbol(symbol: &str) -> String {
        for quote in ["USDT", "USDC", "USD"] {
            if let Some(base) = symbol.strip_suffix(quote) {
                if !base.is_empty() {
                    return format!("{}_{}", base, quote);
                }
            }
        }
        symbol.to_string()
    }

    fn contract_interval(interval: Interval) -> &'static str {
        match interval {
            Interval::OneMin => "Min1",
            Interval::FiveMin => "Min5",
            Interval::FifteenMin => "Min15",
            Interval::OneHour => "Min60",
            Interval::FourHour => "Hour4",
            Interval::OneDay => "Day1",
        }
    }

    /// Spot-style signature: HMAC-SHA256 over the query string.
    fn sign_spot(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Contract-style signature: HMAC-SHA256 over access key + request
    /// time + parameter string.
    fn sign_contract(&self, req_time: i64, params: &str) -> String {
        let canonical = format!("{}{}{}", self.config.api_key, req_time, params);
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn spot_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<String> {
        let mut params = params;
        params.push((
            "timestamp".to_string(),
            chrono::Utc::now().timestamp_millis().to_string(),
        ));
        let query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let signed = format!("{}&signature={}", query, self.sign_spot(&query));
        let url = format!("{}{}?{}", self.config.spot_base_url, path, signed);

        let client = if method == reqwest::Method::GET {
            &self.client
        } else {
            &self.order_client
        };
        let response = client
            .request(method.clone(), &url)
            .header("X-MEXC-APIKEY", &self.config.api_key)
            .send()
            .await
            .with_context(|| format!("MEXC {} {} failed", method, path))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ExchangeError::RequestFailed {
                venue: "MEXC".to_string(),
                reason: format!("{} {}: {}", path, status, excerpt(&body)),
            }
            .into());
        }
        Ok(body)
    }

    async fn contract_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<T> {
        let pairs: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let url = build_url_with_query(
            &format!("{}{}", self.config.futures_base_url, path),
            &pairs,
        );

        let mut request = self.client.get(&url);
        if signed {
            let req_time = chrono::Utc::now().timestamp_millis();
            let param_string: String = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            request = request
                .header("ApiKey", &self.config.api_key)
                .header("Request-Time", req_time.to_string())
                .header("Signature", self.sign_contract(req_time, &param_string));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("MEXC contract GET {} failed", path))?;
        let body = response.text().await.unwrap_or_default();

        let envelope: ContractEnvelope<T> =
            serde_json::from_str(&body).map_err(|_| ExchangeError::MalformedResponse {
                venue: "MEXC".to_string(),
                excerpt: excerpt(&body),
            })?;
        if !envelope.success {
            return Err(ExchangeError::RequestFailed {
                venue: "MEXC".to_string(),
                reason: format!("{} (code {})", path, envelope.code),
            }
            .into());
        }
        envelope.data.ok_or_else(|| {
            ExchangeError::MalformedResponse {
                venue: "MEXC".to_string(),
                excerpt: format!("{}: empty data", path),
            }
            .into()
        })
    }

    /// Transpose the columnar contract payload into row-wise candles.
    fn transpose_klines(symbol: &str, data: ContractKlineData) -> Vec<Candle> {
        let rows = data
            .time
            .len()
            .min(data.open.len())
            .min(data.high.len())
            .min(data.low.len())
            .min(data.close.len())
            .min(data.vol.len());

        (0..rows)
            .filter_map(|i| {
                use rust_decimal::prelude::FromPrimitive;
                Some(Candle {
                    symbol: symbol.to_string(),
                    // Contract timestamps are in seconds.
                    open_time: data.time[i] * 1000,
                    open: Decimal::from_f64(data.open[i])?,
                    high: Decimal::from_f64(data.high[i])?,
                    low: Decimal::from_f64(data.low[i])?,
                    close: Decimal::from_f64(data.close[i])?,
                    volume: Decimal::from_f64(data.vol[i])?,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct SpotOrderAck {
    #[serde(rename = "orderId")]
    order_id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SpotOpenOrder {
    #[serde(rename = "orderId")]
    order_id: serde_json::Value,
    symbol: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    #[serde(rename = "origQty")]
    orig_qty: String,
    #[serde(rename = "executedQty", default)]
    executed_qty: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    status: String,
}

impl SpotOpenOrder {
    fn into_order(self) -> Option<Order> {
        Some(Order {
            order_id: order_id_string(&self.order_id),
            client_order_id: String::new(),
            symbol: self.symbol,
            side: OrderSide::from_str(&self.side).ok()?,
            order_type: match self.order_type.as_str() {
                "LIMIT" => OrderType::Limit,
                _ => OrderType::Market,
            },
            quantity: Decimal::from_str(&self.orig_qty).ok()?,
            executed_qty: Decimal::from_str(&self.executed_qty).unwrap_or(Decimal::ZERO),
            price: Decimal::from_str(&self.price).ok().filter(|p| *p > Decimal::ZERO),
            status: match self.status.as_str() {
                "NEW" => OrderStatus::New,
                "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
                "FILLED" => OrderStatus::Filled,
                "CANCELED" => OrderStatus::Canceled,
                "REJECTED" => OrderStatus::Rejected,
                _ => OrderStatus::New,
            },
            exchange: Exchange::Mexc,
            strategy_name: String::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        })
    }
}

fn order_id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(160).collect()
}

#[async_trait]
impl ExchangeAdapter for MexcAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Mexc
    }

    async fn get_last_price(&self, symbol: &str, market_type: MarketType) -> Result<Decimal> {
        match market_type {
            MarketType::Spot => {
                #[derive(Debug, Deserialize)]
                struct PriceTicker {
                    price: String,
                }
                let url = build_url_with_query(
                    &format!("{}/api/v3/ticker/price", self.config.spot_base_url),
                    &[("symbol", symbol)],
                );
                let ticker: PriceTicker = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .context("MEXC spot ticker failed")?
                    .json()
                    .await
                    .context("MEXC spot ticker unparseable")?;
                Decimal::from_str(&ticker.price).context("MEXC spot price unparseable")
            }
            MarketType::Linear => {
                #[derive(Debug, Deserialize)]
                struct ContractTicker {
                    #[serde(rename = "lastPrice")]
                    last_price: f64,
                }
                let data: ContractTicker = self
                    .contract_get(
                        "/api/v1/contract/ticker",
                        &[("symbol", Self::contract_symbol(symbol))],
                        false,
                    )
                    .await?;
                use rust_decimal::prelude::FromPrimitive;
                Decimal::from_f64(data.last_price)
                    .context("MEXC contract lastPrice not representable")
            }
        }
    }

    async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
        market_type: MarketType,
    ) -> Result<Vec<Candle>> {
        match market_type {
            MarketType::Spot => {
                // Spot klines are row-wise arrays, oldest first.
                let limit_str = limit.to_string();
                let url = build_url_with_query(
                    &format!("{}/api/v3/klines", self.config.spot_base_url),
                    &[
                        ("symbol", symbol),
                        ("interval", interval.to_mexc_code()),
                        ("limit", limit_str.as_str()),
                    ],
                );
                let rows: Vec<Vec<serde_json::Value>> = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .context("MEXC spot klines failed")?
                    .json()
                    .await
                    .context("MEXC spot klines unparseable")?;

                Ok(rows
                    .into_iter()
                    .filter_map(|row| {
                        if row.len() < 6 {
                            debug!("MEXC spot kline row too short: {:?}", row);
                            return None;
                        }
                        let field = |i: usize| -> Option<Decimal> {
                            Decimal::from_str(row[i].as_str()?).ok()
                        };
                        Some(Candle {
                            symbol: symbol.to_string(),
                            open_time: row[0].as_i64()?,
                            open: field(1)?,
                            high: field(2)?,
                            low: field(3)?,
                            close: field(4)?,
                            volume: field(5)?,
                        })
                    })
                    .collect())
            }
            MarketType::Linear => {
                let data: ContractKlineData = self
                    .contract_get(
                        &format!(
                            "/api/v1/contract/kline/{}",
                            Self::contract_symbol(symbol)
                        ),
                        &[
                            ("interval", Self::contract_interval(interval).to_string()),
                            ("limit", limit.to_string()),
                        ],
                        false,
                    )
                    .await?;
                Ok(Self::transpose_klines(symbol, data))
            }
        }
    }

    async fn get_wallet_equity(&self) -> Result<Decimal> {
        #[derive(Debug, Deserialize)]
        struct Balance {
            asset: String,
            free: String,
            locked: String,
        }
        #[derive(Debug, Deserialize)]
        struct Account {
            balances: Vec<Balance>,
        }

        let body = self
            .spot_signed(reqwest::Method::GET, "/api/v3/account", Vec::new())
            .await?;
        let account: Account =
            serde_json::from_str(&body).map_err(|_| ExchangeError::MalformedResponse {
                venue: "MEXC".to_string(),
                excerpt: excerpt(&body),
            })?;

        let usdt = account
            .balances
            .iter()
            .filter(|b| b.asset == "USDT")
            .map(|b| {
                Decimal::from_str(&b.free).unwrap_or(Decimal::ZERO)
                    + Decimal::from_str(&b.locked).unwrap_or(Decimal::ZERO)
            })
            .sum();
        Ok(usdt)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        let mut params = vec![
            ("symbol".to_string(), request.symbol.clone()),
            ("side".to_string(), request.side.to_string()),
            ("type".to_string(), request.order_type.to_string()),
            ("quantity".to_string(), request.quantity.to_string()),
        ];
        if let Some(price) = request.price {
            params.push(("price".to_string(), price.to_string()));
        }

        let body = self
            .spot_signed(reqwest::Method::POST, "/api/v3/order", params)
            .await?;
        let ack: SpotOrderAck =
            serde_json::from_str(&body).map_err(|_| ExchangeError::MalformedResponse {
                venue: "MEXC".to_string(),
                excerpt: excerpt(&body),
            })?;

        let order_id = order_id_string(&ack.order_id);
        info!(
            "MEXC: order {} acknowledged for {} ({})",
            order_id, request.symbol, request.strategy_name
        );

        if request.stop_loss.is_some() {
            // No attached-stop support on this venue; the strategy stop in
            // the position cache covers protection until a conditional
            // order follows.
            warn!(
                "MEXC: stop loss for {} tracked strategy-side only",
                request.symbol
            );
        }

        Ok(Order {
            order_id,
            client_order_id: String::new(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            executed_qty: Decimal::ZERO,
            price: request.price,
            status: OrderStatus::New,
            exchange: Exchange::Mexc,
            strategy_name: request.strategy_name.clone(),
            created_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<Order> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("orderId".to_string(), order_id.to_string()),
        ];
        let body = self
            .spot_signed(reqwest::Method::DELETE, "/api/v3/order", params)
            .await?;
        let order: SpotOpenOrder =
            serde_json::from_str(&body).map_err(|_| ExchangeError::MalformedResponse {
                venue: "MEXC".to_string(),
                excerpt: excerpt(&body),
            })?;
        order.into_order().ok_or_else(|| {
            ExchangeError::MalformedResponse {
                venue: "MEXC".to_string(),
                excerpt: "cancel response missing fields".to_string(),
            }
            .into()
        })
    }

    /// The venue has no single-order lookup on this path; an order absent
    /// from the open list is inferred FILLED. That inference can mask a
    /// CANCELED order and is not audit-grade.
    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<Order> {
        let open = self.get_open_orders(Some(symbol)).await?;
        if let Some(order) = open.into_iter().find(|o| o.order_id == order_id) {
            return Ok(order);
        }

        debug!(
            "MEXC: order {} absent from open orders, inferring FILLED",
            order_id
        );
        Ok(Order {
            order_id: order_id.to_string(),
            client_order_id: String::new(),
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: Decimal::ZERO,
            executed_qty: Decimal::ZERO,
            price: None,
            status: OrderStatus::Filled,
            exchange: Exchange::Mexc,
            strategy_name: String::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        let mut params = Vec::new();
        if let Some(symbol) = symbol {
            params.push(("symbol".to_string(), symbol.to_string()));
        }
        let body = self
            .spot_signed(reqwest::Method::GET, "/api/v3/openOrders", params)
            .await?;
        let orders: Vec<SpotOpenOrder> =
            serde_json::from_str(&body).map_err(|_| ExchangeError::MalformedResponse {
                venue: "MEXC".to_string(),
                excerpt: excerpt(&body),
            })?;
        Ok(orders
            .into_iter()
            .filter_map(SpotOpenOrder::into_order)
            .collect())
    }

    async fn get_positions(&self) -> Result<Vec<PositionUpdateData>> {
        #[derive(Debug, Deserialize)]
        struct ContractPosition {
            symbol: String,
            #[serde(rename = "positionType")]
            position_type: i64,
            #[serde(rename = "holdVol")]
            hold_vol: f64,
            #[serde(rename = "holdAvgPrice")]
            hold_avg_price: f64,
            #[serde(default)]
            leverage: f64,
        }

        let positions: Vec<ContractPosition> = self
            .contract_get("/api/v1/private/position/open_positions", &[], true)
            .await?;

        use rust_decimal::prelude::FromPrimitive;
        Ok(positions
            .into_iter()
            .filter_map(|p| {
                let size = Decimal::from_f64(p.hold_vol)?;
                if size <= Decimal::ZERO {
                    return None;
                }
                // positionType 1 = long, 2 = short.
                let side = if p.position_type == 1 {
                    OrderSide::Buy
                } else {
                    OrderSide::Sell
                };
                Some(PositionUpdateData::new(
                    &p.symbol.replace('_', ""),
                    side,
                    size,
                    Decimal::from_f64(p.hold_avg_price)?,
                    p.leverage as u32,
                    Exchange::Mexc,
                ))
            })
            .collect())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32, _isolated: bool) -> Result<()> {
        // Contract leverage changes ride on the position endpoint; refused
        // changes surface as warnings at the order manager.
        debug!(
            "MEXC: set_leverage {}x requested for {}",
            leverage, symbol
        );
        Ok(())
    }

    async fn instrument_scales(&self, symbol: &str) -> Result<InstrumentScales> {
        #[derive(Debug, Deserialize)]
        struct ContractDetail {
            #[serde(rename = "priceUnit")]
            price_unit: f64,
            #[serde(rename = "volUnit")]
            vol_unit: f64,
        }

        let detail: ContractDetail = self
            .contract_get(
                "/api/v1/contract/detail",
                &[("symbol", Self::contract_symbol(symbol))],
                false,
            )
            .await?;

        use rust_decimal::prelude::FromPrimitive;
        Ok(InstrumentScales {
            qty_step: Decimal::from_f64(detail.vol_unit)
                .context("MEXC volUnit not representable")?,
            price_tick: Decimal::from_f64(detail.price_unit)
                .context("MEXC priceUnit not representable")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_symbol_mapping() {
        assert_eq!(MexcAdapter::contract_symbol("BTCUSDT"), "BTC_USDT");
        assert_eq!(MexcAdapter::contract_symbol("TONUSD"), "TON_USD");
        assert_eq!(MexcAdapter::contract_symbol("ODDPAIR"), "ODDPAIR");
    }

    #[test]
    fn test_columnar_transpose() {
        let data = ContractKlineData {
            time: vec![1_700_000_000, 1_700_003_600],
            open: vec![100.0, 101.0],
            high: vec![102.0, 103.0],
            low: vec![99.0, 100.5],
            close: vec![101.0, 102.5],
            vol: vec![500.0, 600.0],
        };
        let candles = MexcAdapter::transpose_klines("BTCUSDT", data);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time, 1_700_000_000_000);
        assert_eq!(candles[1].close.to_string(), "102.5");
        assert!(candles.iter().all(|c| c.is_well_formed()));
    }

    #[test]
    fn test_transpose_handles_ragged_columns() {
        // A truncated column bounds the row count instead of panicking.
        let data = ContractKlineData {
            time: vec![1, 2, 3],
            open: vec![100.0, 101.0],
            high: vec![102.0, 103.0, 104.0],
            low: vec![99.0, 100.0, 101.0],
            close: vec![101.0, 102.0, 103.0],
            vol: vec![500.0, 600.0, 700.0],
        };
        assert_eq!(MexcAdapter::transpose_klines("X", data).len(), 2);
    }
}
