//! REST adapter for Bybit V5 (linear perpetuals).

use super::common::{excerpt, sign_v5, unwrap_v5};
use crate::config::BybitConfig;
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
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

pub struct BybitAdapter {
    config: BybitConfig,
    client: ClientWithMiddleware,
    order_client: ClientWithMiddleware,
}

impl BybitAdapter {
    pub fn new(config: BybitConfig) -> Self {
        Self {
            config,
            client: HttpClientFactory::create_client(),
            order_client: HttpClientFactory::create_order_client(),
        }
    }

    fn category(market_type: MarketType) -> &'static str {
        match market_type {
            MarketType::Spot => "spot",
            MarketType::Linear => "linear",
        }
    }

    async fn signed_get(&self, path: &str, params: &[(&str, String)]) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let signature = sign_v5(
            &self.config.api_secret,
            timestamp,
            &self.config.api_key,
            self.config.recv_window_ms,
            &query,
        );

        let pairs: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let url = build_url_with_query(&format!("{}{}", self.config.base_url, path), &pairs);

        let response = self
            .client
            .get(&url)
            .header("X-BAPI-API-KEY", &self.config.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", self.config.recv_window_ms.to_string())
            .header("X-BAPI-SIGN", signature)
            .send()
            .await
            .with_context(|| format!("Bybit GET {} failed", path))?;
        response
            .text()
            .await
            .with_context(|| format!("Bybit GET {} body unreadable", path))
    }

    async fn signed_post(&self, path: &str, body: serde_json::Value) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let payload = body.to_string();
        let signature = sign_v5(
            &self.config.api_secret,
            timestamp,
            &self.config.api_key,
            self.config.recv_window_ms,
            &payload,
        );

        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .order_client
            .post(&url)
            .header("X-BAPI-API-KEY", &self.config.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", self.config.recv_window_ms.to_string())
            .header("X-BAPI-SIGN", signature)
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
            .with_context(|| format!("Bybit POST {} failed", path))?;
        response
            .text()
            .await
            .with_context(|| format!("Bybit POST {} body unreadable", path))
    }

    fn map_status(status: &str) -> OrderStatus {
        match status {
            "New" | "Created" | "Untriggered" => OrderStatus::New,
            "PartiallyFilled" => OrderStatus::PartiallyFilled,
            "Filled" => OrderStatus::Filled,
            "Cancelled" | "Deactivated" | "PartiallyFilledCanceled" => OrderStatus::Canceled,
            "Rejected" => OrderStatus::Rejected,
            _ => OrderStatus::New,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TickerList {
    list: Vec<TickerEntry>,
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
    #[serde(rename = "lastPrice")]
    last_price: String,
}

#[derive(Debug, Deserialize)]
struct KlineList {
    list: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct OrderAck {
    #[serde(rename = "orderId")]
    order_id: String,
    #[serde(rename = "orderLinkId", default)]
    order_link_id: String,
}

#[derive(Debug, Deserialize)]
struct OrderList {
    list: Vec<OrderEntry>,
}

#[derive(Debug, Deserialize)]
struct OrderEntry {
    #[serde(rename = "orderId")]
    order_id: String,
    #[serde(rename = "orderLinkId", default)]
    order_link_id: String,
    symbol: String,
    side: String,
    #[serde(rename = "orderType")]
    order_type: String,
    qty: String,
    #[serde(rename = "cumExecQty", default)]
    cum_exec_qty: String,
    #[serde(default)]
    price: String,
    #[serde(rename = "orderStatus")]
    order_status: String,
    #[serde(rename = "createdTime", default)]
    created_time: String,
}

#[derive(Debug, Deserialize)]
struct PositionList {
    list: Vec<PositionEntry>,
}

#[derive(Debug, Deserialize)]
struct PositionEntry {
    symbol: String,
    side: String,
    size: String,
    #[serde(rename = "avgPrice", default)]
    avg_price: String,
    #[serde(default)]
    leverage: String,
}

#[derive(Debug, Deserialize)]
struct WalletList {
    list: Vec<WalletEntry>,
}

#[derive(Debug, Deserialize)]
struct WalletEntry {
    #[serde(rename = "totalEquity")]
    total_equity: String,
}

#[derive(Debug, Deserialize)]
struct InstrumentList {
    list: Vec<InstrumentEntry>,
}

#[derive(Debug, Deserialize)]
struct InstrumentEntry {
    #[serde(rename = "lotSizeFilter")]
    lot_size_filter: LotSizeFilter,
    #[serde(rename = "priceFilter")]
    price_filter: PriceFilter,
}

#[derive(Debug, Deserialize)]
struct LotSizeFilter {
    #[serde(rename = "qtyStep")]
    qty_step: String,
}

#[derive(Debug, Deserialize)]
struct PriceFilter {
    #[serde(rename = "tickSize")]
    tick_size: String,
}

impl OrderEntry {
    fn into_order(self) -> Option<Order> {
        Some(Order {
            order_id: self.order_id,
            client_order_id: self.order_link_id,
            symbol: self.symbol,
            side: OrderSide::from_str(&self.side).ok()?,
            order_type: match self.order_type.as_str() {
                "Limit" => OrderType::Limit,
                _ => OrderType::Market,
            },
            quantity: Decimal::from_str(&self.qty).ok()?,
            executed_qty: Decimal::from_str(&self.cum_exec_qty).unwrap_or(Decimal::ZERO),
            price: Decimal::from_str(&self.price).ok().filter(|p| *p > Decimal::ZERO),
            status: BybitAdapter::map_status(&self.order_status),
            exchange: Exchange::Bybit,
            strategy_name: String::new(),
            created_at: self.created_time.parse().unwrap_or(0),
        })
    }
}

#[async_trait]
impl ExchangeAdapter for BybitAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Bybit
    }

    async fn get_last_price(&self, symbol: &str, market_type: MarketType) -> Result<Decimal> {
        let body = self
            .signed_get(
                "/v5/market/tickers",
                &[
                    ("category", Self::category(market_type).to_string()),
                    ("symbol", symbol.to_string()),
                ],
            )
            .await?;
        let result: TickerList = unwrap_v5(&body, "tickers")?;
        let entry = result
            .list
            .first()
            .ok_or_else(|| ExchangeError::MalformedResponse {
                venue: "BYBIT".to_string(),
                excerpt: format!("tickers: empty list for {}", symbol),
            })?;
        Decimal::from_str(&entry.last_price)
            .with_context(|| format!("Bybit lastPrice unparseable: {}", entry.last_price))
    }

    async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
        market_type: MarketType,
    ) -> Result<Vec<Candle>> {
        let body = self
            .signed_get(
                "/v5/market/kline",
                &[
                    ("category", Self::category(market_type).to_string()),
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_bybit_code().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        let result: KlineList = unwrap_v5(&body, &interval.to_string())?;

        // Rows arrive newest-first as string arrays:
        // [startTime, open, high, low, close, volume, turnover].
        let mut candles: Vec<Candle> = result
            .list
            .into_iter()
            .filter_map(|row| {
                if row.len() < 6 {
                    debug!("Bybit kline row too short: {:?}", row);
                    return None;
                }
                let field = |i: usize| -> Option<Decimal> {
                    Decimal::from_str(row[i].as_str()?).ok()
                };
                Some(Candle {
                    symbol: symbol.to_string(),
                    open_time: row[0].as_str()?.parse().ok()?,
                    open: field(1)?,
                    high: field(2)?,
                    low: field(3)?,
                    close: field(4)?,
                    volume: field(5)?,
                })
            })
            .collect();
        candles.reverse();
        Ok(candles)
    }

    async fn get_wallet_equity(&self) -> Result<Decimal> {
        let body = self
            .signed_get(
                "/v5/account/wallet-balance",
                &[("accountType", "UNIFIED".to_string())],
            )
            .await?;
        let result: WalletList = unwrap_v5(&body, "wallet-balance")?;
        let entry = result
            .list
            .first()
            .ok_or_else(|| ExchangeError::MalformedResponse {
                venue: "BYBIT".to_string(),
                excerpt: "wallet-balance: empty list".to_string(),
            })?;
        Decimal::from_str(&entry.total_equity)
            .with_context(|| format!("Bybit totalEquity unparseable: {}", entry.total_equity))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        let client_order_id = format!("tp-{}", Uuid::new_v4().simple());
        let mut body = json!({
            "category": Self::category(request.market_type),
            "symbol": request.symbol,
            "side": match request.side { OrderSide::Buy => "Buy", OrderSide::Sell => "Sell" },
            "orderType": match request.order_type { OrderType::Market => "Market", OrderType::Limit => "Limit" },
            "qty": request.quantity.to_string(),
            "orderLinkId": client_order_id.as_str(),
        });
        if let Some(price) = request.price {
            body["price"] = json!(price.to_string());
            body["timeInForce"] = json!("GTC");
        }
        if let Some(sl) = request.stop_loss {
            // V5 supports a stop attached to the entry order.
            body["stopLoss"] = json!(sl.to_string());
        }

        let response = self.signed_post("/v5/order/create", body).await?;
        let ack: OrderAck = unwrap_v5(&response, "order-create")?;
        info!(
            "Bybit: order {} acknowledged for {} ({})",
            ack.order_id, request.symbol, request.strategy_name
        );

        Ok(Order {
            order_id: ack.order_id,
            client_order_id: if ack.order_link_id.is_empty() {
                client_order_id
            } else {
                ack.order_link_id
            },
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            executed_qty: Decimal::ZERO,
            price: request.price,
            status: OrderStatus::New,
            exchange: Exchange::Bybit,
            strategy_name: request.strategy_name.clone(),
            created_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<Order> {
        let body = json!({
            "category": "linear",
            "symbol": symbol,
            "orderId": order_id,
        });
        let response = self.signed_post("/v5/order/cancel", body).await?;
        let _ack: OrderAck = unwrap_v5(&response, "order-cancel")?;
        self.get_order(symbol, order_id).await
    }

    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<Order> {
        let body = self
            .signed_get(
                "/v5/order/realtime",
                &[
                    ("category", "linear".to_string()),
                    ("symbol", symbol.to_string()),
                    ("orderId", order_id.to_string()),
                ],
            )
            .await?;
        let result: OrderList = unwrap_v5(&body, "order-realtime")?;
        result
            .list
            .into_iter()
            .next()
            .and_then(OrderEntry::into_order)
            .ok_or_else(|| {
                ExchangeError::MalformedResponse {
                    venue: "BYBIT".to_string(),
                    excerpt: format!("order {} not found for {}", order_id, symbol),
                }
                .into()
            })
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        let mut params = vec![
            ("category", "linear".to_string()),
            ("settleCoin", "USDT".to_string()),
        ];
        if let Some(symbol) = symbol {
            params.push(("symbol", symbol.to_string()));
        }
        let body = self.signed_get("/v5/order/realtime", &params).await?;
        let result: OrderList = unwrap_v5(&body, "open-orders")?;
        Ok(result
            .list
            .into_iter()
            .filter_map(OrderEntry::into_order)
            .collect())
    }

    async fn get_positions(&self) -> Result<Vec<PositionUpdateData>> {
        let body = self
            .signed_get(
                "/v5/position/list",
                &[
                    ("category", "linear".to_string()),
                    ("settleCoin", "USDT".to_string()),
                ],
            )
            .await?;
        let result: PositionList = unwrap_v5(&body, "position-list")?;
        Ok(result
            .list
            .into_iter()
            .filter_map(|entry| {
                let size = Decimal::from_str(&entry.size).ok()?;
                if size <= Decimal::ZERO {
                    return None;
                }
                Some(PositionUpdateData::new(
                    &entry.symbol,
                    OrderSide::from_str(&entry.side).ok()?,
                    size,
                    Decimal::from_str(&entry.avg_price).ok()?,
                    entry.leverage.parse::<f64>().unwrap_or(1.0) as u32,
                    Exchange::Bybit,
                ))
            })
            .collect())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32, isolated: bool) -> Result<()> {
        let body = json!({
            "category": "linear",
            "symbol": symbol,
            "buyLeverage": leverage.to_string(),
            "sellLeverage": leverage.to_string(),
        });
        let response = self.signed_post("/v5/position/set-leverage", body).await?;
        unwrap_v5::<serde_json::Value>(&response, "set-leverage").map_err(|e| {
            debug!("Bybit set-leverage raw: {}", excerpt(&response));
            e
        })?;

        if isolated {
            let body = json!({
                "category": "linear",
                "symbol": symbol,
                "tradeMode": 1,
                "buyLeverage": leverage.to_string(),
                "sellLeverage": leverage.to_string(),
            });
            let response = self
                .signed_post("/v5/position/switch-isolated", body)
                .await?;
            unwrap_v5::<serde_json::Value>(&response, "switch-isolated")?;
        }
        Ok(())
    }

    async fn instrument_scales(&self, symbol: &str) -> Result<InstrumentScales> {
        let body = self
            .signed_get(
                "/v5/market/instruments-info",
                &[
                    ("category", "linear".to_string()),
                    ("symbol", symbol.to_string()),
                ],
            )
            .await?;
        let result: InstrumentList = unwrap_v5(&body, "instruments-info")?;
        let entry = result
            .list
            .first()
            .ok_or_else(|| ExchangeError::MalformedResponse {
                venue: "BYBIT".to_string(),
                excerpt: format!("instruments-info: unknown symbol {}", symbol),
            })?;
        Ok(InstrumentScales {
            qty_step: Decimal::from_str(&entry.lot_size_filter.qty_step)
                .context("Bybit qtyStep unparseable")?,
            price_tick: Decimal::from_str(&entry.price_filter.tick_size)
                .context("Bybit tickSize unparseable")?,
        })
    }
}
