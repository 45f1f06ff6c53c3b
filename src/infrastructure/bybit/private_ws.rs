//! Bybit private WebSocket client feeding the position cache.
//!
//! Connection lifecycle: connect, authenticate with an HMAC over
//! `GET/realtime{expires}`, subscribe to the `position` topic, then pump
//! messages with a 20-second application ping. Any failure tears the
//! connection down and reconnects with exponential backoff starting at
//! 10 seconds. The ping lives inside the single connection loop, so a
//! reconnect can never leave a duplicate ping task behind.

use super::common::sign_ws_auth;
use crate::application::positions::PositionCache;
use crate::config::BybitConfig;
use crate::domain::trading::types::{Exchange, OrderSide};
use crate::domain::trading::PositionUpdateData;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::{self, Duration};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

const PING_INTERVAL_SECS: u64 = 20;
/// Reconnect backoff starts here and doubles up to the max.
const INITIAL_RECONNECT_SECS: u64 = 10;
const MAX_RECONNECT_SECS: u64 = 120;
/// Missing every pong across two ping periods means the link is dead.
const PONG_GRACE: Duration = Duration::from_secs(PING_INTERVAL_SECS * 2 + 5);

pub struct BybitPrivateStream {
    config: BybitConfig,
    position_cache: Arc<PositionCache>,
}

#[derive(Debug, Deserialize)]
struct WsEnvelope {
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default, rename = "ret_msg")]
    ret_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsPosition {
    symbol: String,
    side: String,
    size: String,
    #[serde(rename = "entryPrice", default)]
    entry_price: String,
    #[serde(default)]
    leverage: String,
}

impl BybitPrivateStream {
    pub fn new(config: BybitConfig, position_cache: Arc<PositionCache>) -> Self {
        Self {
            config,
            position_cache,
        }
    }

    /// Spawn the long-lived connection task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = INITIAL_RECONNECT_SECS;
            loop {
                match self.run_connection().await {
                    Ok(()) => {
                        info!("BybitPrivateStream: connection closed, reconnecting");
                        backoff = INITIAL_RECONNECT_SECS;
                    }
                    Err(e) => {
                        error!(
                            "BybitPrivateStream: {:#}; reconnecting in {}s",
                            e, backoff
                        );
                    }
                }
                time::sleep(Duration::from_secs(backoff)).await;
                backoff = (backoff * 2).min(MAX_RECONNECT_SECS);
            }
        })
    }

    async fn run_connection(&self) -> Result<()> {
        let (ws_stream, _) = connect_async(&self.config.private_ws_url)
            .await
            .context("Failed to connect to Bybit private WebSocket")?;
        info!("BybitPrivateStream: connected");

        let (mut write, mut read) = ws_stream.split();

        // Authenticate, then subscribe once the venue confirms.
        let expires = chrono::Utc::now().timestamp_millis() + 10_000;
        let auth = json!({
            "op": "auth",
            "args": [
                self.config.api_key,
                expires,
                sign_ws_auth(&self.config.api_secret, expires),
            ],
        });
        write
            .send(Message::Text(auth.to_string().into()))
            .await
            .context("Failed to send auth frame")?;

        let mut ping_interval = time::interval(Duration::from_secs(PING_INTERVAL_SECS));
        ping_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut last_pong = time::Instant::now();
        let mut authenticated = false;

        loop {
            tokio::select! {
                message = read.next() => {
                    let Some(message) = message else {
                        return Ok(());
                    };
                    match message.context("Bybit private WebSocket read error")? {
                        Message::Text(text) => {
                            self.handle_text(&text, &mut write, &mut authenticated, &mut last_pong)
                                .await?;
                        }
                        Message::Ping(payload) => {
                            write.send(Message::Pong(payload)).await.ok();
                        }
                        Message::Pong(_) => {
                            last_pong = time::Instant::now();
                        }
                        Message::Close(frame) => {
                            info!("BybitPrivateStream: server close: {:?}", frame);
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                _ = ping_interval.tick() => {
                    if last_pong.elapsed() > PONG_GRACE {
                        anyhow::bail!("pong overdue by {:?}, forcing reconnect", last_pong.elapsed());
                    }
                    let ping = json!({
                        "op": "ping",
                        "req_id": format!("pid_{}", chrono::Utc::now().timestamp_millis()),
                    });
                    write
                        .send(Message::Text(ping.to_string().into()))
                        .await
                        .context("Failed to send ping frame")?;
                }
            }
        }
    }

    async fn handle_text<S>(
        &self,
        text: &str,
        write: &mut S,
        authenticated: &mut bool,
        last_pong: &mut time::Instant,
    ) -> Result<()>
    where
        S: SinkExt<Message> + Unpin + Send,
        <S as futures_util::Sink<Message>>::Error:
            std::error::Error + Send + Sync + 'static,
    {
        let envelope: WsEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(_) => {
                warn!(
                    "BybitPrivateStream: unparseable frame: {}",
                    text.chars().take(160).collect::<String>()
                );
                return Ok(());
            }
        };

        match envelope.op.as_deref() {
            Some("auth") => {
                if envelope.success == Some(true) {
                    info!("BybitPrivateStream: authenticated, subscribing to position");
                    *authenticated = true;
                    let subscribe = json!({ "op": "subscribe", "args": ["position"] });
                    write
                        .send(Message::Text(subscribe.to_string().into()))
                        .await
                        .context("Failed to send subscribe frame")?;
                } else {
                    // Surface as an error so the reconnect loop retries the
                    // whole handshake after the backoff delay.
                    anyhow::bail!(
                        "auth rejected: {}",
                        envelope.ret_msg.unwrap_or_default()
                    );
                }
            }
            Some("subscribe") => {
                if envelope.success == Some(true) {
                    info!("BybitPrivateStream: position topic subscribed");
                } else {
                    warn!(
                        "BybitPrivateStream: subscribe refused: {}",
                        envelope.ret_msg.unwrap_or_default()
                    );
                }
            }
            Some("pong") => {
                *last_pong = time::Instant::now();
            }
            Some("ping") => {
                // Server-initiated ping is acknowledged with a pong frame.
                let pong = json!({
                    "op": "pong",
                    "timestamp_e6": chrono::Utc::now().timestamp_micros(),
                });
                write
                    .send(Message::Text(pong.to_string().into()))
                    .await
                    .context("Failed to answer server ping")?;
            }
            _ => {
                if envelope.topic.as_deref() == Some("position") {
                    if !*authenticated {
                        warn!("BybitPrivateStream: position frame before auth ack, dropping");
                        return Ok(());
                    }
                    if let Some(data) = envelope.data {
                        self.apply_position_data(data).await;
                    }
                } else {
                    debug!("BybitPrivateStream: ignoring frame: {:?}", envelope.op);
                }
            }
        }
        Ok(())
    }

    async fn apply_position_data(&self, data: serde_json::Value) {
        let entries: Vec<WsPosition> = match serde_json::from_value(data) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("BybitPrivateStream: position payload unparseable: {}", e);
                return;
            }
        };

        for entry in entries {
            let size = Decimal::from_str(&entry.size).unwrap_or(Decimal::ZERO);
            let side = OrderSide::from_str(&entry.side).unwrap_or(OrderSide::Buy);
            let update = PositionUpdateData {
                symbol: entry.symbol.clone(),
                side,
                size,
                entry_price: Decimal::from_str(&entry.entry_price).unwrap_or(Decimal::ZERO),
                leverage: entry.leverage.parse::<f64>().unwrap_or(1.0) as u32,
                exchange: Exchange::Bybit,
                strategy_stop_loss: None,
                pt1_taken: false,
                secure_profit_sl_applied: false,
                updated_at: chrono::Utc::now().timestamp_millis(),
            };
            self.position_cache.apply_venue_update(update).await;
        }
    }
}
