//! Bybit V5 request signing and response envelope handling.

use crate::domain::errors::ExchangeError;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// V5 REST signature: HMAC-SHA256 over
/// `timestamp + api_key + recv_window + payload`, hex-encoded. The payload
/// is the query string for GETs and the JSON body for POSTs.
pub fn sign_v5(secret: &str, timestamp_ms: i64, api_key: &str, recv_window: u64, payload: &str) -> String {
    let canonical = format!("{}{}{}{}", timestamp_ms, api_key, recv_window, payload);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Private WebSocket auth signature: HMAC-SHA256 over
/// `"GET/realtime" + expires_ms`.
pub fn sign_ws_auth(secret: &str, expires_ms: i64) -> String {
    let canonical = format!("GET/realtime{}", expires_ms);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Standard V5 response envelope.
#[derive(Debug, Deserialize)]
pub struct V5Response<T> {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    pub result: Option<T>,
}

/// Venue code Bybit uses for an unsupported kline interval.
pub const INVALID_INTERVAL_CODE: i64 = -1121;

/// Unwrap a V5 envelope into its result, mapping venue error codes.
pub fn unwrap_v5<T: DeserializeOwned>(
    body: &str,
    context: &str,
) -> Result<T, ExchangeError> {
    let envelope: V5Response<T> =
        serde_json::from_str(body).map_err(|_| ExchangeError::MalformedResponse {
            venue: "BYBIT".to_string(),
            excerpt: excerpt(body),
        })?;

    if envelope.ret_code == INVALID_INTERVAL_CODE {
        return Err(ExchangeError::InvalidInterval {
            venue: "BYBIT".to_string(),
            interval: context.to_string(),
            code: envelope.ret_code,
        });
    }
    if envelope.ret_code != 0 {
        return Err(ExchangeError::RequestFailed {
            venue: "BYBIT".to_string(),
            reason: format!("{} ({}): {}", context, envelope.ret_code, envelope.ret_msg),
        });
    }
    envelope.result.ok_or_else(|| ExchangeError::MalformedResponse {
        venue: "BYBIT".to_string(),
        excerpt: format!("{}: empty result", context),
    })
}

pub fn excerpt(body: &str) -> String {
    body.chars().take(160).collect()
}
