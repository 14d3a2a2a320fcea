//! Crypto Venue Messages
//!
//! JSON messages exchanged with the crypto ticker stream. Numeric ticker
//! values arrive as decimal strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::quote::CryptoQuote;

/// Event type of a 24h rolling-window ticker.
pub const TICKER_EVENT: &str = "24hrTicker";

/// Outbound `SUBSCRIBE` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
    /// Always `SUBSCRIBE`.
    pub method: &'static str,
    /// Stream names, e.g. `btcusdt@ticker`.
    pub params: Vec<String>,
    /// Request id echoed in the acknowledgement.
    pub id: u64,
}

impl SubscribeRequest {
    /// Ticker subscription for every symbol.
    #[must_use]
    pub fn tickers<S: AsRef<str>>(symbols: &[S], id: u64) -> Self {
        Self {
            method: "SUBSCRIBE",
            params: symbols
                .iter()
                .map(|s| format!("{}@ticker", s.as_ref().to_lowercase()))
                .collect(),
            id,
        }
    }
}

/// 24h rolling-window ticker event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickerEvent {
    /// Event type (`24hrTicker`).
    #[serde(rename = "e")]
    pub event_type: String,
    /// Event time, Unix milliseconds.
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    /// Trading pair.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Last price.
    #[serde(rename = "c", deserialize_with = "de_str_f64")]
    pub last_price: f64,
    /// Absolute 24h change.
    #[serde(rename = "p", deserialize_with = "de_str_f64")]
    pub price_change: f64,
    /// Percentage 24h change.
    #[serde(rename = "P", deserialize_with = "de_str_f64")]
    pub price_change_percent: f64,
    /// 24h high.
    #[serde(rename = "h", deserialize_with = "de_str_f64")]
    pub high: f64,
    /// 24h low.
    #[serde(rename = "l", deserialize_with = "de_str_f64")]
    pub low: f64,
    /// 24h base-asset volume.
    #[serde(rename = "v", deserialize_with = "de_str_f64")]
    pub volume: f64,
}

impl TickerEvent {
    /// Normalize into a stored quote written at `now`.
    #[must_use]
    pub fn to_quote(&self, now: DateTime<Utc>) -> CryptoQuote {
        CryptoQuote {
            symbol: self.symbol.to_uppercase(),
            current_price: self.last_price,
            change_24h: self.price_change,
            percent_change_24h: self.price_change_percent,
            high_24h: self.high,
            low_24h: self.low,
            volume_24h: self.volume,
            last_update: now,
        }
    }
}

/// Decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum BinanceMessage {
    /// Ticker update.
    Ticker(TickerEvent),
    /// Acknowledgement of a request.
    Ack {
        /// Echoed request id.
        id: Option<u64>,
    },
    /// Venue-reported error.
    Error {
        /// Error code.
        code: i64,
        /// Error text.
        msg: String,
    },
    /// Any other event type.
    Other(String),
}

/// Deserialize a number sent either as a JSON string or a JSON number.
///
/// # Errors
///
/// Returns an error if the value is neither, or the string is not numeric.
pub fn de_str_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(f64),
    }

    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
        StrOrNum::Num(n) => Ok(n),
    }
}
