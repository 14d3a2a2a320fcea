//! Venue Codec
//!
//! JSON decoding of inbound venue frames and encoding of outbound control
//! messages. Decoding never panics; anything malformed is a [`CodecError`]
//! that the socket loop logs and drops.

use serde::Serialize;

use super::binance::messages::{BinanceMessage, TICKER_EVENT, TickerEvent};
use super::finnhub::messages::FinnhubMessage;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is not a JSON object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec shared by both venues.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode an outbound control message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode<T: Serialize>(&self, message: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }

    /// Decode an equities venue frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object or a known field
    /// has the wrong shape.
    pub fn decode_finnhub(&self, text: &str) -> Result<FinnhubMessage, CodecError> {
        let trimmed = expect_object(text)?;
        Ok(serde_json::from_str(trimmed)?)
    }

    /// Decode a crypto venue frame.
    ///
    /// Combined-stream envelopes (`{"stream":..,"data":{..}}`) are unwrapped.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object or a ticker has
    /// malformed fields.
    pub fn decode_binance(&self, text: &str) -> Result<BinanceMessage, CodecError> {
        let trimmed = expect_object(text)?;
        let mut value: serde_json::Value = serde_json::from_str(trimmed)?;

        if value.get("stream").is_some() && value.get("data").is_some() {
            value = value["data"].take();
        }

        let event = value
            .get("e")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        if let Some(event) = event {
            if event == TICKER_EVENT {
                let ticker: TickerEvent = serde_json::from_value(value)?;
                return Ok(BinanceMessage::Ticker(ticker));
            }
            return Ok(BinanceMessage::Other(event));
        }

        if value.get("result").is_some() {
            return Ok(BinanceMessage::Ack {
                id: value.get("id").and_then(serde_json::Value::as_u64),
            });
        }

        if let Some(code) = value.get("code").and_then(serde_json::Value::as_i64) {
            let msg = value
                .get("msg")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(BinanceMessage::Error { code, msg });
        }

        Ok(BinanceMessage::Other("unknown".to_string()))
    }
}

fn expect_object(text: &str) -> Result<&str, CodecError> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        Ok(trimmed)
    } else {
        let preview: String = trimmed.chars().take(50).collect();
        Err(CodecError::InvalidFormat(format!(
            "expected JSON object, got: {preview}"
        )))
    }
}
