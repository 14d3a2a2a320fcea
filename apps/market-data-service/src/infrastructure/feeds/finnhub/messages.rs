//! Equities Venue Messages
//!
//! JSON messages exchanged with the equities trade stream.
//!
//! Outbound:
//! - `{"type":"subscribe","symbol":"AAPL"}`
//! - `{"type":"ping"}`
//!
//! Inbound:
//! - `{"type":"trade","data":[{"p":187.1,"t":1741791600123,"s":"AAPL","v":100}, ...]}`
//! - `{"type":"ping"}`
//! - `{"type":"error","msg":"..."}`

use serde::{Deserialize, Serialize};

use crate::domain::quote::TradePrint;

/// Outbound control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FinnhubRequest {
    /// Subscribe to trades for one symbol.
    Subscribe {
        /// Ticker.
        symbol: String,
    },
    /// Keep-alive ping.
    Ping,
}

/// One trade inside a `trade` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FinnhubTrade {
    /// Trade price.
    #[serde(rename = "p")]
    pub price: f64,
    /// Trade time, Unix milliseconds.
    #[serde(rename = "t")]
    pub timestamp: i64,
    /// Ticker, if the venue included it.
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,
    /// Trade volume.
    #[serde(rename = "v", default)]
    pub volume: Option<f64>,
}

impl From<&FinnhubTrade> for TradePrint {
    fn from(trade: &FinnhubTrade) -> Self {
        Self {
            price: trade.price,
            timestamp: trade.timestamp,
        }
    }
}

/// Inbound message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FinnhubMessage {
    /// Batch of trades; only the last one is used.
    Trade {
        /// Trades in venue order.
        #[serde(default)]
        data: Vec<FinnhubTrade>,
    },
    /// Venue keep-alive.
    Ping,
    /// Venue-reported error.
    Error {
        /// Error text.
        #[serde(default)]
        msg: String,
    },
    /// Any other message type.
    #[serde(other)]
    Other,
}

impl FinnhubMessage {
    /// Last trade print of a non-empty `trade` message.
    #[must_use]
    pub fn last_trade(&self) -> Option<TradePrint> {
        match self {
            Self::Trade { data } => data.last().map(TradePrint::from),
            _ => None,
        }
    }
}
