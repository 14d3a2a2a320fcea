//! Equities Venue Adapter
//!
//! Per-symbol trade sockets against the equities venue.

mod client;
pub mod messages;

pub use client::{FinnhubClient, FinnhubClientConfig, FinnhubClientError};

use crate::application::ports::TradeDecoder;
use crate::domain::quote::TradePrint;
use crate::infrastructure::feeds::codec::JsonCodec;

/// Decodes stored raw trade messages for reconciliation.
#[derive(Debug, Default, Clone, Copy)]
pub struct FinnhubTradeDecoder {
    codec: JsonCodec,
}

impl FinnhubTradeDecoder {
    /// Create a decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            codec: JsonCodec::new(),
        }
    }
}

impl TradeDecoder for FinnhubTradeDecoder {
    fn last_trade(&self, raw: &str) -> Option<TradePrint> {
        self.codec
            .decode_finnhub(raw)
            .ok()
            .and_then(|message| message.last_trade())
    }
}
