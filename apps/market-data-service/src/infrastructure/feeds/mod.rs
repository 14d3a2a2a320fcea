//! Venue Feed Adapters
//!
//! WebSocket connections to the upstream market data venues:
//!
//! - `finnhub`: per-symbol equities trade sockets
//! - `binance`: one shared crypto ticker socket
//!
//! Both follow the same loop: connect, subscribe, then `select!` over the
//! socket, keep-alive timer, and cancellation. Disconnects are retried after
//! a fixed delay.

pub mod binance;
pub mod codec;
pub mod finnhub;
pub mod keepalive;
pub mod reconnect;
mod registry;
mod state;

pub use binance::{BinanceClient, BinanceClientConfig, BinanceClientError, BinanceHandle};
pub use codec::{CodecError, JsonCodec};
pub use finnhub::{FinnhubClient, FinnhubClientConfig, FinnhubClientError, FinnhubTradeDecoder};
pub use keepalive::{KeepAliveEvent, KeepAliveManager};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use registry::ConnectionRegistry;
pub use state::{FeedSnapshot, FeedState};
