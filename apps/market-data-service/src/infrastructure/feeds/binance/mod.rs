//! Crypto Venue Adapter
//!
//! One shared ticker socket for all tracked crypto pairs.

mod client;
pub mod messages;

pub use client::{BinanceClient, BinanceClientConfig, BinanceClientError, BinanceHandle};
