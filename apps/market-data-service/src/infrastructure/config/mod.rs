//! Configuration Module
//!
//! Configuration loading for the market data service.

mod settings;

pub use settings::{
    ConfigError, Credentials, DEFAULT_CRYPTO_SYMBOLS, DEFAULT_EQUITY_SYMBOLS, ServerSettings,
    ServiceConfig, StoreSettings, TimingSettings, VenueSettings,
};
