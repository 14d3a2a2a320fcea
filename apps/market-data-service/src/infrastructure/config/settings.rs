//! Service Configuration Settings
//!
//! Configuration types for the market data service, loaded from environment
//! variables.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::domain::instruments::InstrumentCatalog;

/// Equities tracked when `EQUITY_SYMBOLS` is unset.
pub const DEFAULT_EQUITY_SYMBOLS: &[&str] = &["QQQ", "AAPL", "MSFT"];

/// Crypto pairs tracked when `CRYPTO_SYMBOLS` is unset.
pub const DEFAULT_CRYPTO_SYMBOLS: &[&str] = &["BTCUSDT", "ETHUSDT", "SOLUSDT"];

/// Equities venue API token.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Listen port for queries, health and metrics.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Snapshot store settings.
#[derive(Debug, Clone, Default)]
pub struct StoreSettings {
    /// Redis URL. `None` selects the in-memory store.
    pub redis_url: Option<String>,
}

/// Upstream venue endpoints.
#[derive(Debug, Clone)]
pub struct VenueSettings {
    /// Equities venue WebSocket base URL; the token is appended per symbol.
    /// Always carries a path (at least `/`).
    pub finnhub_ws_url: String,
    /// Crypto venue WebSocket URL.
    pub binance_ws_url: String,
}

impl Default for VenueSettings {
    fn default() -> Self {
        Self {
            finnhub_ws_url: "wss://ws.finnhub.io/".to_string(),
            binance_ws_url: "wss://stream.binance.com:9443/ws".to_string(),
        }
    }
}

/// Timers for supervision and connections.
#[derive(Debug, Clone)]
pub struct TimingSettings {
    /// Supervisor tick period.
    pub supervisor_tick: Duration,
    /// Crypto watchdog period.
    pub crypto_watchdog: Duration,
    /// Fixed delay before an adapter reconnects.
    pub reconnect_delay: Duration,
    /// Equities keep-alive ping period.
    pub keepalive_interval: Duration,
    /// Minimum spacing of crypto writes per symbol.
    pub crypto_throttle: Duration,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            supervisor_tick: Duration::from_secs(6),
            crypto_watchdog: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(30),
            crypto_throttle: Duration::from_secs(5),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Snapshot store settings.
    pub store: StoreSettings,
    /// Venue endpoints.
    pub venues: VenueSettings,
    /// Timers.
    pub timing: TimingSettings,
    /// Tracked instruments.
    pub catalog: InstrumentCatalog,
    /// Equities venue token per symbol.
    pub equity_credentials: HashMap<String, Credentials>,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an equities symbol has no API key or a venue URL
    /// is not a WebSocket URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if an equities symbol has no API key or a venue URL
    /// is not a WebSocket URL.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = ServerSettings {
            port: parse_var(&lookup, "PORT", ServerSettings::default().port),
        };

        let store = StoreSettings {
            redis_url: lookup("REDIS_URL").filter(|v| !v.trim().is_empty()),
        };

        let defaults = VenueSettings::default();
        let venues = VenueSettings {
            finnhub_ws_url: parse_ws_url(&lookup, "FINNHUB_WS_URL", &defaults.finnhub_ws_url)?,
            binance_ws_url: parse_ws_url(&lookup, "BINANCE_WS_URL", &defaults.binance_ws_url)?,
        };

        let defaults = TimingSettings::default();
        let timing = TimingSettings {
            supervisor_tick: parse_var_secs(&lookup, "SUPERVISOR_TICK_SECS", defaults.supervisor_tick),
            crypto_watchdog: parse_var_secs(&lookup, "CRYPTO_WATCHDOG_SECS", defaults.crypto_watchdog),
            reconnect_delay: parse_var_secs(&lookup, "RECONNECT_DELAY_SECS", defaults.reconnect_delay),
            keepalive_interval: parse_var_secs(
                &lookup,
                "KEEPALIVE_INTERVAL_SECS",
                defaults.keepalive_interval,
            ),
            crypto_throttle: parse_var_secs(&lookup, "CRYPTO_THROTTLE_SECS", defaults.crypto_throttle),
        };

        let catalog = InstrumentCatalog::new(
            parse_symbols(lookup("EQUITY_SYMBOLS"), DEFAULT_EQUITY_SYMBOLS),
            parse_symbols(lookup("CRYPTO_SYMBOLS"), DEFAULT_CRYPTO_SYMBOLS),
        );

        let fallback_key = lookup("FINNHUB_API_KEY").filter(|v| !v.is_empty());
        let mut equity_credentials = HashMap::new();
        for symbol in catalog.equities() {
            let var = format!("FINNHUB_{symbol}_API_KEY");
            let api_key = match lookup(&var) {
                Some(key) if key.is_empty() => return Err(ConfigError::EmptyValue(var)),
                Some(key) => key,
                None => fallback_key.clone().ok_or(ConfigError::MissingEnvVar(var))?,
            };
            equity_credentials.insert(symbol.clone(), Credentials::new(api_key));
        }

        Ok(Self {
            server,
            store,
            venues,
            timing,
            catalog,
            equity_credentials,
        })
    }

    /// Equities venue URL for `symbol`, token included as a query pair.
    #[must_use]
    pub fn finnhub_url(&self, symbol: &str) -> Option<String> {
        let creds = self.equity_credentials.get(symbol)?;
        let mut url = Url::parse(&self.venues.finnhub_ws_url).ok()?;
        url.query_pairs_mut().append_pair("token", creds.api_key());
        Some(url.into())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable is not a usable WebSocket URL.
    #[error("environment variable {var} is not a WebSocket URL: {reason}")]
    InvalidUrl {
        /// Variable name.
        var: String,
        /// Parse failure or rejected scheme.
        reason: String,
    },
}

/// Parse a `ws://` or `wss://` URL. The serialized form always has a path,
/// so a request target can be derived from it.
fn parse_ws_url<F>(lookup: &F, key: &str, default: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).filter(|v| !v.trim().is_empty());
    let value = raw.as_deref().map_or(default, str::trim);
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        var: key.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ConfigError::InvalidUrl {
            var: key.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url.into())
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_var_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map_or(default, Duration::from_secs)
}

fn parse_symbols(value: Option<String>, default: &[&str]) -> Vec<String> {
    value.filter(|v| !v.trim().is_empty()).map_or_else(
        || default.iter().map(ToString::to_string).collect(),
        |v| v.split(',').map(str::to_string).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_with_shared_key() {
        let config = ServiceConfig::from_lookup(lookup_from(&[("FINNHUB_API_KEY", "shared")])).unwrap();

        assert_eq!(config.server.port, 8080);
        assert!(config.store.redis_url.is_none());
        assert_eq!(config.catalog.equities(), ["QQQ", "AAPL", "MSFT"]);
        assert_eq!(config.catalog.crypto(), ["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
        assert_eq!(config.timing.supervisor_tick, Duration::from_secs(6));
        assert_eq!(config.timing.crypto_throttle, Duration::from_secs(5));
        assert_eq!(
            config.finnhub_url("AAPL").as_deref(),
            Some("wss://ws.finnhub.io/?token=shared")
        );
    }

    #[test]
    fn per_symbol_key_wins() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("EQUITY_SYMBOLS", "aapl"),
            ("FINNHUB_API_KEY", "shared"),
            ("FINNHUB_AAPL_API_KEY", "mine"),
        ]))
        .unwrap();
        assert_eq!(config.equity_credentials["AAPL"].api_key(), "mine");
    }

    #[test]
    fn missing_key_is_error() {
        let err = ServiceConfig::from_lookup(lookup_from(&[("EQUITY_SYMBOLS", "TSLA")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(var) if var == "FINNHUB_TSLA_API_KEY"));
    }

    #[test]
    fn empty_key_is_error() {
        let err = ServiceConfig::from_lookup(lookup_from(&[
            ("EQUITY_SYMBOLS", "QQQ"),
            ("FINNHUB_QQQ_API_KEY", ""),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("PORT", "3001"),
            ("REDIS_URL", "redis://cache:6379"),
            ("BINANCE_WS_URL", "wss://example.test/ws"),
            ("CRYPTO_SYMBOLS", "btcusdt, dogeusdt"),
            ("EQUITY_SYMBOLS", ""),
            ("FINNHUB_API_KEY", "k"),
            ("SUPERVISOR_TICK_SECS", "2"),
            ("RECONNECT_DELAY_SECS", "not-a-number"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 3001);
        assert_eq!(config.store.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.venues.binance_ws_url, "wss://example.test/ws");
        assert_eq!(config.catalog.crypto(), ["BTCUSDT", "DOGEUSDT"]);
        assert_eq!(config.catalog.equities(), ["QQQ", "AAPL", "MSFT"]);
        assert_eq!(config.timing.supervisor_tick, Duration::from_secs(2));
        assert_eq!(config.timing.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn finnhub_url_always_has_a_request_path() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("EQUITY_SYMBOLS", "AAPL"),
            ("FINNHUB_API_KEY", "KEY"),
            ("FINNHUB_WS_URL", "ws://127.0.0.1:9000"),
        ]))
        .unwrap();

        let url = config.finnhub_url("AAPL").unwrap();
        assert_eq!(url, "ws://127.0.0.1:9000/?token=KEY");

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/");
        assert_eq!(parsed.query(), Some("token=KEY"));
    }

    #[test]
    fn finnhub_url_keeps_existing_query() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("EQUITY_SYMBOLS", "AAPL"),
            ("FINNHUB_API_KEY", "a b&c"),
            ("FINNHUB_WS_URL", "wss://feed.test/stream?format=json"),
        ]))
        .unwrap();

        assert_eq!(
            config.finnhub_url("AAPL").as_deref(),
            Some("wss://feed.test/stream?format=json&token=a+b%26c")
        );
        assert_eq!(config.finnhub_url("MSFT"), None);
    }

    #[test]
    fn non_websocket_venue_url_is_error() {
        let err = ServiceConfig::from_lookup(lookup_from(&[
            ("FINNHUB_API_KEY", "k"),
            ("BINANCE_WS_URL", "https://stream.test/ws"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { var, .. } if var == "BINANCE_WS_URL"));

        let err = ServiceConfig::from_lookup(lookup_from(&[
            ("FINNHUB_API_KEY", "k"),
            ("FINNHUB_WS_URL", "not a url"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { var, .. } if var == "FINNHUB_WS_URL"));
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("key123".to_string());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("key123"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn timing_defaults() {
        let timing = TimingSettings::default();
        assert_eq!(timing.crypto_watchdog, Duration::from_secs(30));
        assert_eq!(timing.keepalive_interval, Duration::from_secs(30));
        assert_eq!(timing.reconnect_delay, Duration::from_secs(5));
    }
}
