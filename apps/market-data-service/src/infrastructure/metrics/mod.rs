//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Messages**: Venue messages received by kind
//! - **Store**: Snapshot writes, failures and write latency by record kind
//! - **Connections**: Live venue sockets and reconnects
//! - **Supervisor**: Ticks by phase, tick failures, watchdog reconnects
//!
//! # Integration
//!
//! Metrics are rendered at `/metrics` on the HTTP server.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling this again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Venue traffic
    describe_counter!(
        "market_data_messages_received_total",
        "Total messages received from upstream venues"
    );
    describe_counter!(
        "market_data_messages_dropped_total",
        "Total venue messages dropped as malformed or unexpected"
    );
    describe_counter!(
        "market_data_tickers_throttled_total",
        "Total crypto tickers skipped by the write throttle"
    );

    // Store
    describe_counter!(
        "market_data_store_writes_total",
        "Total snapshot store writes by record kind"
    );
    describe_counter!(
        "market_data_store_errors_total",
        "Total failed snapshot store operations by record kind"
    );
    describe_histogram!(
        "market_data_store_write_seconds",
        "Snapshot store write latency"
    );

    // Connections
    describe_gauge!(
        "market_data_venue_connections",
        "Number of open upstream WebSocket connections"
    );
    describe_counter!(
        "market_data_reconnects_total",
        "Total upstream reconnection attempts"
    );

    // Supervisor
    describe_counter!(
        "market_data_supervisor_ticks_total",
        "Total supervisor ticks by phase"
    );
    describe_counter!(
        "market_data_supervisor_tick_errors_total",
        "Total supervisor ticks skipped after an error"
    );
    describe_counter!(
        "market_data_watchdog_reconnects_total",
        "Total crypto reconnects forced by the liveness watchdog"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for upstream venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Venue {
    /// Equities trade stream.
    Finnhub,
    /// Crypto ticker stream.
    Binance,
}

impl Venue {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Finnhub => "finnhub",
            Self::Binance => "binance",
        }
    }
}

/// Metric labels for venue message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Equities trade batch.
    Trade,
    /// Venue keep-alive.
    Ping,
    /// Crypto 24h ticker.
    Ticker,
    /// Subscription acknowledgement.
    Ack,
}

impl MessageKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Ping => "ping",
            Self::Ticker => "ticker",
            Self::Ack => "ack",
        }
    }
}

/// Metric labels for stored record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// `market:<SYM>:current`.
    EquityQuote,
    /// `trades:<SYM>:latest`.
    RawTrade,
    /// `crypto:<SYM>:current`.
    CryptoQuote,
    /// `market:<SYM>:lastClose`.
    LastClose,
    /// `market:status`.
    MarketStatus,
}

impl RecordKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::EquityQuote => "equity_quote",
            Self::RawTrade => "raw_trade",
            Self::CryptoQuote => "crypto_quote",
            Self::LastClose => "last_close",
            Self::MarketStatus => "market_status",
        }
    }
}

/// Record a message received from a venue.
pub fn record_message_received(venue: Venue, kind: MessageKind) {
    counter!(
        "market_data_messages_received_total",
        "venue" => venue.as_str(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a dropped venue message.
pub fn record_message_dropped(venue: Venue) {
    counter!(
        "market_data_messages_dropped_total",
        "venue" => venue.as_str()
    )
    .increment(1);
}

/// Record a crypto ticker skipped by the throttle.
pub fn record_ticker_throttled() {
    counter!("market_data_tickers_throttled_total").increment(1);
}

/// Record a successful store write and its latency.
pub fn record_store_write(record: RecordKind, duration: Duration) {
    counter!(
        "market_data_store_writes_total",
        "record" => record.as_str()
    )
    .increment(1);
    histogram!(
        "market_data_store_write_seconds",
        "record" => record.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Record a failed store operation.
pub fn record_store_error(record: RecordKind) {
    counter!(
        "market_data_store_errors_total",
        "record" => record.as_str()
    )
    .increment(1);
}

/// Record a venue socket opening.
pub fn record_venue_connected(venue: Venue) {
    gauge!(
        "market_data_venue_connections",
        "venue" => venue.as_str()
    )
    .increment(1.0);
}

/// Record a venue socket closing.
pub fn record_venue_disconnected(venue: Venue) {
    gauge!(
        "market_data_venue_connections",
        "venue" => venue.as_str()
    )
    .decrement(1.0);
}

/// Record a reconnection attempt.
pub fn record_reconnect(venue: Venue) {
    counter!(
        "market_data_reconnects_total",
        "venue" => venue.as_str()
    )
    .increment(1);
}

/// Record a completed supervisor tick.
pub fn record_supervisor_tick(phase: &'static str) {
    counter!(
        "market_data_supervisor_ticks_total",
        "phase" => phase
    )
    .increment(1);
}

/// Record a supervisor tick skipped after an error.
pub fn record_supervisor_tick_error() {
    counter!("market_data_supervisor_tick_errors_total").increment(1);
}

/// Record a watchdog-forced crypto reconnect.
pub fn record_watchdog_reconnect() {
    counter!("market_data_watchdog_reconnects_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_as_str() {
        assert_eq!(Venue::Finnhub.as_str(), "finnhub");
        assert_eq!(Venue::Binance.as_str(), "binance");
    }

    #[test]
    fn record_kind_as_str() {
        assert_eq!(RecordKind::EquityQuote.as_str(), "equity_quote");
        assert_eq!(RecordKind::RawTrade.as_str(), "raw_trade");
        assert_eq!(RecordKind::CryptoQuote.as_str(), "crypto_quote");
        assert_eq!(RecordKind::LastClose.as_str(), "last_close");
        assert_eq!(RecordKind::MarketStatus.as_str(), "market_status");
    }

    #[test]
    fn message_kind_as_str() {
        assert_eq!(MessageKind::Trade.as_str(), "trade");
        assert_eq!(MessageKind::Ticker.as_str(), "ticker");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_message_received(Venue::Finnhub, MessageKind::Trade);
        record_store_write(RecordKind::EquityQuote, Duration::from_millis(1));
        record_venue_connected(Venue::Binance);
        record_venue_disconnected(Venue::Binance);
    }
}
