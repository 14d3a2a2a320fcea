//! Connection Supervisor
//!
//! Periodic control loop over the equities connections, driven by the
//! market calendar and edge-detected on a single `was_open` flag:
//!
//! ```text
//!                 closed -> open: start all sockets
//!   CLOSED_IDLE ─────────────────────────────────► OPENING
//!        ▲                                            │
//!        │                                            ▼
//!     CLOSING ◄──────────────────────────────── OPEN_STEADY
//!   freeze lastClose,   open -> closed     reconcile stale quotes
//!   close all sockets                      from the last raw trade
//! ```
//!
//! A separate watchdog checks crypto freshness and forces a reconnect of the
//! shared crypto socket when any tracked pair goes stale.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    CryptoConnection, EquitiesConnections, SharedStore, StoreError, TradeDecoder,
};
use crate::application::services::EquitiesIngest;
use crate::domain::calendar::MarketCalendar;
use crate::domain::instruments::{InstrumentCatalog, keys};
use crate::domain::quote::{LastClose, last_update_of, status_to_fields};
use crate::infrastructure::metrics::{self, RecordKind};

// =============================================================================
// Configuration
// =============================================================================

/// Supervisor timing.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Period of the equities state machine.
    pub tick_interval: Duration,
    /// A record written more recently than this is not reconciled.
    pub fresh_window: Duration,
    /// A raw trade older than this is not re-applied.
    pub max_trade_age: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(6),
            fresh_window: Duration::from_secs(30),
            max_trade_age: Duration::from_secs(120),
        }
    }
}

/// Errors that abort a supervisor tick.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Phase taken by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Closed, was closed.
    ClosedIdle,
    /// Closed to open.
    Opening,
    /// Open, was open.
    OpenSteady,
    /// Open to closed.
    Closing,
}

impl Phase {
    /// Derive the phase from the previous and current open flags.
    #[must_use]
    pub const fn from_edge(was_open: bool, is_open: bool) -> Self {
        match (was_open, is_open) {
            (false, false) => Self::ClosedIdle,
            (false, true) => Self::Opening,
            (true, true) => Self::OpenSteady,
            (true, false) => Self::Closing,
        }
    }

    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClosedIdle => "closed_idle",
            Self::Opening => "opening",
            Self::OpenSteady => "open_steady",
            Self::Closing => "closing",
        }
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Equities connection supervisor.
pub struct Supervisor {
    store: SharedStore,
    catalog: InstrumentCatalog,
    calendar: MarketCalendar,
    connections: Arc<dyn EquitiesConnections>,
    decoder: Arc<dyn TradeDecoder>,
    ingest: EquitiesIngest,
    config: SupervisorConfig,
    was_open: bool,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("catalog", &self.catalog)
            .field("config", &self.config)
            .field("was_open", &self.was_open)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Create a supervisor. It starts in the closed state, so the first tick
    /// during market hours opens all connections.
    #[must_use]
    pub fn new(
        store: SharedStore,
        catalog: InstrumentCatalog,
        calendar: MarketCalendar,
        connections: Arc<dyn EquitiesConnections>,
        decoder: Arc<dyn TradeDecoder>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            ingest: EquitiesIngest::new(Arc::clone(&store)),
            store,
            catalog,
            calendar,
            connections,
            decoder,
            config,
            was_open: false,
        }
    }

    /// Open flag as of the last completed tick.
    #[must_use]
    pub const fn was_open(&self) -> bool {
        self.was_open
    }

    /// Run one tick at `now`.
    ///
    /// `was_open` only advances once the tick's transition has completed, so
    /// a failed tick is retried in full on the next one.
    ///
    /// # Errors
    ///
    /// Returns an error if the status write or the last-close freeze fails.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<Phase, SupervisorError> {
        let status = self.calendar.status_at(now);

        let started = Instant::now();
        self.store
            .set_fields(keys::MARKET_STATUS, &status_to_fields(&status, now))
            .await
            .inspect_err(|_| metrics::record_store_error(RecordKind::MarketStatus))?;
        metrics::record_store_write(RecordKind::MarketStatus, started.elapsed());

        let phase = Phase::from_edge(self.was_open, status.is_open);
        match phase {
            Phase::Opening => {
                tracing::info!("Market opened, starting equities connections");
                self.connections.start_all().await;
            }
            Phase::OpenSteady => {
                let refreshed = self.reconcile(now).await;
                if refreshed > 0 {
                    tracing::debug!(refreshed, "Reconciled stale equities quotes");
                }
            }
            Phase::Closing => {
                tracing::info!(reason = %status.reason, "Market closed, freezing last prices");
                let frozen = self.store_last_close(now).await?;
                tracing::info!(frozen, "Stored closing data, closing equities connections");
                self.connections.close_all().await;
            }
            Phase::ClosedIdle => {}
        }

        self.was_open = status.is_open;
        Ok(phase)
    }

    /// Re-derive quotes for live symbols whose record has gone stale, using
    /// the last raw trade if it is recent enough. Per-symbol failures are
    /// logged and skipped. Returns the number of records refreshed.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> usize {
        let mut refreshed = 0;

        for symbol in self.catalog.equities() {
            if !self.connections.is_live(symbol) {
                tracing::debug!(symbol = %symbol, "No connection, skipping reconciliation");
                continue;
            }

            match self.reconcile_symbol(symbol, now).await {
                Ok(true) => refreshed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Reconciliation failed");
                }
            }
        }

        refreshed
    }

    async fn reconcile_symbol(&self, symbol: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let current = self.store.get_fields(&keys::market_current(symbol)).await?;
        let fresh = last_update_of(&current)
            .is_some_and(|last| is_within(now, last.timestamp_millis(), self.config.fresh_window));
        if fresh {
            return Ok(false);
        }

        let Some(raw) = self.store.get(&keys::trades_latest(symbol)).await? else {
            tracing::debug!(symbol = %symbol, "No recent trade data");
            return Ok(false);
        };

        let Some(trade) = self.decoder.last_trade(&raw) else {
            return Ok(false);
        };

        if !is_within(now, trade.timestamp, self.config.max_trade_age) {
            return Ok(false);
        }

        self.ingest.apply_trade(symbol, trade, now).await?;
        Ok(true)
    }

    /// Copy each symbol's current price and day range into its `lastClose`
    /// record. Symbols without a current price are skipped. Returns the
    /// number of records written.
    ///
    /// # Errors
    ///
    /// Returns the first store error; remaining symbols are not attempted.
    pub async fn store_last_close(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut written = 0;

        for symbol in self.catalog.equities() {
            let current = self.store.get_fields(&keys::market_current(symbol)).await?;
            let Some(close) = LastClose::from_current(&current, now) else {
                continue;
            };

            let started = Instant::now();
            self.store
                .set_fields(&keys::market_last_close(symbol), &close.to_fields())
                .await
                .inspect_err(|_| metrics::record_store_error(RecordKind::LastClose))?;
            metrics::record_store_write(RecordKind::LastClose, started.elapsed());

            tracing::info!(symbol = %symbol, close = close.close_price, "Stored closing data");
            written += 1;
        }

        Ok(written)
    }

    /// Run the tick loop until `cancel` fires, then close all equities
    /// connections.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            tick_secs = self.config.tick_interval.as_secs(),
            equities = self.catalog.equities().len(),
            "Supervisor started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(phase) => metrics::record_supervisor_tick(phase.as_str()),
                        Err(e) => {
                            metrics::record_supervisor_tick_error();
                            tracing::error!(error = %e, "Supervisor tick failed, skipping");
                        }
                    }
                }
            }
        }

        self.connections.close_all().await;
        tracing::info!("Supervisor stopped");
    }
}

// =============================================================================
// Crypto Watchdog
// =============================================================================

/// Crypto liveness watchdog.
pub struct CryptoWatchdog {
    store: SharedStore,
    symbols: Vec<String>,
    connection: Arc<dyn CryptoConnection>,
    interval: Duration,
    stale_after: Duration,
}

impl std::fmt::Debug for CryptoWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoWatchdog")
            .field("symbols", &self.symbols)
            .field("interval", &self.interval)
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}

impl CryptoWatchdog {
    /// Default check period.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

    /// Default staleness threshold.
    pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(120);

    /// Create a watchdog over the tracked crypto pairs.
    #[must_use]
    pub fn new(
        store: SharedStore,
        catalog: &InstrumentCatalog,
        connection: Arc<dyn CryptoConnection>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            symbols: catalog.crypto().to_vec(),
            connection,
            interval,
            stale_after: Self::DEFAULT_STALE_AFTER,
        }
    }

    /// Check freshness at `now`. Forces at most one reconnect per check.
    /// Returns whether a reconnect was requested.
    ///
    /// # Errors
    ///
    /// Returns the store error if a record cannot be read.
    pub async fn check(&self, now: DateTime<Utc>) -> Result<bool, StoreError> {
        for symbol in &self.symbols {
            let fields = self.store.get_fields(&keys::crypto_current(symbol)).await?;
            let fresh = last_update_of(&fields)
                .is_some_and(|last| is_within(now, last.timestamp_millis(), self.stale_after));

            if !fresh {
                tracing::warn!(symbol = %symbol, "No recent crypto data, forcing reconnect");
                metrics::record_watchdog_reconnect();
                self.connection.force_reconnect();
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run checks until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; give the socket a period to warm up.
        interval.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.check(Utc::now()).await {
                        tracing::warn!(error = %e, "Crypto watchdog check failed");
                    }
                }
            }
        }
    }
}

/// Whether a millisecond timestamp lies within `window` before `now`.
fn is_within(now: DateTime<Utc>, timestamp_ms: i64, window: Duration) -> bool {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    now.timestamp_millis().saturating_sub(timestamp_ms) <= window_ms
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::{Fields, MockSnapshotStore, SnapshotStore};
    use crate::domain::quote::{InstrumentQuote, TradePrint};
    use crate::infrastructure::store::MemoryStore;

    // Wednesday 2025-03-12: 15:00 UTC is 11:00 EDT, 20:00:30 UTC is 16:00:30 EDT.
    fn open_at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 12, 15, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
    }

    fn after_close() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 12, 20, 0, 30).unwrap()
    }

    struct FakeConnections {
        store: Arc<MemoryStore>,
        symbols: Vec<String>,
        live: Mutex<HashSet<String>>,
        starts: AtomicUsize,
        closes: AtomicUsize,
        last_close_seen_on_close: Mutex<Option<Fields>>,
    }

    impl FakeConnections {
        fn new(store: Arc<MemoryStore>, symbols: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                store,
                symbols: symbols.iter().map(ToString::to_string).collect(),
                live: Mutex::new(HashSet::new()),
                starts: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                last_close_seen_on_close: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl EquitiesConnections for FakeConnections {
        async fn start_all(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.live.lock().extend(self.symbols.iter().cloned());
        }

        async fn close_all(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            let seen = self.store.get_fields("market:AAPL:lastClose").await.unwrap();
            *self.last_close_seen_on_close.lock() = Some(seen);
            self.live.lock().clear();
        }

        fn is_live(&self, symbol: &str) -> bool {
            self.live.lock().contains(symbol)
        }
    }

    struct JsonPrintDecoder;

    impl TradeDecoder for JsonPrintDecoder {
        fn last_trade(&self, raw: &str) -> Option<TradePrint> {
            serde_json::from_str(raw).ok()
        }
    }

    #[derive(Default)]
    struct CountingCrypto {
        forced: AtomicUsize,
    }

    impl CryptoConnection for CountingCrypto {
        fn force_reconnect(&self) {
            self.forced.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn supervisor(store: Arc<MemoryStore>, connections: Arc<FakeConnections>) -> Supervisor {
        Supervisor::new(
            store,
            InstrumentCatalog::new(["AAPL", "MSFT"], ["BTCUSDT"]),
            MarketCalendar::us_equities(),
            connections,
            Arc::new(JsonPrintDecoder),
            SupervisorConfig::default(),
        )
    }

    async fn seed_quote(store: &MemoryStore, symbol: &str, price: f64, at: DateTime<Utc>) -> InstrumentQuote {
        let quote = InstrumentQuote::from_trade(
            symbol,
            &Fields::new(),
            TradePrint {
                price,
                timestamp: at.timestamp_millis(),
            },
            at,
        );
        store
            .set_fields(&keys::market_current(symbol), &quote.to_fields())
            .await
            .unwrap();
        quote
    }

    #[test]
    fn phase_edges() {
        assert_eq!(Phase::from_edge(false, false), Phase::ClosedIdle);
        assert_eq!(Phase::from_edge(false, true), Phase::Opening);
        assert_eq!(Phase::from_edge(true, true), Phase::OpenSteady);
        assert_eq!(Phase::from_edge(true, false), Phase::Closing);
    }

    #[tokio::test]
    async fn opening_starts_connections_once() {
        let store = Arc::new(MemoryStore::new());
        let connections = FakeConnections::new(store.clone(), &["AAPL", "MSFT"]);
        let mut supervisor = supervisor(store, connections.clone());

        assert_eq!(supervisor.tick(open_at(0)).await.unwrap(), Phase::Opening);
        assert_eq!(supervisor.tick(open_at(6)).await.unwrap(), Phase::OpenSteady);
        assert_eq!(supervisor.tick(open_at(12)).await.unwrap(), Phase::OpenSteady);

        assert_eq!(connections.starts.load(Ordering::SeqCst), 1);
        assert_eq!(connections.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn every_tick_writes_status() {
        let store = Arc::new(MemoryStore::new());
        let connections = FakeConnections::new(store.clone(), &[]);
        let mut supervisor = supervisor(store.clone(), connections);

        supervisor.tick(after_close()).await.unwrap();

        let status = store.get_fields("market:status").await.unwrap();
        assert_eq!(status["isOpen"], "false");
        assert_eq!(status["statusMessage"], "CLOSED");
        assert_eq!(status["reason"], "After-market hours");
        assert_eq!(status["lastChecked"], "2025-03-12T20:00:30.000Z");
    }

    #[tokio::test]
    async fn closing_freezes_last_price_before_closing_sockets() {
        let store = Arc::new(MemoryStore::new());
        let connections = FakeConnections::new(store.clone(), &["AAPL", "MSFT"]);
        let mut supervisor = supervisor(store.clone(), connections.clone());

        supervisor.tick(open_at(0)).await.unwrap();
        let first = seed_quote(&store, "AAPL", 150.0, open_at(1)).await;
        let final_quote = supervisor
            .ingest
            .apply_trade("AAPL", TradePrint { price: 152.0, timestamp: 2000 }, open_at(2))
            .await
            .unwrap();
        assert_eq!(first.previous_close, final_quote.previous_close);

        assert_eq!(supervisor.tick(after_close()).await.unwrap(), Phase::Closing);

        let last_close = store.get_fields("market:AAPL:lastClose").await.unwrap();
        assert_eq!(last_close["closePrice"], "152");
        assert_eq!(last_close["dayHigh"], "152");
        assert_eq!(last_close["dayLow"], "150");

        // The freeze was visible before the sockets were closed.
        let seen = connections.last_close_seen_on_close.lock().clone().unwrap();
        assert_eq!(seen, last_close);
        assert_eq!(connections.closes.load(Ordering::SeqCst), 1);
        assert!(!connections.is_live("AAPL"));

        // MSFT never traded, so no lastClose was written for it.
        assert!(store.get_fields("market:MSFT:lastClose").await.unwrap().is_empty());
        assert!(!supervisor.was_open());
    }

    #[tokio::test]
    async fn reconciliation_reapplies_recent_raw_trade() {
        let store = Arc::new(MemoryStore::new());
        let connections = FakeConnections::new(store.clone(), &["AAPL"]);
        let mut supervisor = supervisor(store.clone(), connections);
        supervisor.tick(open_at(0)).await.unwrap();

        seed_quote(&store, "AAPL", 150.0, open_at(0)).await;
        let now = open_at(60);
        let raw = format!(
            "{{\"p\":151.5,\"t\":{}}}",
            (now - chrono::Duration::seconds(10)).timestamp_millis()
        );
        store.set("trades:AAPL:latest", &raw).await.unwrap();

        assert_eq!(supervisor.reconcile(now).await, 1);
        let current = store.get_fields("market:AAPL:current").await.unwrap();
        assert_eq!(current["currentPrice"], "151.5");
        assert_eq!(current["lastUpdate"], "2025-03-12T15:01:00.000Z");
    }

    #[tokio::test]
    async fn reconciliation_skips_fresh_stale_and_offline() {
        let store = Arc::new(MemoryStore::new());
        let connections = FakeConnections::new(store.clone(), &["AAPL"]);
        let mut supervisor = supervisor(store.clone(), connections);
        supervisor.tick(open_at(0)).await.unwrap();

        // Fresh record: written 10 s ago.
        seed_quote(&store, "AAPL", 150.0, open_at(50)).await;
        store
            .set("trades:AAPL:latest", &format!("{{\"p\":1.0,\"t\":{}}}", open_at(59).timestamp_millis()))
            .await
            .unwrap();
        assert_eq!(supervisor.reconcile(open_at(60)).await, 0);

        // Stale record but the raw trade is older than 120 s.
        store
            .set("trades:AAPL:latest", &format!("{{\"p\":1.0,\"t\":{}}}", open_at(0).timestamp_millis()))
            .await
            .unwrap();
        assert_eq!(supervisor.reconcile(open_at(300)).await, 0);

        // MSFT has a recent raw trade but no live connection.
        seed_quote(&store, "MSFT", 400.0, open_at(0)).await;
        store
            .set("trades:MSFT:latest", &format!("{{\"p\":401.0,\"t\":{}}}", open_at(299).timestamp_millis()))
            .await
            .unwrap();
        assert_eq!(supervisor.reconcile(open_at(300)).await, 0);
        let msft = store.get_fields("market:MSFT:current").await.unwrap();
        assert_eq!(msft["currentPrice"], "400");
    }

    #[tokio::test]
    async fn failed_tick_does_not_advance_state() {
        let mut store = MockSnapshotStore::new();
        store
            .expect_set_fields()
            .returning(|_, _| Err(StoreError::Connection("down".to_string())));

        let memory = Arc::new(MemoryStore::new());
        let connections = FakeConnections::new(memory, &["AAPL"]);
        let mut supervisor = Supervisor::new(
            Arc::new(store),
            InstrumentCatalog::new(["AAPL"], Vec::<String>::new()),
            MarketCalendar::us_equities(),
            connections.clone(),
            Arc::new(JsonPrintDecoder),
            SupervisorConfig::default(),
        );

        assert!(supervisor.tick(open_at(0)).await.is_err());
        assert!(!supervisor.was_open());
        assert_eq!(connections.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn watchdog_forces_single_reconnect_when_stale() {
        let store = Arc::new(MemoryStore::new());
        let crypto = Arc::new(CountingCrypto::default());
        let catalog = InstrumentCatalog::new(Vec::<String>::new(), ["BTCUSDT", "ETHUSDT"]);
        let watchdog = CryptoWatchdog::new(
            store.clone(),
            &catalog,
            crypto.clone(),
            CryptoWatchdog::DEFAULT_INTERVAL,
        );

        // Nothing stored: both pairs stale, one reconnect.
        assert!(watchdog.check(open_at(0)).await.unwrap());
        assert_eq!(crypto.forced.load(Ordering::SeqCst), 1);

        for symbol in ["BTCUSDT", "ETHUSDT"] {
            let mut fields = Fields::new();
            fields.insert(
                "lastUpdate".to_string(),
                crate::domain::quote::format_instant(open_at(0)),
            );
            store
                .set_fields(&keys::crypto_current(symbol), &fields)
                .await
                .unwrap();
        }

        assert!(!watchdog.check(open_at(60)).await.unwrap());
        assert!(watchdog.check(open_at(121)).await.unwrap());
        assert_eq!(crypto.forced.load(Ordering::SeqCst), 2);
    }
}
