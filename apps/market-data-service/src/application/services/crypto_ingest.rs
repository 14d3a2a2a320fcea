//! Crypto Ingest
//!
//! Throttled writes of venue tickers into `crypto:<SYM>:current`. The venue
//! can push several tickers per second per pair; only one write per symbol
//! per throttle window reaches the store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::application::ports::{SharedStore, StoreError};
use crate::domain::instruments::keys;
use crate::domain::quote::CryptoQuote;
use crate::infrastructure::metrics::{self, RecordKind};

/// Default minimum spacing between accepted writes for one symbol.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_secs(5);

/// Per-symbol write throttle. Lives for the whole process.
#[derive(Debug)]
pub struct Throttle {
    window: Duration,
    last_accepted: Mutex<HashMap<String, Instant>>,
}

impl Throttle {
    /// Create a throttle with the given window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a write for `symbol` at `now` is allowed.
    #[must_use]
    pub fn is_due(&self, symbol: &str, now: Instant) -> bool {
        self.last_accepted
            .lock()
            .get(symbol)
            .is_none_or(|last| now.saturating_duration_since(*last) >= self.window)
    }

    /// Record an accepted write for `symbol` at `now`.
    pub fn mark(&self, symbol: &str, now: Instant) {
        self.last_accepted.lock().insert(symbol.to_string(), now);
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_WINDOW)
    }
}

/// Writes crypto quotes into the snapshot store through the throttle.
pub struct CryptoIngest {
    store: SharedStore,
    throttle: Throttle,
}

impl std::fmt::Debug for CryptoIngest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoIngest")
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

impl CryptoIngest {
    /// Create an ingest service over `store`.
    #[must_use]
    pub fn new(store: SharedStore, throttle: Throttle) -> Self {
        Self { store, throttle }
    }

    /// Handle one ticker. Returns `true` if it was written.
    ///
    /// The throttle is only advanced by successful writes, so a failed write
    /// lets the next ticker through.
    ///
    /// # Errors
    ///
    /// Returns the store error if the write fails.
    pub async fn handle_ticker(&self, quote: &CryptoQuote, now: Instant) -> Result<bool, StoreError> {
        if !self.throttle.is_due(&quote.symbol, now) {
            metrics::record_ticker_throttled();
            return Ok(false);
        }

        let started = Instant::now();
        self.store
            .set_fields(&keys::crypto_current(&quote.symbol), &quote.to_fields())
            .await
            .inspect_err(|_| metrics::record_store_error(RecordKind::CryptoQuote))?;
        metrics::record_store_write(RecordKind::CryptoQuote, started.elapsed());

        self.throttle.mark(&quote.symbol, now);
        tracing::debug!(symbol = %quote.symbol, price = quote.current_price, "Crypto quote updated");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::application::ports::{MockSnapshotStore, SnapshotStore};
    use crate::infrastructure::store::MemoryStore;

    fn ticker(symbol: &str, price: f64) -> CryptoQuote {
        CryptoQuote {
            symbol: symbol.to_string(),
            current_price: price,
            change_24h: 0.0,
            percent_change_24h: 0.0,
            high_24h: price,
            low_24h: price,
            volume_24h: 10.0,
            last_update: Utc::now(),
        }
    }

    #[test]
    fn throttle_window() {
        let throttle = Throttle::new(Duration::from_secs(5));
        let t0 = Instant::now();

        assert!(throttle.is_due("BTCUSDT", t0));
        throttle.mark("BTCUSDT", t0);
        assert!(!throttle.is_due("BTCUSDT", t0 + Duration::from_secs(1)));
        assert!(throttle.is_due("BTCUSDT", t0 + Duration::from_secs(5)));
        assert!(throttle.is_due("ETHUSDT", t0));
    }

    #[tokio::test]
    async fn one_second_apart_writes_once() {
        let store = Arc::new(MemoryStore::new());
        let ingest = CryptoIngest::new(store.clone(), Throttle::default());
        let t0 = Instant::now();

        assert!(ingest.handle_ticker(&ticker("BTCUSDT", 1.0), t0).await.unwrap());
        assert!(
            !ingest
                .handle_ticker(&ticker("BTCUSDT", 2.0), t0 + Duration::from_secs(1))
                .await
                .unwrap()
        );

        let stored = store.get_fields("crypto:BTCUSDT:current").await.unwrap();
        assert_eq!(stored["currentPrice"], "1");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn six_seconds_apart_writes_twice() {
        let store = Arc::new(MemoryStore::new());
        let ingest = CryptoIngest::new(store.clone(), Throttle::default());
        let t0 = Instant::now();

        assert!(ingest.handle_ticker(&ticker("ETHUSDT", 1.0), t0).await.unwrap());
        assert!(
            ingest
                .handle_ticker(&ticker("ETHUSDT", 2.0), t0 + Duration::from_secs(6))
                .await
                .unwrap()
        );

        let stored = store.get_fields("crypto:ETHUSDT:current").await.unwrap();
        assert_eq!(stored["currentPrice"], "2");
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn failed_write_does_not_advance_throttle() {
        let mut store = MockSnapshotStore::new();
        let mut calls = 0;
        store.expect_set_fields().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(StoreError::Connection("reset".to_string()))
            } else {
                Ok(())
            }
        });

        let ingest = CryptoIngest::new(Arc::new(store), Throttle::default());
        let t0 = Instant::now();

        assert!(ingest.handle_ticker(&ticker("SOLUSDT", 1.0), t0).await.is_err());
        assert!(
            ingest
                .handle_ticker(&ticker("SOLUSDT", 1.0), t0 + Duration::from_secs(1))
                .await
                .unwrap()
        );
    }
}
