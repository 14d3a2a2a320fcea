//! Equities Ingest
//!
//! Turns venue trade prints into stored [`InstrumentQuote`] records. Used by
//! the per-symbol socket tasks for live messages and by the supervisor's
//! reconciliation pass for re-derivation from the last raw message.

use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::application::ports::{SharedStore, StoreError};
use crate::domain::instruments::keys;
use crate::domain::quote::{InstrumentQuote, TradePrint};
use crate::infrastructure::metrics::{self, RecordKind};

/// Writes equities quotes into the snapshot store.
#[derive(Clone)]
pub struct EquitiesIngest {
    store: SharedStore,
}

impl std::fmt::Debug for EquitiesIngest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EquitiesIngest").finish_non_exhaustive()
    }
}

impl EquitiesIngest {
    /// Create an ingest service over `store`.
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Handle one inbound trade message for `symbol`.
    ///
    /// The raw message is kept at `trades:<SYM>:latest` for reconciliation.
    /// A failure there is logged and the quote is still derived.
    ///
    /// # Errors
    ///
    /// Returns the store error if the current record cannot be read or
    /// written. The trade is not retried.
    pub async fn handle_trade(
        &self,
        symbol: &str,
        raw: &str,
        trade: TradePrint,
        now: DateTime<Utc>,
    ) -> Result<InstrumentQuote, StoreError> {
        let started = Instant::now();
        match self.store.set(&keys::trades_latest(symbol), raw).await {
            Ok(()) => metrics::record_store_write(RecordKind::RawTrade, started.elapsed()),
            Err(e) => {
                metrics::record_store_error(RecordKind::RawTrade);
                tracing::warn!(symbol = %symbol, error = %e, "Failed to store raw trade message");
            }
        }

        self.apply_trade(symbol, trade, now).await
    }

    /// Read the current record, derive the next quote from `trade`, and
    /// upsert it.
    ///
    /// # Errors
    ///
    /// Returns the store error if the read or the write fails.
    pub async fn apply_trade(
        &self,
        symbol: &str,
        trade: TradePrint,
        now: DateTime<Utc>,
    ) -> Result<InstrumentQuote, StoreError> {
        let key = keys::market_current(symbol);

        let previous = self.store.get_fields(&key).await.inspect_err(|_| {
            metrics::record_store_error(RecordKind::EquityQuote);
        })?;

        let quote = InstrumentQuote::from_trade(symbol, &previous, trade, now);

        let started = Instant::now();
        self.store
            .set_fields(&key, &quote.to_fields())
            .await
            .inspect_err(|_| metrics::record_store_error(RecordKind::EquityQuote))?;
        metrics::record_store_write(RecordKind::EquityQuote, started.elapsed());

        tracing::debug!(
            symbol = %symbol,
            price = quote.current_price,
            change = quote.change,
            "Equity quote updated"
        );

        Ok(quote)
    }
}
