//! Query Service
//!
//! Read-only views over the snapshot store for HTTP callers. Reads are
//! idempotent and safe to run concurrently with any number of writers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::ports::{SharedStore, StoreError};
use crate::domain::calendar::{MarketCalendar, MarketStatus};
use crate::domain::instruments::{InstrumentCatalog, InstrumentKind, crypto_short_key, keys};
use crate::domain::quote::{
    CryptoQuote, InstrumentQuote, current_price_of, status_from_fields,
};

// =============================================================================
// Errors
// =============================================================================

/// Which read failed, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Single equities record.
    Equity,
    /// Single crypto record.
    Crypto,
    /// Merged price map.
    AllPrices,
}

/// Query failures.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Symbol is not in the instrument catalog.
    #[error("Symbol {symbol} not found")]
    UnknownSymbol {
        /// Requested symbol, uppercased.
        symbol: String,
        /// Valid symbols for the requested instrument class.
        available: Vec<String>,
    },

    /// Symbol is tracked but nothing has been stored yet.
    #[error("No data available for {symbol}")]
    NoData {
        /// Requested symbol, uppercased.
        symbol: String,
    },

    /// Store read failed.
    #[error("store read failed for {kind:?} query: {source}")]
    Store {
        /// Which read failed.
        kind: QueryKind,
        /// Underlying error.
        #[source]
        source: StoreError,
    },
}

// =============================================================================
// Views
// =============================================================================

/// Equities quote with the current market status merged in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityView {
    /// Stored quote fields.
    #[serde(flatten)]
    pub quote: InstrumentQuote,
    /// Market status at query time.
    pub market_status: MarketStatus,
}

// =============================================================================
// Service
// =============================================================================

/// Reads published snapshots.
#[derive(Clone)]
pub struct QueryService {
    store: SharedStore,
    catalog: InstrumentCatalog,
    calendar: MarketCalendar,
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl QueryService {
    /// Create a query service.
    #[must_use]
    pub fn new(store: SharedStore, catalog: InstrumentCatalog, calendar: MarketCalendar) -> Self {
        Self {
            store,
            catalog,
            calendar,
        }
    }

    /// Tracked instruments.
    #[must_use]
    pub const fn catalog(&self) -> &InstrumentCatalog {
        &self.catalog
    }

    /// Current equities quote for `symbol` plus market status.
    ///
    /// # Errors
    ///
    /// `UnknownSymbol` if untracked, `NoData` if nothing is stored yet,
    /// `Store` if the backend read fails.
    pub async fn get_equity(&self, symbol: &str, now: DateTime<Utc>) -> Result<EquityView, QueryError> {
        let symbol = symbol.to_uppercase();
        if !self.catalog.is_equity(&symbol) {
            return Err(QueryError::UnknownSymbol {
                symbol,
                available: self.catalog.equities().to_vec(),
            });
        }

        let fields = self
            .store
            .get_fields(&keys::market_current(&symbol))
            .await
            .map_err(|source| QueryError::Store {
                kind: QueryKind::Equity,
                source,
            })?;
        if fields.is_empty() {
            return Err(QueryError::NoData { symbol });
        }

        let market_status = self.market_status(now).await?;
        Ok(EquityView {
            quote: InstrumentQuote::from_fields(&symbol, &fields, now),
            market_status,
        })
    }

    /// Current crypto quote for `symbol`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get_equity`].
    pub async fn get_crypto(&self, symbol: &str, now: DateTime<Utc>) -> Result<CryptoQuote, QueryError> {
        let symbol = symbol.to_uppercase();
        if !self.catalog.is_crypto(&symbol) {
            return Err(QueryError::UnknownSymbol {
                symbol,
                available: self.catalog.crypto().to_vec(),
            });
        }

        let fields = self
            .store
            .get_fields(&keys::crypto_current(&symbol))
            .await
            .map_err(|source| QueryError::Store {
                kind: QueryKind::Crypto,
                source,
            })?;
        if fields.is_empty() {
            return Err(QueryError::NoData { symbol });
        }

        Ok(CryptoQuote::from_fields(&symbol, &fields, now))
    }

    /// Flat price map: equities by ticker, crypto by three-letter prefix.
    /// Symbols without a stored price are left out.
    ///
    /// # Errors
    ///
    /// `Store` if any backend read fails.
    pub async fn get_all_prices(&self) -> Result<BTreeMap<String, f64>, QueryError> {
        let mut prices = BTreeMap::new();

        let records = self
            .catalog
            .equities()
            .iter()
            .map(|s| (InstrumentKind::Equity, s))
            .chain(self.catalog.crypto().iter().map(|s| (InstrumentKind::Crypto, s)));

        for (kind, symbol) in records {
            let (key, label) = match kind {
                InstrumentKind::Equity => (keys::market_current(symbol), symbol.clone()),
                InstrumentKind::Crypto => (keys::crypto_current(symbol), crypto_short_key(symbol)),
            };

            let fields = self
                .store
                .get_fields(&key)
                .await
                .map_err(|source| QueryError::Store {
                    kind: QueryKind::AllPrices,
                    source,
                })?;

            if let Some(price) = current_price_of(&fields) {
                prices.insert(label, price);
            }
        }

        Ok(prices)
    }

    /// Market status computed from the calendar alone.
    #[must_use]
    pub fn calendar_status(&self, now: DateTime<Utc>) -> MarketStatus {
        self.calendar.status_at(now)
    }

    /// Stored market status, or the live calendar value if none is stored.
    ///
    /// # Errors
    ///
    /// `Store` if the backend read fails.
    pub async fn market_status(&self, now: DateTime<Utc>) -> Result<MarketStatus, QueryError> {
        let fields = self
            .store
            .get_fields(keys::MARKET_STATUS)
            .await
            .map_err(|source| QueryError::Store {
                kind: QueryKind::Equity,
                source,
            })?;

        Ok(status_from_fields(&fields).unwrap_or_else(|| self.calendar.status_at(now)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::application::ports::{MockSnapshotStore, SnapshotStore};
    use crate::domain::calendar::StatusMessage;
    use crate::domain::quote::{TradePrint, status_to_fields};
    use crate::infrastructure::store::MemoryStore;

    fn catalog() -> InstrumentCatalog {
        InstrumentCatalog::new(["QQQ", "AAPL", "MSFT"], ["BTCUSDT", "ETHUSDT", "SOLUSDT"])
    }

    fn saturday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 15, 0, 0).unwrap()
    }

    async fn seeded() -> (Arc<MemoryStore>, QueryService) {
        let store = Arc::new(MemoryStore::new());
        let quote = InstrumentQuote::from_trade(
            "AAPL",
            &Default::default(),
            TradePrint {
                price: 150.0,
                timestamp: 1000,
            },
            saturday(),
        );
        store
            .set_fields("market:AAPL:current", &quote.to_fields())
            .await
            .unwrap();

        let service = QueryService::new(store.clone(), catalog(), MarketCalendar::us_equities());
        (store, service)
    }

    #[tokio::test]
    async fn unknown_symbol_lists_valid_set() {
        let (_, service) = seeded().await;
        let err = service.get_equity("tsla", saturday()).await.unwrap_err();
        match err {
            QueryError::UnknownSymbol { symbol, available } => {
                assert_eq!(symbol, "TSLA");
                assert_eq!(available, vec!["QQQ", "AAPL", "MSFT"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn known_symbol_without_data() {
        let (_, service) = seeded().await;
        let err = service.get_equity("MSFT", saturday()).await.unwrap_err();
        assert!(matches!(err, QueryError::NoData { symbol } if symbol == "MSFT"));
    }

    #[tokio::test]
    async fn lowercase_symbol_is_found() {
        let (_, service) = seeded().await;
        let view = service.get_equity("aapl", saturday()).await.unwrap();
        assert_eq!(view.quote.symbol, "AAPL");
        assert_eq!(view.quote.current_price, 150.0);
    }

    #[tokio::test]
    async fn status_falls_back_to_calendar() {
        let (_, service) = seeded().await;
        let view = service.get_equity("AAPL", saturday()).await.unwrap();
        assert!(!view.market_status.is_open);
        assert_eq!(view.market_status.reason, "Weekend (Saturday)");
    }

    #[tokio::test]
    async fn stored_status_wins() {
        let (store, service) = seeded().await;
        let stored = MarketStatus {
            is_open: true,
            status_message: StatusMessage::Open,
            reason: String::new(),
        };
        store
            .set_fields("market:status", &status_to_fields(&stored, saturday()))
            .await
            .unwrap();

        let view = service.get_equity("AAPL", saturday()).await.unwrap();
        assert_eq!(view.market_status, stored);
    }

    #[tokio::test]
    async fn crypto_unknown_lists_crypto_set() {
        let (_, service) = seeded().await;
        let err = service.get_crypto("DOGEUSDT", saturday()).await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::UnknownSymbol { available, .. } if available == vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]
        ));
    }

    #[tokio::test]
    async fn all_prices_uses_short_crypto_keys() {
        let (store, service) = seeded().await;
        let mut fields = crate::domain::quote::Fields::new();
        fields.insert("currentPrice".to_string(), "64000.5".to_string());
        store
            .set_fields("crypto:BTCUSDT:current", &fields)
            .await
            .unwrap();

        let prices = service.get_all_prices().await.unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["AAPL"], 150.0);
        assert_eq!(prices["BTC"], 64000.5);
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let mut store = MockSnapshotStore::new();
        store
            .expect_get_fields()
            .returning(|_| Err(StoreError::Connection("down".to_string())));
        let service = QueryService::new(Arc::new(store), catalog(), MarketCalendar::us_equities());

        let err = service.get_all_prices().await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::Store {
                kind: QueryKind::AllPrices,
                ..
            }
        ));
    }
}
