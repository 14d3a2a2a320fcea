//! Equities Connection Registry
//!
//! Owns the per-symbol socket tasks. The supervisor starts them when the
//! market opens and closes them when it closes; the health endpoint reads
//! their state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::finnhub::{FinnhubClient, FinnhubClientConfig};
use super::state::{FeedSnapshot, FeedState};
use crate::application::ports::EquitiesConnections;
use crate::application::services::EquitiesIngest;
use crate::infrastructure::metrics::Venue;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Feed {
    config: FinnhubClientConfig,
    state: Arc<FeedState>,
}

/// Per-symbol equities sockets.
pub struct ConnectionRegistry {
    feeds: Vec<Feed>,
    ingest: EquitiesIngest,
    running: Mutex<HashMap<String, Running>>,
    cancel: CancellationToken,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("symbols", &self.symbols())
            .field("running", &self.running_count())
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    /// Create a registry for the given sockets. Nothing starts until
    /// [`start_all`](EquitiesConnections::start_all). Every task is a child of
    /// `cancel`.
    #[must_use]
    pub fn new(
        configs: Vec<FinnhubClientConfig>,
        ingest: EquitiesIngest,
        cancel: CancellationToken,
    ) -> Self {
        let feeds = configs
            .into_iter()
            .map(|config| Feed {
                config,
                state: Arc::new(FeedState::new(Venue::Finnhub)),
            })
            .collect();
        Self {
            feeds,
            ingest,
            running: Mutex::new(HashMap::new()),
            cancel,
        }
    }

    /// Symbols under management.
    #[must_use]
    pub fn symbols(&self) -> Vec<&str> {
        self.feeds
            .iter()
            .map(|feed| feed.config.symbol.as_str())
            .collect()
    }

    /// Number of socket tasks currently running.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.running
            .lock()
            .values()
            .filter(|r| !r.handle.is_finished())
            .count()
    }

    /// Status of every socket.
    #[must_use]
    pub fn snapshots(&self) -> Vec<FeedSnapshot> {
        self.feeds
            .iter()
            .map(|feed| feed.state.snapshot(&feed.config.symbol))
            .collect()
    }

    fn spawn(&self, feed: &Feed) -> Running {
        let cancel = self.cancel.child_token();
        let client = FinnhubClient::new(
            feed.config.clone(),
            self.ingest.clone(),
            feed.state.clone(),
            cancel.clone(),
        );
        Running {
            cancel,
            handle: tokio::spawn(client.run()),
        }
    }
}

#[async_trait]
impl EquitiesConnections for ConnectionRegistry {
    async fn start_all(&self) {
        let mut running = self.running.lock();
        for feed in &self.feeds {
            let symbol = &feed.config.symbol;
            if running.get(symbol).is_some_and(|r| !r.handle.is_finished()) {
                continue;
            }
            tracing::info!(symbol = %symbol, "Starting equities connection");
            running.insert(symbol.clone(), self.spawn(feed));
        }
    }

    async fn close_all(&self) {
        let drained: Vec<(String, Running)> = self.running.lock().drain().collect();
        for (_, entry) in &drained {
            entry.cancel.cancel();
        }
        for (symbol, entry) in drained {
            if let Err(e) = entry.handle.await {
                tracing::error!(symbol = %symbol, error = %e, "Equities connection task failed");
            }
        }
        tracing::info!("All equities connections closed");
    }

    fn is_live(&self, symbol: &str) -> bool {
        self.feeds
            .iter()
            .find(|feed| feed.config.symbol == symbol)
            .is_some_and(|feed| feed.state.is_connected())
    }
}
