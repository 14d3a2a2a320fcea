//! Feed Connection State
//!
//! Lock-free status shared between a socket task and its observers (the
//! connection registry, the health endpoint).

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::infrastructure::metrics::{self, Venue};

/// Live status of one venue socket.
#[derive(Debug)]
pub struct FeedState {
    venue: Venue,
    connected: AtomicBool,
    last_message_ms: AtomicI64,
    reconnects: AtomicU64,
}

impl FeedState {
    /// Create a disconnected state for `venue`.
    #[must_use]
    pub const fn new(venue: Venue) -> Self {
        Self {
            venue,
            connected: AtomicBool::new(false),
            last_message_ms: AtomicI64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Whether the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Mark the socket open. Updates the connections gauge on transitions only.
    pub fn mark_connected(&self) {
        if !self.connected.swap(true, Ordering::AcqRel) {
            metrics::record_venue_connected(self.venue);
        }
    }

    /// Mark the socket closed. Updates the connections gauge on transitions only.
    pub fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            metrics::record_venue_disconnected(self.venue);
        }
    }

    /// Record an inbound message at `now`.
    pub fn touch(&self, now: DateTime<Utc>) {
        self.last_message_ms
            .store(now.timestamp_millis(), Ordering::Relaxed);
    }

    /// Record a reconnection attempt.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::record_reconnect(self.venue);
    }

    /// Point-in-time copy for reporting.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> FeedSnapshot {
        let last_ms = self.last_message_ms.load(Ordering::Relaxed);
        FeedSnapshot {
            name: name.to_string(),
            venue: self.venue.as_str(),
            connected: self.is_connected(),
            last_message: (last_ms > 0)
                .then(|| DateTime::from_timestamp_millis(last_ms))
                .flatten(),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Reported status of one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    /// Symbol for equities sockets, `crypto` for the shared socket.
    pub name: String,
    /// Venue label.
    pub venue: &'static str,
    /// Whether the socket is open.
    pub connected: bool,
    /// Time of the last inbound message.
    pub last_message: Option<DateTime<Utc>>,
    /// Reconnection attempts since start.
    pub reconnects: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected_without_messages() {
        let state = FeedState::new(Venue::Finnhub);
        let snapshot = state.snapshot("AAPL");
        assert!(!snapshot.connected);
        assert_eq!(snapshot.last_message, None);
        assert_eq!(snapshot.reconnects, 0);
        assert_eq!(snapshot.venue, "finnhub");
    }

    #[test]
    fn tracks_transitions_and_activity() {
        let state = FeedState::new(Venue::Binance);
        state.mark_connected();
        state.mark_connected();
        assert!(state.is_connected());

        let now = DateTime::from_timestamp_millis(1_741_791_600_123).unwrap();
        state.touch(now);
        state.record_reconnect();
        state.mark_disconnected();

        let snapshot = state.snapshot("crypto");
        assert!(!snapshot.connected);
        assert_eq!(snapshot.last_message, Some(now));
        assert_eq!(snapshot.reconnects, 1);
    }
}
