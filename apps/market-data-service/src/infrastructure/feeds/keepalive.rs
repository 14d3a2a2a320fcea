//! Keep-Alive Manager
//!
//! Periodic application-level ping for venue sockets. The manager runs as
//! its own task and asks the socket loop to send a ping on each period; the
//! socket loop owns the write half and cancels the manager on disconnect.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Events emitted by the keep-alive manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveEvent {
    /// Send a ping control message now.
    SendPing,
}

/// Timer task that requests a ping every `interval`.
#[derive(Debug)]
pub struct KeepAliveManager {
    interval: Duration,
    event_tx: mpsc::Sender<KeepAliveEvent>,
    cancel: CancellationToken,
}

impl KeepAliveManager {
    /// Create a manager. The first ping is requested one full interval after
    /// `run` starts.
    #[must_use]
    pub const fn new(
        interval: Duration,
        event_tx: mpsc::Sender<KeepAliveEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            interval,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled or the socket loop drops its receiver.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::trace!("Keep-alive cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if self.event_tx.send(KeepAliveEvent::SendPing).await.is_err() {
                        tracing::trace!("Keep-alive channel closed");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_ping_after_interval() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            KeepAliveManager::new(Duration::from_millis(30), tx, cancel.clone()).run(),
        );

        let event = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(KeepAliveEvent::SendPing));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn no_ping_before_first_interval() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            KeepAliveManager::new(Duration::from_secs(30), tx, cancel.clone()).run(),
        );

        let early = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(early.is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            KeepAliveManager::new(Duration::from_millis(10), tx, cancel).run(),
        );

        let result = tokio::time::timeout(Duration::from_millis(500), handle).await;
        assert!(result.is_ok(), "manager should exit once the socket loop is gone");
    }
}
