//! Equities WebSocket Client
//!
//! One socket per tracked symbol. Each socket subscribes to its symbol's
//! trades, pings on a fixed interval, and writes every trade into the
//! snapshot store inline. Disconnects are retried after a fixed delay until
//! the connection is cancelled.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::messages::{FinnhubMessage, FinnhubRequest};
use crate::application::services::EquitiesIngest;
use crate::infrastructure::feeds::codec::{CodecError, JsonCodec};
use crate::infrastructure::feeds::keepalive::{KeepAliveEvent, KeepAliveManager};
use crate::infrastructure::feeds::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::infrastructure::feeds::state::FeedState;
use crate::infrastructure::metrics::{self, MessageKind, Venue};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one connection attempt.
#[derive(Debug, thiserror::Error)]
pub enum FinnhubClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Outbound message could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for one equities socket.
#[derive(Clone)]
pub struct FinnhubClientConfig {
    /// Tracked symbol.
    pub symbol: String,
    /// Full WebSocket URL including the access token.
    pub url: String,
    /// Delay between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Application-level ping period.
    pub keepalive_interval: Duration,
}

impl fmt::Debug for FinnhubClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = self.url.split('?').next().unwrap_or_default();
        f.debug_struct("FinnhubClientConfig")
            .field("symbol", &self.symbol)
            .field("endpoint", &endpoint)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("keepalive_interval", &self.keepalive_interval)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Client
// =============================================================================

/// Equities trade socket for one symbol.
pub struct FinnhubClient {
    config: FinnhubClientConfig,
    codec: JsonCodec,
    ingest: EquitiesIngest,
    state: Arc<FeedState>,
    cancel: CancellationToken,
}

impl fmt::Debug for FinnhubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinnhubClient")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl FinnhubClient {
    /// Create a client. Nothing connects until [`run`](Self::run).
    #[must_use]
    pub fn new(
        config: FinnhubClientConfig,
        ingest: EquitiesIngest,
        state: Arc<FeedState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            codec: JsonCodec::new(),
            ingest,
            state,
            cancel,
        }
    }

    /// Run the connection loop until cancelled.
    pub async fn run(self) {
        let symbol = self.config.symbol.clone();
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(self.config.reconnect_delay));

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.connect_and_run().await {
                Ok(()) => {
                    tracing::info!(symbol = %symbol, "Equities connection closed");
                    break;
                }
                Err(e) => {
                    self.state.mark_disconnected();
                    tracing::warn!(symbol = %symbol, error = %e, "Equities connection lost");
                }
            }

            self.state.record_reconnect();
            tracing::info!(
                symbol = %symbol,
                delay_ms = self.config.reconnect_delay.as_millis(),
                "Reconnecting equities socket"
            );
            if !policy.wait(&self.cancel).await {
                break;
            }
        }

        self.state.mark_disconnected();
    }

    /// Connect, subscribe, and process messages until error or cancellation.
    async fn connect_and_run(&self) -> Result<(), FinnhubClientError> {
        let symbol = &self.config.symbol;
        tracing::debug!(symbol = %symbol, "Connecting equities socket");

        let connect = tokio_tungstenite::connect_async(self.config.url.as_str());
        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = connect => result?,
        };
        let (mut write, mut read) = ws_stream.split();

        let subscribe = self.codec.encode(&FinnhubRequest::Subscribe {
            symbol: symbol.clone(),
        })?;
        write.send(Message::Text(subscribe.into())).await?;
        self.state.mark_connected();
        tracing::info!(symbol = %symbol, "Equities socket connected");

        let (keepalive_tx, mut keepalive_rx) = mpsc::channel::<KeepAliveEvent>(4);
        let keepalive_cancel = self.cancel.child_token();
        tokio::spawn(
            KeepAliveManager::new(
                self.config.keepalive_interval,
                keepalive_tx,
                keepalive_cancel.clone(),
            )
            .run(),
        );
        let _keepalive_guard = keepalive_cancel.drop_guard();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(KeepAliveEvent::SendPing) = keepalive_rx.recv() => {
                    let ping = self.codec.encode(&FinnhubRequest::Ping)?;
                    write.send(Message::Text(ping.into())).await?;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(text.as_str()).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!(symbol = %symbol, "Server sent close frame");
                            return Err(FinnhubClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(FinnhubClientError::ConnectionClosed),
                    }
                }
            }
        }
    }

    /// Handle one text frame. Never fails the connection.
    async fn handle_text_message(&self, text: &str) {
        let symbol = &self.config.symbol;
        let now = Utc::now();
        self.state.touch(now);

        let message = match self.codec.decode_finnhub(text) {
            Ok(message) => message,
            Err(e) => {
                metrics::record_message_dropped(Venue::Finnhub);
                tracing::warn!(symbol = %symbol, error = %e, "Dropping malformed equities message");
                return;
            }
        };

        match &message {
            FinnhubMessage::Trade { .. } => {
                metrics::record_message_received(Venue::Finnhub, MessageKind::Trade);
                let Some(trade) = message.last_trade() else {
                    tracing::trace!(symbol = %symbol, "Empty trade batch");
                    return;
                };
                if let Err(e) = self.ingest.handle_trade(symbol, text, trade, now).await {
                    tracing::warn!(symbol = %symbol, error = %e, "Dropping trade after store failure");
                }
            }
            FinnhubMessage::Ping => {
                metrics::record_message_received(Venue::Finnhub, MessageKind::Ping);
            }
            FinnhubMessage::Error { msg } => {
                tracing::warn!(symbol = %symbol, message = %msg, "Equities venue error");
            }
            FinnhubMessage::Other => {
                tracing::trace!(symbol = %symbol, "Ignoring equities message");
            }
        }
    }
}
