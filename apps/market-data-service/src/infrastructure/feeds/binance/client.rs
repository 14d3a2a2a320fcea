//! Crypto WebSocket Client
//!
//! A single socket subscribed to the ticker stream of every tracked pair.
//! Tickers pass through the ingest throttle before reaching the store. The
//! watchdog can force the socket to drop and reconnect immediately through
//! a [`BinanceHandle`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::messages::{BinanceMessage, SubscribeRequest};
use crate::application::ports::CryptoConnection;
use crate::application::services::CryptoIngest;
use crate::infrastructure::feeds::codec::{CodecError, JsonCodec};
use crate::infrastructure::feeds::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::infrastructure::feeds::state::FeedState;
use crate::infrastructure::metrics::{self, MessageKind, Venue};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one connection attempt.
#[derive(Debug, thiserror::Error)]
pub enum BinanceClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Outbound message could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,

    /// Reconnect requested by the watchdog.
    #[error("forced reconnect")]
    ForcedReconnect,
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for the crypto socket.
#[derive(Debug, Clone)]
pub struct BinanceClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// Tracked pairs, e.g. `BTCUSDT`.
    pub symbols: Vec<String>,
    /// Delay between reconnection attempts.
    pub reconnect_delay: Duration,
}

// =============================================================================
// Handle
// =============================================================================

/// Control handle for a running [`BinanceClient`].
#[derive(Debug, Clone)]
pub struct BinanceHandle {
    force_tx: mpsc::Sender<()>,
    state: Arc<FeedState>,
}

impl BinanceHandle {
    /// Connection status of the socket.
    #[must_use]
    pub fn state(&self) -> &Arc<FeedState> {
        &self.state
    }
}

impl CryptoConnection for BinanceHandle {
    fn force_reconnect(&self) {
        // A pending request already covers this one.
        let _ = self.force_tx.try_send(());
    }
}

// =============================================================================
// Client
// =============================================================================

/// Shared crypto ticker socket.
pub struct BinanceClient {
    config: BinanceClientConfig,
    codec: JsonCodec,
    ingest: Arc<CryptoIngest>,
    state: Arc<FeedState>,
    force_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
    request_id: u64,
}

impl fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceClient")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl BinanceClient {
    /// Create a client and its control handle.
    #[must_use]
    pub fn new(
        config: BinanceClientConfig,
        ingest: Arc<CryptoIngest>,
        cancel: CancellationToken,
    ) -> (Self, BinanceHandle) {
        let (force_tx, force_rx) = mpsc::channel(1);
        let state = Arc::new(FeedState::new(Venue::Binance));
        let handle = BinanceHandle {
            force_tx,
            state: state.clone(),
        };
        let client = Self {
            config,
            codec: JsonCodec::new(),
            ingest,
            state,
            force_rx,
            cancel,
            request_id: 0,
        };
        (client, handle)
    }

    /// Run the connection loop until cancelled.
    pub async fn run(mut self) {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(self.config.reconnect_delay));

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // A request made while disconnected is already satisfied.
            while self.force_rx.try_recv().is_ok() {}

            match self.connect_and_run().await {
                Ok(()) => {
                    tracing::info!("Crypto connection closed");
                    break;
                }
                Err(BinanceClientError::ForcedReconnect) => {
                    self.state.mark_disconnected();
                    self.state.record_reconnect();
                    tracing::info!("Crypto socket reconnecting on request");
                    continue;
                }
                Err(e) => {
                    self.state.mark_disconnected();
                    tracing::warn!(error = %e, "Crypto connection lost");
                }
            }

            self.state.record_reconnect();
            tracing::info!(
                delay_ms = self.config.reconnect_delay.as_millis(),
                "Reconnecting crypto socket"
            );
            if !policy.wait(&self.cancel).await {
                break;
            }
        }

        self.state.mark_disconnected();
    }

    /// Connect, subscribe, and process messages until error or cancellation.
    async fn connect_and_run(&mut self) -> Result<(), BinanceClientError> {
        tracing::debug!(url = %self.config.url, "Connecting crypto socket");

        let connect = tokio_tungstenite::connect_async(self.config.url.as_str());
        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = connect => result?,
        };
        let (mut write, mut read) = ws_stream.split();

        self.request_id += 1;
        let subscribe = self
            .codec
            .encode(&SubscribeRequest::tickers(&self.config.symbols, self.request_id))?;
        write.send(Message::Text(subscribe.into())).await?;
        self.state.mark_connected();
        tracing::info!(symbols = ?self.config.symbols, "Crypto socket connected");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(()) = self.force_rx.recv() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Err(BinanceClientError::ForcedReconnect);
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
                            tracing::info!("Server sent close frame");
                            return Err(BinanceClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(BinanceClientError::ConnectionClosed),
                    }
                }
            }
        }
    }

    /// Handle one text frame. Never fails the connection.
    async fn handle_text_message(&self, text: &str) {
        let now = Utc::now();
        self.state.touch(now);

        let message = match self.codec.decode_binance(text) {
            Ok(message) => message,
            Err(e) => {
                metrics::record_message_dropped(Venue::Binance);
                tracing::warn!(error = %e, "Dropping malformed crypto message");
                return;
            }
        };

        match message {
            BinanceMessage::Ticker(ticker) => {
                metrics::record_message_received(Venue::Binance, MessageKind::Ticker);
                let quote = ticker.to_quote(now);
                if let Err(e) = self.ingest.handle_ticker(&quote, Instant::now()).await {
                    tracing::warn!(symbol = %quote.symbol, error = %e, "Dropping ticker after store failure");
                }
            }
            BinanceMessage::Ack { id } => {
                metrics::record_message_received(Venue::Binance, MessageKind::Ack);
                tracing::debug!(id = ?id, "Crypto subscription acknowledged");
            }
            BinanceMessage::Error { code, msg } => {
                tracing::warn!(code, message = %msg, "Crypto venue error");
            }
            BinanceMessage::Other(event) => {
                tracing::trace!(event = %event, "Ignoring crypto message");
            }
        }
    }
}
