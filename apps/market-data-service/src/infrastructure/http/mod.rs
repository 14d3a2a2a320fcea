//! HTTP Server
//!
//! Read-only API over the snapshot store plus operational endpoints.
//!
//! # Endpoints
//!
//! - `GET /api/market/data/{symbol}` - Equities quote with market status
//! - `GET /api/crypto/data/{symbol}` - Crypto quote
//! - `GET /api/current/data/all` - Flat price map
//! - `GET /`, `/health`, `/healthz`, `/readyz`, `/metrics` - see [`health`]

pub mod health;
pub mod query;
mod response;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::application::ports::SharedStore;
use crate::application::services::QueryService;
use crate::infrastructure::feeds::{ConnectionRegistry, FeedSnapshot, FeedState};

// =============================================================================
// State
// =============================================================================

/// Shared state for request handlers.
pub struct AppState {
    query: QueryService,
    store: SharedStore,
    version: String,
    started_at: Instant,
    equities: Option<Arc<ConnectionRegistry>>,
    crypto: Option<Arc<FeedState>>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("query", &self.query)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create state without feed reporting.
    #[must_use]
    pub fn new(query: QueryService, store: SharedStore, version: impl Into<String>) -> Self {
        Self {
            query,
            store,
            version: version.into(),
            started_at: Instant::now(),
            equities: None,
            crypto: None,
        }
    }

    /// Report these sockets on `/health`.
    #[must_use]
    pub fn with_feeds(mut self, equities: Arc<ConnectionRegistry>, crypto: Arc<FeedState>) -> Self {
        self.equities = Some(equities);
        self.crypto = Some(crypto);
        self
    }

    fn feed_snapshots(&self) -> Vec<FeedSnapshot> {
        let mut feeds = self
            .equities
            .as_ref()
            .map(|registry| registry.snapshots())
            .unwrap_or_default();
        if let Some(crypto) = &self.crypto {
            feeds.push(crypto.snapshot("crypto"));
        }
        feeds
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health::banner))
        .route("/health", get(health::health))
        .route("/healthz", get(health::liveness))
        .route("/readyz", get(health::readiness))
        .route("/metrics", get(health::metrics))
        .route("/api/market/data/{symbol}", get(query::equity_data))
        .route("/api/crypto/data/{symbol}", get(query::crypto_data))
        .route("/api/current/data/all", get(query::all_prices))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

/// HTTP server bound to one port.
#[derive(Debug)]
pub struct HttpServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server stops with
    /// an error.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
