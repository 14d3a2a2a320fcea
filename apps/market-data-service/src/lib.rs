#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Market Data Service - Live Price Cache
//!
//! Keeps WebSocket connections to an equities trade venue and a crypto
//! ticker venue, writes the latest normalized snapshot per instrument into a
//! key-value store, and serves those snapshots over HTTP to polling clients.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and rules
//!   - `calendar`: Exchange hours, holidays, market status
//!   - `instruments`: Tracked symbols and store key layout
//!   - `quote`: Stored records and trade-to-quote derivation
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Snapshot store and venue connection contracts
//!   - `services`: Ingest, queries, market-hours supervisor, crypto watchdog
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feeds`: Venue WebSocket clients and the connection registry
//!   - `store`: Redis and in-memory snapshot stores
//!   - `http`: Query API, health, and metrics endpoints
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! Equities WS (per symbol) ──┐
//!                            ├──► Snapshot Store ◄──── HTTP handlers ◄── clients
//! Crypto WS (shared) ────────┘          ▲
//!                                       │
//!              Supervisor (market hours, last close, reconciliation)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::calendar::{MarketCalendar, MarketStatus, is_market_open};
pub use domain::instruments::InstrumentCatalog;
pub use domain::quote::{CryptoQuote, InstrumentQuote, LastClose, TradePrint};

// Ports and services
pub use application::ports::{SharedStore, SnapshotStore, StoreError};
pub use application::services::{
    CryptoIngest, CryptoWatchdog, EquitiesIngest, QueryError, QueryService, Supervisor,
    SupervisorConfig,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ServiceConfig};

// HTTP server
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, router};

// Stores
pub use infrastructure::store::{MemoryStore, RedisStore};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
