//! Port Interfaces
//!
//! Contracts between the application services and the infrastructure
//! adapters, following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `SnapshotStore`: Key-value store holding the latest record per instrument
//! - `EquitiesConnections`: Start/stop control over per-symbol venue sockets
//! - `CryptoConnection`: Control over the shared crypto venue socket
//! - `TradeDecoder`: Extracts the last trade print from a raw venue message

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::quote::TradePrint;

pub use crate::domain::quote::Fields;

// =============================================================================
// Snapshot Store
// =============================================================================

/// Errors from the snapshot store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend connection could not be established or was lost.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// A command was rejected or failed mid-flight.
    #[error("store command failed: {0}")]
    Command(String),
}

/// Key-value snapshot store.
///
/// Each `set_fields` call must be atomic with respect to readers: a reader
/// never observes a half-written record. No cross-key transactions exist.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Upsert all `fields` of the hash at `key` in a single operation.
    async fn set_fields(&self, key: &str, fields: &Fields) -> Result<(), StoreError>;

    /// Read the hash at `key`. Missing keys read as an empty map.
    async fn get_fields(&self, key: &str) -> Result<Fields, StoreError>;

    /// Read a raw string value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a raw string value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Round-trip check used by readiness probes.
    async fn ping(&self) -> Result<(), StoreError> {
        self.get("__ping__").await.map(|_| ())
    }
}

/// Shared store handle.
pub type SharedStore = Arc<dyn SnapshotStore>;

// =============================================================================
// Venue Connections
// =============================================================================

/// Control surface over the per-symbol equities sockets.
#[async_trait]
pub trait EquitiesConnections: Send + Sync {
    /// Start a connection for every tracked symbol that is not already live.
    async fn start_all(&self);

    /// Close every equities connection and wait for their tasks to finish.
    async fn close_all(&self);

    /// Whether a connection for `symbol` is currently open.
    fn is_live(&self, symbol: &str) -> bool;
}

/// Control surface over the shared crypto socket.
pub trait CryptoConnection: Send + Sync {
    /// Drop the current socket and reconnect immediately.
    fn force_reconnect(&self);
}

/// Decodes raw venue trade messages kept for reconciliation.
pub trait TradeDecoder: Send + Sync {
    /// Last trade print in `raw`, or `None` if it is not a usable trade message.
    fn last_trade(&self, raw: &str) -> Option<TradePrint>;
}
