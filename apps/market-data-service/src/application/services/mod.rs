//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `EquitiesIngest`: Derives and stores equities quotes from trade prints
//! - `CryptoIngest`: Throttled storage of crypto tickers
//! - `QueryService`: Read-only snapshot views for HTTP callers
//! - `Supervisor`: Calendar-driven equities connection lifecycle
//! - `CryptoWatchdog`: Crypto feed liveness check

mod crypto_ingest;
mod equities_ingest;
mod query;
mod supervisor;

pub use crypto_ingest::{CryptoIngest, DEFAULT_THROTTLE_WINDOW, Throttle};
pub use equities_ingest::EquitiesIngest;
pub use query::{EquityView, QueryError, QueryKind, QueryService};
pub use supervisor::{CryptoWatchdog, Phase, Supervisor, SupervisorConfig, SupervisorError};
