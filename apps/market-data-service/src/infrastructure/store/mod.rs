//! Snapshot Store Adapters
//!
//! Implementations of the [`SnapshotStore`](crate::application::ports::SnapshotStore)
//! port:
//!
//! - [`RedisStore`]: production backend
//! - [`MemoryStore`]: tests and local development without Redis

mod memory;
mod redis_store;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use crate::application::ports::{SharedStore, StoreError};
use crate::infrastructure::config::StoreSettings;

/// Build the store selected by `settings`.
///
/// # Errors
///
/// Returns an error if the Redis URL is malformed, or if `cancel` fires
/// before Redis answers.
pub async fn connect(
    settings: &StoreSettings,
    cancel: &CancellationToken,
) -> Result<SharedStore, StoreError> {
    match settings.redis_url.as_deref() {
        Some(url) => Ok(Arc::new(RedisStore::connect_with_retry(url, cancel).await?)),
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
