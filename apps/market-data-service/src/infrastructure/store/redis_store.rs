//! Redis Snapshot Store
//!
//! Hash records are written with a single `HSET` carrying every field, so a
//! concurrent `HGETALL` sees either the old or the new record. The
//! connection manager reconnects transparently after the initial connect.

use std::fmt;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Fields, SnapshotStore, StoreError};
use crate::infrastructure::feeds::{ReconnectConfig, ReconnectPolicy};

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            Self::Connection(err.to_string())
        } else {
            Self::Command(err.to_string())
        }
    }
}

/// Snapshot store backed by Redis.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect once.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Connect, retrying with exponential backoff until the server answers
    /// or `cancel` fires. Only connection failures are retried.
    ///
    /// # Errors
    ///
    /// Returns a configuration error (such as a malformed URL) at once, or
    /// the last connection error if cancelled.
    pub async fn connect_with_retry(
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Self, StoreError> {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::store_connect());
        loop {
            let attempt = tokio::select! {
                () = cancel.cancelled() => {
                    return Err(StoreError::Connection("connect cancelled".to_string()));
                }
                result = Self::connect(url) => result,
            };
            match attempt {
                Ok(store) => {
                    tracing::info!(attempts = policy.attempt_count() + 1, "Connected to Redis");
                    return Ok(store);
                }
                Err(e @ StoreError::Command(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt = policy.attempt_count() + 1,
                        "Redis connection failed"
                    );
                    if !policy.wait(cancel).await {
                        return Err(e);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl SnapshotStore for RedisStore {
    async fn set_fields(&self, key: &str, fields: &Fields) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(key, &items).await?;
        Ok(())
    }

    async fn get_fields(&self, key: &str) -> Result<Fields, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_url_is_rejected() {
        let result = RedisStore::connect("not-a-redis-url").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn malformed_url_is_not_retried() {
        let cancel = CancellationToken::new();
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            RedisStore::connect_with_retry("not-a-redis-url", &cancel),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(StoreError::Command(_))));
    }

    #[tokio::test]
    async fn unreachable_server_is_retried_until_cancelled() {
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { RedisStore::connect_with_retry("redis://127.0.0.1:1", &cancel).await }
        });

        tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }

    #[test]
    fn io_errors_map_to_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = StoreError::from(redis::RedisError::from(io));
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[test]
    fn type_errors_map_to_command() {
        let err = StoreError::from(redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "unexpected response",
        )));
        assert!(matches!(err, StoreError::Command(_)));
    }
}
