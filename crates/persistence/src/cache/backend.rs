//! Cache backend trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Key-value cache backend for opaque byte values.
///
/// Implementations must be thread-safe. Keys passed in are already
/// formatted; a backend may prefix them further.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value from the cache.
    ///
    /// Returns `None` if the key is absent or expired.
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Put a value into the cache.
    ///
    /// A zero `ttl` stores the value without expiration.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()>;

    /// Delete a value from the cache. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> StorageResult<()>;
}
