//! Typed cache facade.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CacheError, StorageError, StorageResult};

use super::backend::CacheBackend;

type KeyFormatter<K> = Arc<dyn Fn(&K) -> String + Send + Sync>;

/// A cache keyed by values of type `K`.
///
/// Keys are turned into strings by a formatter (the key's `Display` by
/// default). Every value is stored with the same expiration.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tessera_persistence::cache::{MemoryCache, TypedCache};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cache: TypedCache<u64> = TypedCache::with_formatter(
///     Arc::new(MemoryCache::new()),
///     Duration::from_secs(60),
///     |id| format!("user:{id}"),
/// );
///
/// cache.set(&7, b"alice".to_vec()).await?;
/// assert_eq!(cache.get(&7).await?, Some(b"alice".to_vec()));
/// # Ok(())
/// # }
/// ```
pub struct TypedCache<K> {
    backend: Arc<dyn CacheBackend>,
    expiration: Duration,
    formatter: KeyFormatter<K>,
}

impl<K> Clone for TypedCache<K> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            expiration: self.expiration,
            formatter: Arc::clone(&self.formatter),
        }
    }
}

impl<K> fmt::Debug for TypedCache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCache")
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl<K: fmt::Display> TypedCache<K> {
    /// Creates a cache that formats keys with `Display`.
    pub fn new(backend: Arc<dyn CacheBackend>, expiration: Duration) -> Self {
        Self::with_formatter(backend, expiration, |k: &K| k.to_string())
    }
}

impl<K> TypedCache<K> {
    /// Creates a cache with a custom key formatter.
    pub fn with_formatter(
        backend: Arc<dyn CacheBackend>,
        expiration: Duration,
        formatter: impl Fn(&K) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            backend,
            expiration,
            formatter: Arc::new(formatter),
        }
    }

    /// The string key `key` is stored under.
    pub fn key(&self, key: &K) -> String {
        (self.formatter)(key)
    }

    /// The expiration applied to every value.
    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Reads the value for `key`.
    pub async fn get(&self, key: &K) -> StorageResult<Option<Vec<u8>>> {
        self.backend.get(&self.key(key)).await
    }

    /// Stores `value` for `key`.
    pub async fn set(&self, key: &K, value: Vec<u8>) -> StorageResult<()> {
        self.backend
            .set(&self.key(key), value, self.expiration)
            .await
    }

    /// Deletes each key in order, stopping at the first failure.
    pub async fn delete(&self, keys: &[K]) -> StorageResult<()> {
        for key in keys {
            self.backend.delete(&self.key(key)).await?;
        }
        Ok(())
    }

    /// Reads and deserializes a JSON value.
    ///
    /// A value that does not decode as `V` fails with
    /// [`CacheError::Backend`] naming the key.
    pub async fn get_json<V: DeserializeOwned>(&self, key: &K) -> StorageResult<Option<V>> {
        let Some(bytes) = self.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| self.codec_error("decode", key, e))
    }

    /// Serializes and stores a value as JSON.
    pub async fn set_json<V: Serialize>(&self, key: &K, value: &V) -> StorageResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| self.codec_error("encode", key, e))?;
        self.set(key, bytes).await
    }

    fn codec_error(&self, operation: &str, key: &K, err: serde_json::Error) -> StorageError {
        CacheError::Backend {
            operation: operation.to_string(),
            key: self.key(key),
            message: err.to_string(),
        }
        .into()
    }
}
