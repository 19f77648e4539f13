//! Typed cache integration tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use tessera_persistence::cache::{CacheBackend, MemoryCache, TypedCache};
use tessera_persistence::config::StoreConfig;
use tessera_persistence::error::{CacheError, StorageError, StorageResult};

/// Records deletes and fails on one configured key.
#[derive(Default)]
struct FlakyCache {
    failing_key: String,
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl CacheBackend for FlakyCache {
    async fn get(&self, _key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> StorageResult<()> {
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if key == self.failing_key {
            return Err(CacheError::Backend {
                operation: "delete".to_string(),
                key: key.to_string(),
                message: "connection reset".to_string(),
            }
            .into());
        }
        self.deleted.lock().push(key.to_string());
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct UserId(u64);

#[tokio::test]
async fn test_get_set_delete_with_display_keys() {
    let cache: TypedCache<u64> = TypedCache::new(Arc::new(MemoryCache::new()), Duration::ZERO);

    assert_eq!(cache.get(&1).await.unwrap(), None);
    cache.set(&1, b"one".to_vec()).await.unwrap();
    cache.set(&2, b"two".to_vec()).await.unwrap();
    cache.set(&3, b"three".to_vec()).await.unwrap();
    assert_eq!(cache.get(&1).await.unwrap(), Some(b"one".to_vec()));

    cache.delete(&[1, 2]).await.unwrap();
    assert_eq!(cache.get(&1).await.unwrap(), None);
    assert_eq!(cache.get(&2).await.unwrap(), None);
    assert_eq!(cache.get(&3).await.unwrap(), Some(b"three".to_vec()));

    // Nothing to delete is not an error.
    cache.delete(&[]).await.unwrap();
    cache.delete(&[1]).await.unwrap();
}

#[tokio::test]
async fn test_custom_formatter_shares_backend() {
    let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCache::with_prefix("app:"));
    let users: TypedCache<UserId> =
        TypedCache::with_formatter(Arc::clone(&backend), Duration::ZERO, |u: &UserId| {
            format!("user:{}", u.0)
        });
    let raw: TypedCache<String> = TypedCache::new(Arc::clone(&backend), Duration::ZERO);

    users.set(&UserId(7), b"alice".to_vec()).await.unwrap();
    assert_eq!(users.key(&UserId(7)), "user:7");
    assert_eq!(
        raw.get(&"user:7".to_string()).await.unwrap(),
        Some(b"alice".to_vec())
    );
}

#[tokio::test(start_paused = true)]
async fn test_values_expire() {
    let cache: TypedCache<&'static str> =
        TypedCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(30));

    cache.set(&"session", b"token".to_vec()).await.unwrap();
    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(cache.get(&"session").await.unwrap().is_some());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get(&"session").await.unwrap(), None);
}

#[tokio::test]
async fn test_delete_stops_at_first_error() {
    let backend = Arc::new(FlakyCache {
        failing_key: "b".to_string(),
        ..FlakyCache::default()
    });
    let cache: TypedCache<&'static str> = TypedCache::new(backend.clone(), Duration::ZERO);

    let err = cache.delete(&["a", "b", "c"]).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Cache(CacheError::Backend { ref key, .. }) if key == "b"
    ));
    assert_eq!(*backend.deleted.lock(), vec!["a".to_string()]);
}

#[tokio::test]
async fn test_cache_from_config() {
    let config = StoreConfig::from_lookup(|name| match name {
        "TESSERA_CACHE_PREFIX" => Some("svc:".to_string()),
        "TESSERA_CACHE_EXPIRATION" => Some("1m".to_string()),
        _ => None,
    })
    .unwrap();

    let backend = Arc::new(MemoryCache::with_prefix(config.cache.prefix.clone()));
    let cache: TypedCache<u32> = TypedCache::new(backend.clone(), config.cache.expiration);
    assert_eq!(cache.expiration(), Duration::from_secs(60));

    cache.set(&1, b"x".to_vec()).await.unwrap();
    assert_eq!(backend.len(), 1);
}
