//! In-process cache backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::error::StorageResult;

use super::backend::CacheBackend;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// A [`CacheBackend`] held in process memory.
///
/// Expired entries are dropped lazily, when they are next read or when
/// [`purge_expired`](Self::purge_expired) runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    prefix: String,
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Creates an empty cache with no key prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache that prefixes every key with `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: RwLock::default(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Number of stored entries, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let key = self.key(key);
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(&key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        self.entries.write().remove(&key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries
            .write()
            .insert(self.key(key), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.write().remove(&self.key(key));
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("a").await.unwrap(), None);

        cache.set("a", b"one".to_vec(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(b"one".to_vec()));

        cache.delete("a").await.unwrap();
        cache.delete("a").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prefix_isolates_keys() {
        let cache = MemoryCache::with_prefix("app:");
        cache.set("a", b"x".to_vec(), Duration::ZERO).await.unwrap();
        assert!(cache.entries.read().contains_key("app:a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("short", b"s".to_vec(), Duration::from_secs(5))
            .await
            .unwrap();
        cache.set("forever", b"f".to_vec(), Duration::ZERO).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.get("short").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
        assert!(cache.get("forever").await.unwrap().is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache
            .set("a", b"a".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .set("b", b"b".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
