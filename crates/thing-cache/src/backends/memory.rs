//! In-process cache backend

use crate::{CacheBackend, CacheConfig, CacheResult, CacheStats};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<u8>,
    inserted_at: Instant,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            data,
            inserted_at: now,
            expires_at: ttl.map(|ttl| now + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |exp| Instant::now() > exp)
    }
}

/// In-memory backend with TTL support.
///
/// When `max_entries` is reached, expired entries are dropped first, then the
/// oldest insertion.
pub struct MemoryBackend {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
    stats: Mutex<CacheStats>,
}

impl MemoryBackend {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict(&self) {
        let Some(max_entries) = self.config.max_entries else {
            return;
        };

        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        for key in expired {
            self.entries.remove(&key);
        }

        while self.entries.len() >= max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().inserted_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    tracing::debug!("Evicting cache key '{}'", key);
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        // The shard guard must be released before `remove_if` takes the write lock.
        let lookup = self
            .entries
            .get(key)
            .map(|entry| (entry.is_expired(), entry.data.clone()));
        let found = match lookup {
            Some((false, data)) => Some(data),
            Some((true, _)) => {
                self.entries.remove_if(key, |_, entry| entry.is_expired());
                None
            }
            None => None,
        };

        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        Ok(found)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        if !self.entries.contains_key(key) {
            self.evict();
        }
        let ttl = ttl.or(self.config.default_ttl);
        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn flush(&self) -> CacheResult<()> {
        self.entries.clear();
        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let mut stats = self.stats.lock().clone();
        stats.total_keys = self.entries.len() as u64;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_forget() {
        let cache = MemoryBackend::default();
        cache.put("Member:1", b"row".to_vec(), None).await.unwrap();

        assert_eq!(cache.get("Member:1").await.unwrap(), Some(b"row".to_vec()));
        assert!(cache.exists("Member:1").await.unwrap());
        assert!(cache.forget("Member:1").await.unwrap());
        assert!(!cache.forget("Member:1").await.unwrap());
        assert_eq!(cache.get("Member:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = MemoryBackend::default();
        cache
            .put("Member:2", b"row".to_vec(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let lookup = tokio::time::timeout(Duration::from_secs(5), cache.get("Member:2"))
            .await
            .expect("get on an expired entry returns");
        assert_eq!(lookup.unwrap(), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().await.unwrap().misses, 1);
    }

    #[tokio::test]
    async fn test_default_ttl_applies_when_none_given() {
        let cache = MemoryBackend::new(CacheConfig::default().with_default_ttl(Duration::from_millis(50)));
        cache.put("Member:3", b"row".to_vec(), None).await.unwrap();
        assert!(cache.exists("Member:3").await.unwrap());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let exists = tokio::time::timeout(Duration::from_secs(5), cache.exists("Member:3"))
            .await
            .expect("exists on an expired entry returns");
        assert!(!exists.unwrap());

        cache.put("Member:3", b"fresh".to_vec(), None).await.unwrap();
        assert_eq!(cache.get("Member:3").await.unwrap(), Some(b"fresh".to_vec()));
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache = MemoryBackend::new(CacheConfig::default().with_max_entries(2));
        cache.put("a", vec![1], None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.put("b", vec![2], None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.put("c", vec![3], None).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let cache = MemoryBackend::default();
        cache.put("k", vec![1], None).await.unwrap();
        cache.get("k").await.unwrap();
        cache.get("missing").await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_keys, 1);
    }

    #[tokio::test]
    async fn test_forget_many_counts_removed() {
        let cache = MemoryBackend::default();
        cache.put("Member:1", vec![1], None).await.unwrap();
        cache.put("Member:2", vec![2], None).await.unwrap();

        let removed = cache
            .forget_many(&["Member:1".to_string(), "Member:3".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }
}
