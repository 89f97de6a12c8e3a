//! In-memory cache implementation using the moka crate.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use vrepo_core::config::CacheConfig;
use vrepo_core::traits::CacheProvider;

/// In-memory cache provider using moka.
///
/// Capacity and TTL are applied at cache level; moka evicts by a
/// TinyLFU policy once `max_capacity` is reached.
#[derive(Debug, Clone)]
pub struct MemoryCacheProvider<V>
where
    V: Clone + Send + Sync + 'static,
{
    cache: Cache<String, V>,
}

impl<V> MemoryCacheProvider<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new in-memory cache from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.time_to_live_seconds))
            .build();
        Self { cache }
    }

    /// Apply pending maintenance so that `entry_count` is exact.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl<V> CacheProvider<V> for MemoryCacheProvider<V>
where
    V: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        self.cache.get(key).await
    }

    async fn insert(&self, key: String, value: V) {
        self.cache.insert(key, value).await;
    }

    async fn remove(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    async fn remove_prefix(&self, prefix: &str) -> u64 {
        // moka has no key scan by prefix, so collect first and then remove.
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.to_string())
            .collect();

        let count = keys.len() as u64;
        for key in keys {
            self.cache.invalidate(&key).await;
        }
        debug!(prefix, count, "Removed cache keys by prefix");
        count
    }

    async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
