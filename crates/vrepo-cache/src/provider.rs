//! Cache manager in front of the repository read paths.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use vrepo_core::config::CacheConfig;
use vrepo_core::result::AppResult;
use vrepo_core::traits::CacheProvider;
use vrepo_core::types::RepositoryPath;
use vrepo_entity::{RepositoryObject, Resource};

use crate::keys;

/// A cached repository value.
#[derive(Debug, Clone)]
pub enum CachedValue {
    /// Folder or resource metadata.
    Object(RepositoryObject),
    /// A resource with its content.
    Resource(Arc<Resource>),
}

/// Read-through, write-invalidate cache keyed by repository path.
///
/// With caching disabled there is no provider at all and every lookup
/// calls its loader. A generation counter is bumped by every
/// invalidation; a loaded value is only kept if no invalidation happened
/// while it was being read, so a reader racing a writer never leaves
/// stale data behind.
#[derive(Debug, Clone)]
pub struct CacheManager {
    inner: Option<Arc<dyn CacheProvider<CachedValue>>>,
    generation: Arc<AtomicU64>,
}

impl CacheManager {
    /// Create a cache manager from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        if !config.enabled {
            info!("Path cache disabled");
            return Self::disabled();
        }

        Self::memory(config)
    }

    #[cfg(feature = "memory")]
    fn memory(config: &CacheConfig) -> Self {
        info!(
            max_capacity = config.max_capacity,
            ttl_seconds = config.time_to_live_seconds,
            "Initializing in-memory path cache"
        );
        Self::from_provider(Arc::new(crate::memory::MemoryCacheProvider::new(config)))
    }

    #[cfg(not(feature = "memory"))]
    fn memory(_config: &CacheConfig) -> Self {
        tracing::warn!("No cache backend compiled in; path cache disabled");
        Self::disabled()
    }

    /// A manager that bypasses caching entirely.
    pub fn disabled() -> Self {
        Self {
            inner: None,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a cache manager from an existing provider.
    pub fn from_provider(provider: Arc<dyn CacheProvider<CachedValue>>) -> Self {
        Self {
            inner: Some(provider),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether a provider is configured.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Approximate number of cached entries (0 when disabled).
    pub fn entry_count(&self) -> u64 {
        self.inner.as_ref().map_or(0, |p| p.entry_count())
    }

    /// The object at `path`, loading it through `load` on a miss.
    ///
    /// Absent objects are not cached.
    pub async fn object<F, Fut>(
        &self,
        path: &RepositoryPath,
        load: F,
    ) -> AppResult<Option<RepositoryObject>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Option<RepositoryObject>>>,
    {
        let Some(provider) = &self.inner else {
            return load().await;
        };

        let key = keys::object(path);
        if let Some(CachedValue::Object(object)) = provider.get(&key).await {
            debug!(path = %path, "Object cache hit");
            return Ok(Some(object));
        }

        let generation = self.generation.load(Ordering::Acquire);
        let loaded = load().await?;
        if let Some(object) = &loaded {
            self.keep(provider.as_ref(), key, CachedValue::Object(object.clone()), generation)
                .await;
        }
        Ok(loaded)
    }

    /// The resource with content at `path`, loading it through `load` on
    /// a miss.
    pub async fn resource<F, Fut>(
        &self,
        path: &RepositoryPath,
        load: F,
    ) -> AppResult<Option<Arc<Resource>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Option<Resource>>>,
    {
        let Some(provider) = &self.inner else {
            return Ok(load().await?.map(Arc::new));
        };

        let key = keys::resource(path);
        if let Some(CachedValue::Resource(resource)) = provider.get(&key).await {
            debug!(path = %path, "Resource cache hit");
            return Ok(Some(resource));
        }

        let generation = self.generation.load(Ordering::Acquire);
        let loaded = load().await?.map(Arc::new);
        if let Some(resource) = &loaded {
            self.keep(
                provider.as_ref(),
                key,
                CachedValue::Resource(resource.clone()),
                generation,
            )
            .await;
        }
        Ok(loaded)
    }

    /// Drop the entries for `path` and its parent's object entry.
    pub async fn invalidate(&self, path: &RepositoryPath) {
        let Some(provider) = &self.inner else {
            return;
        };
        self.generation.fetch_add(1, Ordering::AcqRel);
        provider.remove(&keys::object(path)).await;
        provider.remove(&keys::resource(path)).await;
        if let Some(parent) = path.parent() {
            provider.remove(&keys::object(&parent)).await;
        }
    }

    /// Drop the entries for `path`, its parent, and everything beneath it.
    pub async fn invalidate_subtree(&self, path: &RepositoryPath) {
        let Some(provider) = &self.inner else {
            return;
        };
        self.invalidate(path).await;
        let mut removed = 0;
        for prefix in keys::subtree_prefixes(path) {
            removed += provider.remove_prefix(&prefix).await;
        }
        debug!(path = %path, removed, "Subtree cache entries invalidated");
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        if let Some(provider) = &self.inner {
            self.generation.fetch_add(1, Ordering::AcqRel);
            provider.clear().await;
        }
    }

    async fn keep(
        &self,
        provider: &dyn CacheProvider<CachedValue>,
        key: String,
        value: CachedValue,
        generation: u64,
    ) {
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        provider.insert(key.clone(), value).await;
        // An invalidation that slipped in between the check and the insert
        // may have missed this key.
        if self.generation.load(Ordering::Acquire) != generation {
            provider.remove(&key).await;
        }
    }
}
