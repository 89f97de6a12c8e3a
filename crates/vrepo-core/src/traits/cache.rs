//! Cache provider trait for pluggable caching backends.

use async_trait::async_trait;

/// A keyed cache of repository values.
///
/// Implementations decide their own eviction policy; callers only rely on
/// `get` returning either the last inserted value or nothing, and on
/// `remove`/`remove_prefix` taking effect before they return.
#[async_trait]
pub trait CacheProvider<V>: Send + Sync + std::fmt::Debug + 'static
where
    V: Clone + Send + Sync + 'static,
{
    /// Get a value by key.
    async fn get(&self, key: &str) -> Option<V>;

    /// Insert or replace a value.
    async fn insert(&self, key: String, value: V);

    /// Remove a single key.
    async fn remove(&self, key: &str);

    /// Remove every key starting with `prefix`. Returns the number of
    /// entries removed.
    async fn remove_prefix(&self, prefix: &str) -> u64;

    /// Drop all entries.
    async fn clear(&self);

    /// Approximate number of live entries.
    fn entry_count(&self) -> u64;
}
