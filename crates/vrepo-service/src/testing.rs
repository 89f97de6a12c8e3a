//! Shared fixtures for unit tests.

use vrepo_cache::CacheManager;
use vrepo_core::config::{CacheConfig, DatabaseConfig, RepositoryConfig};
use vrepo_database::{ConnectionPool, RepositoryStore, StoreOptions};

use crate::repository::RepositoryService;

/// A service over a fresh SQLite file inside `dir`.
pub(crate) async fn service(dir: &tempfile::TempDir, cache: CacheConfig) -> RepositoryService {
    service_with(dir, cache, RepositoryConfig::default()).await
}

/// Like [`service`], with explicit repository settings.
pub(crate) async fn service_with(
    dir: &tempfile::TempDir,
    cache: CacheConfig,
    config: RepositoryConfig,
) -> RepositoryService {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("repo.db").display());
    let pool = ConnectionPool::connect(&DatabaseConfig::with_url(url))
        .await
        .unwrap();
    let store = RepositoryStore::open(
        pool,
        StoreOptions {
            text_chunk_size: config.text_chunk_size,
        },
    )
    .await
    .unwrap();
    RepositoryService::new(store, CacheManager::new(&cache), &config)
}
