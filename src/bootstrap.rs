//! Wiring from configuration to a ready repository.

use std::ops::Deref;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use vrepo_cache::CacheManager;
use vrepo_core::config::AppConfig;
use vrepo_core::result::AppResult;
use vrepo_database::{ConnectionPool, RepositoryStore, StoreOptions};
use vrepo_service::{CleanupTask, RepositoryService, spawn_version_cleanup};

/// A running repository: the facade plus its background cleanup task.
///
/// Dereferences to [`RepositoryService`].
#[derive(Debug)]
pub struct Repository {
    service: RepositoryService,
    cleanup: Option<CleanupTask>,
}

impl Repository {
    /// The facade.
    pub fn service(&self) -> &RepositoryService {
        &self.service
    }

    /// Whether periodic version cleanup is running.
    pub fn has_cleanup_task(&self) -> bool {
        self.cleanup.is_some()
    }

    /// Stop background work, drop cached entries, and close every pooled
    /// connection.
    pub async fn shutdown(self) {
        if let Some(task) = self.cleanup {
            task.stop().await;
        }
        self.service.dispose().await;
    }
}

impl Deref for Repository {
    type Target = RepositoryService;

    fn deref(&self) -> &Self::Target {
        &self.service
    }
}

/// Connect, bootstrap the schema, and build the facade.
///
/// Steps:
/// 1. Open the bounded connection pool and pick the dialect.
/// 2. Create or migrate the schema.
/// 3. Build the path cache (or none when disabled).
/// 4. Start periodic version cleanup when an interval is configured.
pub async fn open(config: &AppConfig) -> AppResult<Repository> {
    info!("Starting vrepo v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection ──────────────────────────────
    let pool = ConnectionPool::connect(&config.database).await?;

    // ── Step 2: Schema bootstrap ─────────────────────────────────
    let store = RepositoryStore::open(
        pool,
        StoreOptions {
            text_chunk_size: config.repository.text_chunk_size,
        },
    )
    .await?;

    // ── Step 3: Cache ────────────────────────────────────────────
    let cache = CacheManager::new(&config.cache);

    // ── Step 4: Facade and background work ───────────────────────
    let service = RepositoryService::new(store, cache, &config.repository);
    let cleanup = match config.repository.cleanup_interval_seconds {
        0 => None,
        secs => Some(spawn_version_cleanup(
            service.clone(),
            Duration::from_secs(secs),
            CancellationToken::new(),
        )),
    };

    info!(
        dialect = ?service.store().dialect().kind(),
        cache = service.cache().is_enabled(),
        cleanup = cleanup.is_some(),
        "Repository ready"
    );
    Ok(Repository { service, cleanup })
}
