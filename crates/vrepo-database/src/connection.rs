//! Bounded connection pool with leak eviction.
//!
//! Every physical connection handed out is tracked together with the
//! instant it was acquired. When the pool is at capacity an acquirer
//! waits for a release a bounded number of times; if nothing comes back
//! it assumes the oldest connection has leaked, closes it, and takes its
//! place. The number of open connections therefore never exceeds the
//! configured maximum, and a caller that forgets to release cannot
//! starve everyone else.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sqlx::{AnyConnection, Connection};
use tokio::sync::{MappedMutexGuard, Mutex as AsyncMutex, MutexGuard, Notify, OwnedMutexGuard};
use tracing::{debug, info, warn};

use vrepo_core::config::DatabaseConfig;
use vrepo_core::error::{AppError, ErrorKind};
use vrepo_core::result::AppResult;

use crate::dialect::{self, Dialect};

type Slot = Arc<AsyncMutex<Option<AnyConnection>>>;

/// A handed-out connection as seen by the pool.
struct Tracked {
    id: u64,
    acquired_at: Instant,
    slot: Slot,
}

impl fmt::Debug for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("id", &self.id)
            .field("held_ms", &self.acquired_at.elapsed().as_millis())
            .finish()
    }
}

/// A tracked slot awaiting its physical connection. The slot's own lock
/// is held until the connection is stored in it, so an evictor that
/// picks this slot waits for the connect to finish and then closes it.
struct Reservation {
    id: u64,
    acquired_at: Instant,
    slot: Slot,
    guard: OwnedMutexGuard<Option<AnyConnection>>,
}

struct PoolInner {
    url: String,
    max_connections: usize,
    wait_budget: Duration,
    wait_interval: Duration,
    tracked: Mutex<Vec<Tracked>>,
    released: Notify,
    next_id: AtomicU64,
    evictions: AtomicU64,
    closed: AtomicBool,
}

impl PoolInner {
    fn try_track(&self, id: u64, slot: &Slot) -> Option<Instant> {
        let mut tracked = self.tracked.lock();
        if tracked.len() >= self.max_connections {
            return None;
        }
        let acquired_at = Instant::now();
        tracked.push(Tracked {
            id,
            acquired_at,
            slot: slot.clone(),
        });
        Some(acquired_at)
    }

    /// Track a slot, replacing the oldest tracked connection when the
    /// pool is full. Returns the displaced entry, if any.
    fn track_evicting(&self, id: u64, slot: &Slot) -> (Instant, Option<Tracked>) {
        let mut tracked = self.tracked.lock();
        let acquired_at = Instant::now();
        let entry = Tracked {
            id,
            acquired_at,
            slot: slot.clone(),
        };
        if tracked.len() < self.max_connections {
            tracked.push(entry);
            return (acquired_at, None);
        }
        let oldest = tracked
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| t.acquired_at)
            .map(|(i, _)| i);
        match oldest {
            Some(index) => {
                let victim = std::mem::replace(&mut tracked[index], entry);
                (acquired_at, Some(victim))
            }
            None => {
                tracked.push(entry);
                (acquired_at, None)
            }
        }
    }

    /// Forget a tracked connection. Returns `false` if it was already
    /// evicted or released.
    fn is_tracked(&self, id: u64) -> bool {
        self.tracked.lock().iter().any(|t| t.id == id)
    }

    fn untrack(&self, id: u64) -> bool {
        let mut tracked = self.tracked.lock();
        match tracked.iter().position(|t| t.id == id) {
            Some(index) => {
                tracked.swap_remove(index);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for PoolInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolInner")
            .field("url", &mask_password(&self.url))
            .field("max_connections", &self.max_connections)
            .field("open", &self.tracked.lock().len())
            .field("evictions", &self.evictions.load(Ordering::Relaxed))
            .finish()
    }
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently handed out (or being opened).
    pub open: usize,
    /// Configured capacity.
    pub max_connections: usize,
    /// Connections closed as suspected leaks since startup.
    pub evictions: u64,
}

/// Bounded pool of `sqlx::AnyConnection`s.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
    dialect: Arc<dyn Dialect>,
}

impl ConnectionPool {
    /// Create a pool from configuration.
    ///
    /// Opens one probe connection to detect the engine and resolve its
    /// dialect; an unsupported engine is a configuration error.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        if config.max_connections == 0 {
            return Err(AppError::configuration(
                "database.max_connections must be at least 1",
            ));
        }

        sqlx::any::install_default_drivers();

        info!(
            url = %mask_password(&config.url),
            max_connections = config.max_connections,
            wait_attempts = config.acquire_wait_attempts,
            wait_interval_ms = config.acquire_wait_interval_ms,
            "Connecting to database"
        );

        let probe = AnyConnection::connect(&config.url).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to connect to database: {e}"),
                e,
            )
        })?;
        let product = probe.backend_name().to_string();
        if let Err(e) = probe.close().await {
            debug!(error = %e, "Failed to close probe connection");
        }
        let dialect = dialect::resolve(&product)?;

        let wait_interval = Duration::from_millis(config.acquire_wait_interval_ms);
        let inner = PoolInner {
            url: config.url.clone(),
            max_connections: config.max_connections,
            wait_budget: wait_interval * config.acquire_wait_attempts,
            wait_interval,
            tracked: Mutex::new(Vec::with_capacity(config.max_connections)),
            released: Notify::new(),
            next_id: AtomicU64::new(1),
            evictions: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        };

        info!(engine = %dialect.kind(), product = %product, "Connected to database");
        Ok(Self {
            inner: Arc::new(inner),
            dialect,
        })
    }

    /// The dialect of the connected engine.
    pub fn dialect(&self) -> Arc<dyn Dialect> {
        self.dialect.clone()
    }

    /// Acquire a connection, waiting for a release and finally evicting
    /// the oldest connection when the pool stays full.
    pub async fn acquire(&self) -> AppResult<PooledConnection> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(AppError::storage("Connection pool is closed"));
        }

        let Reservation {
            id,
            acquired_at,
            slot,
            mut guard,
        } = self.reserve().await;

        match AnyConnection::connect(&self.inner.url).await {
            Ok(conn) => {
                *guard = Some(conn);
                drop(guard);
                debug!(connection_id = id, "Connection acquired");
                Ok(PooledConnection {
                    id,
                    acquired_at,
                    slot,
                    pool: self.inner.clone(),
                })
            }
            Err(e) => {
                drop(guard);
                if self.inner.untrack(id) {
                    self.inner.released.notify_one();
                }
                Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to open connection: {e}"),
                    e,
                ))
            }
        }
    }

    async fn reserve(&self) -> Reservation {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let slot: Slot = Arc::new(AsyncMutex::new(None));
        let guard = slot.clone().lock_owned().await;

        let deadline = Instant::now() + self.inner.wait_budget;
        loop {
            if let Some(acquired_at) = self.inner.try_track(id, &slot) {
                return Reservation {
                    id,
                    acquired_at,
                    slot,
                    guard,
                };
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = self.inner.wait_interval.min(deadline - now);
            let _ = tokio::time::timeout(wait, self.inner.released.notified()).await;
        }

        let (acquired_at, victim) = self.inner.track_evicting(id, &slot);
        if let Some(victim) = victim {
            self.inner.evictions.fetch_add(1, Ordering::Relaxed);
            warn!(
                connection_id = victim.id,
                held_ms = victim.acquired_at.elapsed().as_millis() as u64,
                max_connections = self.inner.max_connections,
                "Connection pool exhausted; closing the oldest connection as a probable leak"
            );
            reclaim(victim, self.inner.wait_interval).await;
        }
        Reservation {
            id,
            acquired_at,
            slot,
            guard,
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            open: self.inner.tracked.lock().len(),
            max_connections: self.inner.max_connections,
            evictions: self.inner.evictions.load(Ordering::Relaxed),
        }
    }

    /// Number of connections currently open.
    pub fn open_count(&self) -> usize {
        self.inner.tracked.lock().len()
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> AppResult<bool> {
        let pooled = self.acquire().await?;
        let mut conn = pooled.lease().await?;
        conn.ping()
            .await
            .map(|_| true)
            .map_err(|e| AppError::with_source(ErrorKind::Storage, "Health check failed", e))
    }

    /// Close every tracked connection and refuse further acquisitions.
    pub async fn close_all(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let drained: Vec<Tracked> = std::mem::take(&mut *self.inner.tracked.lock());
        let count = drained.len();
        for entry in drained {
            reclaim(entry, self.inner.wait_interval).await;
        }
        self.inner.released.notify_waiters();
        info!(closed = count, "Connection pool closed");
    }
}

/// A connection checked out of the [`ConnectionPool`].
///
/// Dropping the handle closes the physical connection and frees its
/// slot. Use [`PooledConnection::lease`] to reach the connection itself.
pub struct PooledConnection {
    id: u64,
    acquired_at: Instant,
    slot: Slot,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    /// Pool-assigned identifier, used in log fields.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// How long this connection has been checked out.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Borrow the physical connection.
    ///
    /// Fails with a storage error if the pool has reclaimed it as a
    /// suspected leak.
    pub async fn lease(&self) -> AppResult<MappedMutexGuard<'_, AnyConnection>> {
        let reclaimed = || {
            AppError::storage(format!(
                "Connection {} was reclaimed by the pool",
                self.id
            ))
        };
        let guard = self.slot.lock().await;
        // An evicted slot may still hold its connection until the
        // detached close gets the lock.
        if !self.pool.is_tracked(self.id) {
            return Err(reclaimed());
        }
        MutexGuard::try_map(guard, Option::as_mut).map_err(|_| reclaimed())
    }

    /// Close the connection gracefully and release the slot.
    pub async fn close(self) {
        let conn = self.slot.lock().await.take();
        if let Some(conn) = conn {
            if let Err(e) = conn.close().await {
                debug!(connection_id = self.id, error = %e, "Error closing connection");
            }
        }
        // Drop releases the slot.
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("held_ms", &self.acquired_at.elapsed().as_millis())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // The physical connection goes away before the slot is freed so
        // the open count never exceeds capacity. If the slot is locked an
        // evictor owns it and closes the connection itself.
        if let Ok(mut slot) = self.slot.try_lock() {
            slot.take();
        }
        if self.pool.untrack(self.id) {
            debug!(
                connection_id = self.id,
                held_ms = self.acquired_at.elapsed().as_millis() as u64,
                "Connection released"
            );
            self.pool.released.notify_one();
        }
    }
}

/// Close a connection that is no longer tracked.
///
/// Waits at most `grace` for its holder to let go of a lease. A holder
/// that keeps it longer is not waited on: the close moves to a detached
/// task that runs once the lease is dropped, and the holder's next
/// `lease()` fails.
async fn reclaim(entry: Tracked, grace: Duration) {
    let Tracked { id, slot, .. } = entry;
    match tokio::time::timeout(grace, slot.clone().lock_owned()).await {
        Ok(mut guard) => {
            let conn = guard.take();
            drop(guard);
            close_quietly(id, conn).await;
        }
        Err(_) => {
            warn!(
                connection_id = id,
                grace_ms = grace.as_millis() as u64,
                "Reclaimed connection is still leased; closing it once released"
            );
            tokio::spawn(async move {
                let conn = slot.lock().await.take();
                close_quietly(id, conn).await;
            });
        }
    }
}

async fn close_quietly(id: u64, conn: Option<AnyConnection>) {
    if let Some(conn) = conn {
        if let Err(e) = conn.close().await {
            debug!(connection_id = id, error = %e, "Error closing connection");
        }
    }
}

/// Mask the password portion of a database URL for safe logging.
pub(crate) fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            if colon_pos > scheme_end {
                return format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..]);
            }
        }
    }
    url.to_string()
}
