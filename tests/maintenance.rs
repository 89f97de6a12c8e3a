//! Connection pressure, version retention, and lifecycle.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;

use vrepo::{AppError, CacheConfig, ErrorKind};

#[tokio::test]
async fn concurrent_readers_share_a_bounded_pool() {
    let t = common::open_with(|config| {
        config.cache = CacheConfig::disabled();
        config.database.max_connections = 2;
        config.database.acquire_wait_attempts = 400;
        config.database.acquire_wait_interval_ms = 25;
    })
    .await;
    for n in 0..4 {
        t.repo
            .create_resource(&format!("/load/file-{n}.txt"), format!("body {n}").as_bytes())
            .await
            .unwrap();
    }
    let service = t.repo.service().clone();
    let pool = service.store().pool().clone();

    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let monitor = {
        let (pool, peak, done) = (pool.clone(), peak.clone(), done.clone());
        tokio::spawn(async move {
            while !done.load(Ordering::Acquire) {
                peak.fetch_max(pool.open_count(), Ordering::Relaxed);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    let readers = (0..16).map(|n| {
        let service = service.clone();
        tokio::spawn(async move {
            let path = format!("/load/file-{}.txt", n % 4);
            let resource = service.get_resource(&path).await?;
            Ok::<_, AppError>((n % 4, resource.map(|r| r.content.clone())))
        })
    });
    for result in join_all(readers).await {
        let (n, content) = result.unwrap().unwrap();
        assert_eq!(content, Some(format!("body {n}").into_bytes()));
    }
    done.store(true, Ordering::Release);
    monitor.await.unwrap();

    assert!(peak.load(Ordering::Relaxed) <= 2);
    assert_eq!(pool.stats().evictions, 0);
    assert_eq!(pool.open_count(), 0);
}

#[tokio::test]
async fn retention_purges_old_history_only() {
    let t = common::open_with(|config| {
        config.repository.version_retention_days = 30;
    })
    .await;
    let path = "/kept/report.txt";
    t.repo.create_resource(path, b"r1").await.unwrap();
    t.repo.set_resource_content(path, b"r2").await.unwrap();
    t.repo.set_resource_content(path, b"r3").await.unwrap();
    t.repo.create_resource("/fresh.txt", b"f1").await.unwrap();
    t.repo.set_resource_content("/fresh.txt", b"f2").await.unwrap();

    let forty_days_ago = (Utc::now() - chrono::Duration::days(40)).timestamp_millis();
    t.repo
        .store()
        .transaction(move |conn| {
            Box::pin(async move {
                sqlx::query("UPDATE vrepo_versions SET created_at = ? WHERE ver_path = ?")
                    .bind(forty_days_ago)
                    .bind("/kept/report.txt")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| AppError::storage(e.to_string()))?;
                Ok::<(), AppError>(())
            })
        })
        .await
        .unwrap();

    let removed = t.repo.cleanup_old_versions().await.unwrap();
    assert_eq!(removed, 2);

    let history = t.repo.get_resource_versions(path).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version, 3);
    assert_eq!(history[0].content, b"r3");
    let current = t.repo.get_resource(path).await.unwrap().unwrap();
    assert_eq!(current.content, b"r3");

    assert_eq!(t.repo.get_resource_versions("/fresh.txt").await.unwrap().len(), 2);

    let next = t.repo.set_resource_content(path, b"r4").await.unwrap();
    assert_eq!(next.current_version, 4);
}

#[tokio::test]
async fn open_starts_and_stops_cleanup() {
    let t = common::open_with(|config| {
        config.repository.cleanup_interval_seconds = 3600;
    })
    .await;
    assert!(t.repo.has_cleanup_task());
    assert!(t.repo.health_check().await.unwrap());

    let pool = t.repo.store().pool().clone();
    t.repo.shutdown().await;
    assert_eq!(pool.open_count(), 0);
    let err = pool.acquire().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Storage);
}

#[tokio::test]
async fn open_rejects_bad_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::config(&dir);
    config.database.max_connections = 0;
    let err = vrepo::open(&config).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
}
