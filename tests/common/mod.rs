//! Shared helpers for the end-to-end tests.

#![allow(dead_code)]

use tempfile::TempDir;

use vrepo::{AppConfig, Repository};

/// A repository over a fresh SQLite file. Keep the `TempDir` alive for
/// as long as the repository is used.
pub struct TestRepo {
    pub repo: Repository,
    pub dir: TempDir,
}

/// Configuration pointing at a SQLite file inside `dir`.
pub fn config(dir: &TempDir) -> AppConfig {
    AppConfig::for_database(format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("repository.db").display()
    ))
}

/// Open a repository with default settings.
pub async fn open() -> TestRepo {
    open_with(|_| {}).await
}

/// Open a repository after adjusting the configuration.
pub async fn open_with(adjust: impl FnOnce(&mut AppConfig)) -> TestRepo {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir);
    adjust(&mut config);
    let repo = vrepo::open(&config).await.unwrap();
    TestRepo { repo, dir }
}
