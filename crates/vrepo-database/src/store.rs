//! Repository facade over the DAO layer.
//!
//! [`RepositoryStore`] owns the pool and the four repositories. Every
//! logical write runs in one database transaction so that content and
//! its version row commit together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::{Any, AnyConnection, Connection, Transaction};
use tracing::{info, warn};

use vrepo_core::error::AppError;
use vrepo_core::result::AppResult;
use vrepo_core::types::{PageRequest, RepositoryPath};
use vrepo_entity::{FileVersion, Folder, RepositoryObject, Resource, ResourceMeta};

use crate::connection::ConnectionPool;
use crate::dialect::Dialect;
use crate::migration;
use crate::repositories::{
    FileRepository, FolderRepository, ObjectRow, SearchRepository, VersionRepository, db_error,
    find_object, from_millis, now_millis, to_millis,
};

/// Tunables for the store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Characters per stored text chunk.
    pub text_chunk_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            text_chunk_size: 16384,
        }
    }
}

/// Content for a resource write.
#[derive(Debug, Clone, Copy)]
pub struct NewContent<'a> {
    pub bytes: &'a [u8],
    pub binary: bool,
    pub content_type: &'a str,
}

/// Transactional facade over folders, resources, versions, and search.
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    pool: ConnectionPool,
    folders: FolderRepository,
    files: FileRepository,
    versions: VersionRepository,
    search: SearchRepository,
}

impl RepositoryStore {
    /// Bootstrap the schema and build the facade.
    pub async fn open(pool: ConnectionPool, options: StoreOptions) -> AppResult<Self> {
        let previous = migration::run_migrations(&pool).await?;
        info!(
            previous_schema = previous,
            schema = migration::SCHEMA_VERSION,
            "Repository store ready"
        );
        let dialect = pool.dialect();
        Ok(Self {
            folders: FolderRepository::new(dialect.clone()),
            files: FileRepository::new(dialect.clone(), options.text_chunk_size),
            versions: VersionRepository::new(dialect.clone()),
            search: SearchRepository::new(dialect),
            pool,
        })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// The active dialect.
    pub fn dialect(&self) -> Arc<dyn Dialect> {
        self.pool.dialect()
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> AppResult<bool> {
        self.pool.health_check().await
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close_all().await;
    }

    /// Run `work` inside one transaction on one pooled connection.
    ///
    /// The transaction commits when `work` succeeds and rolls back when it
    /// fails.
    pub async fn transaction<T, F>(&self, work: F) -> AppResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, AppResult<T>> + Send,
    {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = work(&mut *tx).await;
        finish(tx, result).await
    }

    // ── reads ───────────────────────────────────────────────────────

    /// Either kind of object at `path`. Root always exists.
    pub async fn object(&self, path: &RepositoryPath) -> AppResult<Option<RepositoryObject>> {
        if path.is_root() {
            return Ok(Some(RepositoryObject::Folder(Folder::root(from_millis(0)))));
        }
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        find_object(&mut conn, self.dialect().as_ref(), path)
            .await?
            .map(ObjectRow::into_object)
            .transpose()
    }

    /// The folder at `path`.
    pub async fn folder(&self, path: &RepositoryPath) -> AppResult<Option<Folder>> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        self.folders.find(&mut conn, path).await
    }

    /// Resource metadata at `path`.
    pub async fn resource_meta(&self, path: &RepositoryPath) -> AppResult<Option<ResourceMeta>> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        self.files.find(&mut conn, path).await
    }

    /// The resource at `path`, with content.
    pub async fn resource(&self, path: &RepositoryPath) -> AppResult<Option<Resource>> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        self.files.find_with_content(&mut conn, path).await
    }

    /// Direct children of the folder at `path`.
    pub async fn children(&self, path: &RepositoryPath) -> AppResult<Vec<RepositoryObject>> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        self.require_folder(&mut conn, path).await?;
        into_objects(self.folders.children(&mut conn, path).await?)
    }

    /// One page of direct children, with the total child count.
    pub async fn children_page(
        &self,
        path: &RepositoryPath,
        page: &PageRequest,
    ) -> AppResult<(Vec<RepositoryObject>, u64)> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        self.require_folder(&mut conn, path).await?;
        let (rows, total) = self.folders.children_page(&mut conn, path, page).await?;
        Ok((into_objects(rows)?, total))
    }

    /// Every object strictly beneath the folder at `path`, shallowest
    /// first.
    pub async fn descendants(&self, path: &RepositoryPath) -> AppResult<Vec<RepositoryObject>> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        self.require_folder(&mut conn, path).await?;
        into_objects(self.folders.descendants(&mut conn, path).await?)
    }

    /// Version history of `path`, oldest first.
    pub async fn versions(&self, path: &RepositoryPath) -> AppResult<Vec<FileVersion>> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        self.versions.list(&mut conn, path).await
    }

    /// One version of `path`.
    pub async fn version(&self, path: &RepositoryPath, number: i64) -> AppResult<Option<FileVersion>> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        self.versions.find(&mut conn, path, number).await
    }

    /// Objects whose name starts with `needle`.
    pub async fn search_name(
        &self,
        needle: &str,
        case_insensitive: bool,
        root: &RepositoryPath,
    ) -> AppResult<Vec<RepositoryObject>> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        into_objects(self.search.by_name(&mut conn, needle, case_insensitive, root).await?)
    }

    /// Objects whose path contains `needle`.
    pub async fn search_path(
        &self,
        needle: &str,
        case_insensitive: bool,
        root: &RepositoryPath,
    ) -> AppResult<Vec<RepositoryObject>> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        into_objects(self.search.by_path(&mut conn, needle, case_insensitive, root).await?)
    }

    /// Text resources whose content contains `needle`.
    pub async fn search_text(
        &self,
        needle: &str,
        case_insensitive: bool,
        root: &RepositoryPath,
    ) -> AppResult<Vec<RepositoryObject>> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        into_objects(self.search.by_text(&mut conn, needle, case_insensitive, root).await?)
    }

    // ── folder writes ───────────────────────────────────────────────

    /// Create the folder at `path` and any missing ancestors.
    pub async fn create_folder(&self, path: &RepositoryPath, user: &str) -> AppResult<Folder> {
        if path.is_root() {
            return Err(AppError::already_exists("The root folder always exists"));
        }
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = async {
            match find_object(&mut tx, self.dialect().as_ref(), path).await? {
                Some(row) if row.is_folder() => {
                    return Err(AppError::already_exists(format!(
                        "Folder '{path}' already exists"
                    )));
                }
                Some(_) => {
                    return Err(AppError::invalid_path(format!(
                        "A resource already exists at '{path}'"
                    )));
                }
                None => {}
            }
            self.folders.ensure(&mut tx, path, user, now_millis()).await?;
            self.require_folder(&mut tx, path).await
        }
        .await;
        finish(tx, result).await
    }

    /// Create the folder at `path` unless it already exists.
    pub async fn ensure_folder(&self, path: &RepositoryPath, user: &str) -> AppResult<Folder> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = async {
            self.folders.ensure(&mut tx, path, user, now_millis()).await?;
            self.require_folder(&mut tx, path).await
        }
        .await;
        finish(tx, result).await
    }

    /// Delete the folder at `path` with its whole subtree. Returns the
    /// number of objects removed, the folder included.
    pub async fn remove_folder(&self, path: &RepositoryPath) -> AppResult<u64> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = async {
            if path.is_root() {
                return Err(AppError::invalid_path("The root folder cannot be removed"));
            }
            self.require_folder(&mut tx, path).await?;
            self.folders.remove(&mut tx, path).await
        }
        .await;
        finish(tx, result).await
    }

    /// Move the folder at `from`, with its subtree and history, to `to`.
    pub async fn rename_folder(
        &self,
        from: &RepositoryPath,
        to: &RepositoryPath,
        user: &str,
    ) -> AppResult<()> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = async {
            self.check_move(&mut tx, from, to, true).await?;
            let now = now_millis();
            self.ensure_parent(&mut tx, to, user, now).await?;
            self.folders.rename(&mut tx, from, to, user, now).await
        }
        .await;
        finish(tx, result).await
    }

    /// Copy the folder at `from` and its subtree to `to`. Copied
    /// resources start a fresh history at version 1.
    pub async fn copy_folder(
        &self,
        from: &RepositoryPath,
        to: &RepositoryPath,
        user: &str,
    ) -> AppResult<Folder> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = async {
            self.check_move(&mut tx, from, to, true).await?;
            let now = now_millis();
            self.folders.ensure(&mut tx, to, user, now).await?;
            for row in self.folders.descendants(&mut tx, from).await? {
                let source = row.path();
                let Some(target) = source.rebase(from, to) else {
                    continue;
                };
                if row.is_folder() {
                    self.folders.ensure(&mut tx, &target, user, now).await?;
                    continue;
                }
                let meta = row.into_meta();
                let bytes = self.files.read_content(&mut tx, &source, meta.binary).await?;
                let content = NewContent {
                    bytes: &bytes,
                    binary: meta.binary,
                    content_type: &meta.content_type,
                };
                self.insert_resource(&mut tx, &target, content, user, now).await?;
            }
            self.require_folder(&mut tx, to).await
        }
        .await;
        finish(tx, result).await
    }

    // ── resource writes ─────────────────────────────────────────────

    /// Create the resource at `path`, creating missing parent folders,
    /// and record version 1.
    ///
    /// An existing resource is overwritten (recording a new version) when
    /// `overwrite` is set and is otherwise an `AlreadyExists` error.
    pub async fn create_resource(
        &self,
        path: &RepositoryPath,
        content: NewContent<'_>,
        overwrite: bool,
        user: &str,
    ) -> AppResult<ResourceMeta> {
        if path.is_root() {
            return Err(AppError::invalid_path("A resource cannot live at the root path"));
        }
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = async {
            let now = now_millis();
            match find_object(&mut tx, self.dialect().as_ref(), path).await? {
                Some(row) if row.is_folder() => {
                    return Err(AppError::invalid_path(format!(
                        "A folder already exists at '{path}'"
                    )));
                }
                Some(_) if !overwrite => {
                    return Err(AppError::already_exists(format!(
                        "Resource '{path}' already exists"
                    )));
                }
                Some(_) => {
                    self.write_resource(&mut tx, path, content, user, now).await?;
                }
                None => {
                    self.ensure_parent(&mut tx, path, user, now).await?;
                    self.insert_resource(&mut tx, path, content, user, now).await?;
                }
            }
            self.require_resource(&mut tx, path).await
        }
        .await;
        finish(tx, result).await
    }

    /// Replace the content of the resource at `path` and record a new
    /// version. The resource keeps its binary flag and content type.
    pub async fn set_content(
        &self,
        path: &RepositoryPath,
        bytes: &[u8],
        user: &str,
    ) -> AppResult<ResourceMeta> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = async {
            let meta = self.require_resource(&mut tx, path).await?;
            let content = NewContent {
                bytes,
                binary: meta.binary,
                content_type: &meta.content_type,
            };
            self.write_resource(&mut tx, path, content, user, now_millis())
                .await?;
            self.require_resource(&mut tx, path).await
        }
        .await;
        finish(tx, result).await
    }

    /// Delete the resource at `path` with its content and history.
    pub async fn remove_resource(&self, path: &RepositoryPath) -> AppResult<()> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = async {
            self.require_resource(&mut tx, path).await?;
            self.files.remove(&mut tx, path).await?;
            self.versions.remove_all(&mut tx, path).await?;
            Ok::<(), AppError>(())
        }
        .await;
        finish(tx, result).await
    }

    /// Move the resource at `from`, with its history, to `to`.
    pub async fn rename_resource(
        &self,
        from: &RepositoryPath,
        to: &RepositoryPath,
        user: &str,
    ) -> AppResult<ResourceMeta> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = async {
            self.check_move(&mut tx, from, to, false).await?;
            let now = now_millis();
            self.ensure_parent(&mut tx, to, user, now).await?;
            self.files.rename(&mut tx, from, to, user, now).await?;
            self.versions.rename(&mut tx, from, to).await?;
            self.require_resource(&mut tx, to).await
        }
        .await;
        finish(tx, result).await
    }

    /// Copy the resource at `from` to `to` as a new resource at version 1.
    pub async fn copy_resource(
        &self,
        from: &RepositoryPath,
        to: &RepositoryPath,
        user: &str,
    ) -> AppResult<ResourceMeta> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = async {
            self.check_move(&mut tx, from, to, false).await?;
            let now = now_millis();
            let source = self.require_resource(&mut tx, from).await?;
            let bytes = self.files.read_content(&mut tx, from, source.binary).await?;
            self.ensure_parent(&mut tx, to, user, now).await?;
            let content = NewContent {
                bytes: &bytes,
                binary: source.binary,
                content_type: &source.content_type,
            };
            self.insert_resource(&mut tx, to, content, user, now).await?;
            self.require_resource(&mut tx, to).await
        }
        .await;
        finish(tx, result).await
    }

    // ── versions ────────────────────────────────────────────────────

    /// Append a version snapshot for the live resource at `path` without
    /// touching its content. Returns the new version number; `NotFound`
    /// when no resource lives at `path`, so history never outlives its
    /// resource.
    pub async fn create_version(
        &self,
        path: &RepositoryPath,
        content: NewContent<'_>,
        user: &str,
    ) -> AppResult<i64> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = self
            .versions
            .append(
                &mut tx,
                path,
                content.bytes,
                content.binary,
                content.content_type,
                user,
                now_millis(),
            )
            .await;
        finish(tx, result).await
    }

    /// Purge versions created before `cutoff`, sparing every live
    /// resource's current version. Returns the number removed.
    pub async fn remove_versions_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let pooled = self.pool.acquire().await?;
        let mut conn = pooled.lease().await?;
        let mut tx = begin(&mut conn).await?;
        let result = self.versions.remove_before(&mut tx, to_millis(cutoff)).await;
        finish(tx, result).await
    }

    // ── helpers ─────────────────────────────────────────────────────

    async fn insert_resource(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
        content: NewContent<'_>,
        user: &str,
        now: i64,
    ) -> AppResult<i64> {
        let binary = self
            .files
            .create(
                conn,
                path,
                content.bytes,
                content.binary,
                content.content_type,
                user,
                now,
            )
            .await?;
        self.versions
            .append(conn, path, content.bytes, binary, content.content_type, user, now)
            .await
    }

    async fn write_resource(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
        content: NewContent<'_>,
        user: &str,
        now: i64,
    ) -> AppResult<i64> {
        let binary = self
            .files
            .update_content(
                conn,
                path,
                content.bytes,
                content.binary,
                content.content_type,
                user,
                now,
            )
            .await?;
        self.versions
            .append(conn, path, content.bytes, binary, content.content_type, user, now)
            .await
    }

    async fn ensure_parent(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
        user: &str,
        now: i64,
    ) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            self.folders.ensure(conn, &parent, user, now).await?;
        }
        Ok(())
    }

    /// Validate a rename or copy of a folder (`folder = true`) or a
    /// resource from `from` to `to`.
    async fn check_move(
        &self,
        conn: &mut AnyConnection,
        from: &RepositoryPath,
        to: &RepositoryPath,
        folder: bool,
    ) -> AppResult<()> {
        if from.is_root() || to.is_root() {
            return Err(AppError::invalid_path("The root folder cannot be moved or replaced"));
        }
        if from == to {
            return Err(AppError::invalid_path(format!(
                "Source and destination are both '{from}'"
            )));
        }
        if folder {
            if from.is_ancestor_of(to) {
                return Err(AppError::invalid_path(format!(
                    "Cannot move '{from}' into its own subtree '{to}'"
                )));
            }
            self.require_folder(conn, from).await?;
        } else {
            self.require_resource(conn, from).await?;
        }
        if find_object(conn, self.dialect().as_ref(), to).await?.is_some() {
            return Err(AppError::already_exists(format!("'{to}' already exists")));
        }
        Ok(())
    }

    async fn require_folder(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
    ) -> AppResult<Folder> {
        self.folders
            .find(conn, path)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder '{path}' does not exist")))
    }

    async fn require_resource(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
    ) -> AppResult<ResourceMeta> {
        self.files
            .find(conn, path)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Resource '{path}' does not exist")))
    }
}

fn into_objects(rows: Vec<ObjectRow>) -> AppResult<Vec<RepositoryObject>> {
    rows.into_iter().map(ObjectRow::into_object).collect()
}

async fn begin(conn: &mut AnyConnection) -> AppResult<Transaction<'_, Any>> {
    conn.begin()
        .await
        .map_err(|e| db_error("Failed to begin transaction", e))
}

async fn finish<T>(tx: Transaction<'_, Any>, result: AppResult<T>) -> AppResult<T> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| db_error("Failed to commit transaction", e))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "Failed to roll back transaction");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrepo_core::config::DatabaseConfig;
    use vrepo_core::error::ErrorKind;

    async fn store(dir: &tempfile::TempDir) -> RepositoryStore {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("store.db").display());
        let pool = ConnectionPool::connect(&DatabaseConfig::with_url(url))
            .await
            .unwrap();
        RepositoryStore::open(pool, StoreOptions { text_chunk_size: 8 })
            .await
            .unwrap()
    }

    fn text(body: &str) -> NewContent<'_> {
        NewContent {
            bytes: body.as_bytes(),
            binary: false,
            content_type: "text/plain",
        }
    }

    fn p(raw: &str) -> RepositoryPath {
        RepositoryPath::parse(raw)
    }

    #[tokio::test]
    async fn test_create_resource_cascades_and_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let meta = store
            .create_resource(&p("/a/b/file.txt"), text("hello"), false, "alice")
            .await
            .unwrap();
        assert_eq!(meta.current_version, 1);
        assert!(store.folder(&p("/a/b")).await.unwrap().is_some());

        let err = store
            .create_resource(&p("/a/b/file.txt"), text("again"), false, "alice")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyExists);

        let meta = store
            .create_resource(&p("/a/b/file.txt"), text("again"), true, "bob")
            .await
            .unwrap();
        assert_eq!(meta.current_version, 2);
        assert_eq!(meta.info.modified_by, "bob");
        assert_eq!(store.versions(&p("/a/b/file.txt")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_version_leaves_live_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let path = p("/notes.txt");
        store
            .create_resource(&path, text("live"), false, "u")
            .await
            .unwrap();

        let number = store.create_version(&path, text("snapshot"), "u").await.unwrap();
        assert_eq!(number, 2);
        let resource = store.resource(&path).await.unwrap().unwrap();
        assert_eq!(resource.content, b"live");
        let snapshot = store.version(&path, 2).await.unwrap().unwrap();
        assert_eq!(snapshot.content, b"snapshot");

    }

    #[tokio::test]
    async fn test_create_version_needs_live_resource() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let path = p("/x.txt");

        let err = store.create_version(&path, text("snap"), "u").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(store.versions(&path).await.unwrap().is_empty());

        let meta = store
            .create_resource(&path, text("live"), false, "u")
            .await
            .unwrap();
        assert_eq!(meta.current_version, 1);

        store.rename_resource(&path, &p("/y.txt"), "u").await.unwrap();
        store
            .create_resource(&path, text("again"), false, "u")
            .await
            .unwrap();
        assert_eq!(store.versions(&path).await.unwrap().len(), 1);
        assert_eq!(store.versions(&p("/y.txt")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_kind_clashes_are_invalid_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.create_folder(&p("/dir"), "u").await.unwrap();
        store
            .create_resource(&p("/file"), text("x"), false, "u")
            .await
            .unwrap();

        let err = store
            .create_resource(&p("/dir"), text("x"), true, "u")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPath);

        let err = store.create_folder(&p("/file/sub"), "u").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPath);

        let err = store.create_folder(&p("/dir"), "u").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store
            .create_resource(&p("/x/blocker"), text("x"), false, "u")
            .await
            .unwrap();

        let err = store
            .create_resource(&p("/x/blocker/leaf"), text("x"), false, "u")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPath);
        assert!(store.object(&p("/x/blocker/leaf")).await.unwrap().is_none());

        let result = store
            .transaction(|conn| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM vrepo_objects")
                        .execute(&mut *conn)
                        .await
                        .map_err(|e| db_error("delete", e))?;
                    Err::<(), _>(AppError::internal("abort"))
                })
            })
            .await;
        assert!(result.is_err());
        assert!(store.object(&p("/x/blocker")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rename_and_copy_resource() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store
            .create_resource(&p("/src.txt"), text("one"), false, "u")
            .await
            .unwrap();
        store.set_content(&p("/src.txt"), b"two", "u").await.unwrap();

        let moved = store
            .rename_resource(&p("/src.txt"), &p("/moved/dst.txt"), "u")
            .await
            .unwrap();
        assert_eq!(moved.current_version, 2);
        assert_eq!(store.versions(&p("/moved/dst.txt")).await.unwrap().len(), 2);
        assert!(store.versions(&p("/src.txt")).await.unwrap().is_empty());

        let copy = store
            .copy_resource(&p("/moved/dst.txt"), &p("/copy.txt"), "u")
            .await
            .unwrap();
        assert_eq!(copy.current_version, 1);
        let resource = store.resource(&p("/copy.txt")).await.unwrap().unwrap();
        assert_eq!(resource.content, b"two");

        let err = store
            .rename_resource(&p("/copy.txt"), &p("/moved/dst.txt"), "u")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_copy_folder_and_guard_against_self_nesting() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.create_folder(&p("/t/empty"), "u").await.unwrap();
        store
            .create_resource(&p("/t/sub/a.txt"), text("a long text body"), false, "u")
            .await
            .unwrap();

        store.copy_folder(&p("/t"), &p("/t2"), "u").await.unwrap();
        assert!(store.folder(&p("/t2/empty")).await.unwrap().is_some());
        let copied = store.resource(&p("/t2/sub/a.txt")).await.unwrap().unwrap();
        assert_eq!(copied.text(), Some("a long text body"));
        assert_eq!(copied.meta.current_version, 1);

        let err = store.rename_folder(&p("/t"), &p("/t/inner"), "u").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPath);
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let err = store.remove_resource(&p("/nothing")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        let err = store.remove_folder(&p("/nothing")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        let err = store.remove_folder(&RepositoryPath::root()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPath);
    }
}
