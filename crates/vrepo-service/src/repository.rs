//! The repository facade.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use vrepo_cache::CacheManager;
use vrepo_core::config::RepositoryConfig;
use vrepo_core::error::AppError;
use vrepo_core::result::AppResult;
use vrepo_core::traits::ContentTypeResolver;
use vrepo_core::types::{PageRequest, PageResponse, RepositoryPath};
use vrepo_database::{NewContent, RepositoryStore};
use vrepo_entity::{FileVersion, Folder, RepositoryObject, Resource, ResourceMeta};

use crate::content_type::MimeGuessResolver;
use crate::locks::PathLocks;

/// How a resource is created.
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    /// Force binary or text storage. `None` decides from the content type.
    pub binary: Option<bool>,
    /// Explicit content type. `None` resolves it from the file extension.
    pub content_type: Option<String>,
    /// Overwrite an existing resource (recording a new version) instead
    /// of failing with `AlreadyExists`.
    pub overwrite: bool,
}

impl ResourceOptions {
    /// Options that overwrite an existing resource.
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            ..Self::default()
        }
    }
}

/// Path-addressed folders and versioned resources.
///
/// Cloning is cheap; clones share the store, cache, and locks. Use
/// [`RepositoryService::as_user`] to get a handle that records a
/// different user in the audit columns.
#[derive(Debug, Clone)]
pub struct RepositoryService {
    pub(crate) store: RepositoryStore,
    pub(crate) cache: CacheManager,
    pub(crate) locks: Arc<PathLocks>,
    pub(crate) resolver: Arc<dyn ContentTypeResolver>,
    retention_days: u32,
    user: Arc<str>,
}

impl RepositoryService {
    /// Creates a new repository service.
    pub fn new(store: RepositoryStore, cache: CacheManager, config: &RepositoryConfig) -> Self {
        Self {
            store,
            cache,
            locks: Arc::new(PathLocks::default()),
            resolver: Arc::new(MimeGuessResolver),
            retention_days: config.version_retention_days,
            user: Arc::from(config.default_user.as_str()),
        }
    }

    /// Use `resolver` for extension-based content types.
    pub fn with_resolver(mut self, resolver: Arc<dyn ContentTypeResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// A handle acting as `user`, sharing everything else.
    pub fn as_user(&self, user: &str) -> Self {
        Self {
            user: Arc::from(user),
            ..self.clone()
        }
    }

    /// The acting user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The underlying store.
    pub fn store(&self) -> &RepositoryStore {
        &self.store
    }

    /// The path cache.
    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// The content-type resolver.
    pub fn resolver(&self) -> &dyn ContentTypeResolver {
        self.resolver.as_ref()
    }

    // ── folders ─────────────────────────────────────────────────────

    /// The root folder.
    pub async fn get_root(&self) -> AppResult<Folder> {
        self.get_collection("/")
            .await?
            .ok_or_else(|| AppError::internal("Root folder is missing").at("get_root", "/"))
    }

    /// Create the folder at `path` and any missing ancestors.
    pub async fn create_collection(&self, path: &str) -> AppResult<Folder> {
        const OP: &str = "create_collection";
        let path = parse(OP, path)?;
        let _guard = self.locks.lock(&path).await;
        let folder = self
            .store
            .create_folder(&path, &self.user)
            .await
            .map_err(|e| e.at(OP, &path))?;
        self.cache.invalidate(&path).await;
        info!(path = %path, user = %self.user, "Collection created");
        Ok(folder)
    }

    /// The folder at `path`.
    pub async fn get_collection(&self, path: &str) -> AppResult<Option<Folder>> {
        const OP: &str = "get_collection";
        let path = parse(OP, path)?;
        match self.lookup(OP, &path).await? {
            Some(RepositoryObject::Folder(folder)) => Ok(Some(folder)),
            _ => Ok(None),
        }
    }

    /// Whether a folder exists at `path`.
    pub async fn has_collection(&self, path: &str) -> AppResult<bool> {
        Ok(self.get_collection(path).await?.is_some())
    }

    /// Delete the folder at `path` with everything beneath it. Returns the
    /// number of objects removed.
    pub async fn remove_collection(&self, path: &str) -> AppResult<u64> {
        const OP: &str = "remove_collection";
        let path = parse(OP, path)?;
        let _guard = self.locks.lock(&path).await;
        let removed = self
            .store
            .remove_folder(&path)
            .await
            .map_err(|e| e.at(OP, &path))?;
        self.cache.invalidate_subtree(&path).await;
        info!(path = %path, removed, user = %self.user, "Collection removed");
        Ok(removed)
    }

    /// Move the folder at `from` with its subtree to `to`.
    pub async fn rename_collection(&self, from: &str, to: &str) -> AppResult<Folder> {
        const OP: &str = "rename_collection";
        let from = parse(OP, from)?;
        let to = parse(OP, to)?;
        let _guard = self.locks.lock_all(&[&from, &to]).await;
        self.store
            .rename_folder(&from, &to, &self.user)
            .await
            .map_err(|e| e.at(OP, &from))?;
        self.cache.invalidate_subtree(&from).await;
        self.cache.invalidate_subtree(&to).await;
        info!(from = %from, to = %to, user = %self.user, "Collection renamed");
        self.store
            .folder(&to)
            .await
            .and_then(|f| f.ok_or_else(|| AppError::internal("Renamed folder is missing")))
            .map_err(|e| e.at(OP, &to))
    }

    /// Copy the folder at `from` with its subtree to `to`.
    pub async fn copy_collection(&self, from: &str, to: &str) -> AppResult<Folder> {
        const OP: &str = "copy_collection";
        let from = parse(OP, from)?;
        let to = parse(OP, to)?;
        let _guard = self.locks.lock_all(&[&from, &to]).await;
        let folder = self
            .store
            .copy_folder(&from, &to, &self.user)
            .await
            .map_err(|e| e.at(OP, &from))?;
        self.cache.invalidate_subtree(&to).await;
        info!(from = %from, to = %to, user = %self.user, "Collection copied");
        Ok(folder)
    }

    /// Direct children of the folder at `path`.
    pub async fn get_children(&self, path: &str) -> AppResult<Vec<RepositoryObject>> {
        const OP: &str = "get_children";
        let path = parse(OP, path)?;
        self.store.children(&path).await.map_err(|e| e.at(OP, &path))
    }

    /// One page of the direct children of the folder at `path`.
    pub async fn get_children_page(
        &self,
        path: &str,
        page: PageRequest,
    ) -> AppResult<PageResponse<RepositoryObject>> {
        const OP: &str = "get_children_page";
        let path = parse(OP, path)?;
        let (items, total) = self
            .store
            .children_page(&path, &page)
            .await
            .map_err(|e| e.at(OP, &path))?;
        Ok(PageResponse::new(items, &page, total))
    }

    // ── resources ───────────────────────────────────────────────────

    /// Create the resource at `path` with `content`, typed from its
    /// extension. Fails with `AlreadyExists` if it already exists.
    pub async fn create_resource(&self, path: &str, content: &[u8]) -> AppResult<ResourceMeta> {
        self.create_resource_with(path, content, ResourceOptions::default())
            .await
    }

    /// Create the resource at `path` with explicit options.
    pub async fn create_resource_with(
        &self,
        path: &str,
        content: &[u8],
        options: ResourceOptions,
    ) -> AppResult<ResourceMeta> {
        const OP: &str = "create_resource";
        let path = parse(OP, path)?;
        let content_type = options
            .content_type
            .unwrap_or_else(|| self.resolver.content_type(path.last_segment()));
        let binary = options
            .binary
            .unwrap_or_else(|| self.resolver.is_binary(&content_type));

        let _guard = self.locks.lock(&path).await;
        let meta = self
            .store
            .create_resource(
                &path,
                NewContent {
                    bytes: content,
                    binary,
                    content_type: &content_type,
                },
                options.overwrite,
                &self.user,
            )
            .await
            .map_err(|e| e.at(OP, &path))?;
        self.cache.invalidate(&path).await;
        info!(
            path = %path,
            version = meta.current_version,
            binary = meta.binary,
            size = meta.size,
            user = %self.user,
            "Resource written"
        );
        Ok(meta)
    }

    /// The resource at `path`, with content.
    pub async fn get_resource(&self, path: &str) -> AppResult<Option<Arc<Resource>>> {
        const OP: &str = "get_resource";
        let path = parse(OP, path)?;
        self.cache
            .resource(&path, || self.store.resource(&path))
            .await
            .map_err(|e| e.at(OP, &path))
    }

    /// Metadata of the resource at `path`.
    pub async fn get_resource_meta(&self, path: &str) -> AppResult<Option<ResourceMeta>> {
        const OP: &str = "get_resource_meta";
        let path = parse(OP, path)?;
        match self.lookup(OP, &path).await? {
            Some(RepositoryObject::Resource(meta)) => Ok(Some(meta)),
            _ => Ok(None),
        }
    }

    /// Whether a resource exists at `path`.
    pub async fn has_resource(&self, path: &str) -> AppResult<bool> {
        Ok(self.get_resource_meta(path).await?.is_some())
    }

    /// Replace the content of the resource at `path`, recording a new
    /// version.
    pub async fn set_resource_content(&self, path: &str, content: &[u8]) -> AppResult<ResourceMeta> {
        const OP: &str = "set_resource_content";
        let path = parse(OP, path)?;
        let _guard = self.locks.lock(&path).await;
        let meta = self
            .store
            .set_content(&path, content, &self.user)
            .await
            .map_err(|e| e.at(OP, &path))?;
        self.cache.invalidate(&path).await;
        info!(
            path = %path,
            version = meta.current_version,
            user = %self.user,
            "Resource content updated"
        );
        Ok(meta)
    }

    /// Delete the resource at `path` with its history.
    pub async fn remove_resource(&self, path: &str) -> AppResult<()> {
        const OP: &str = "remove_resource";
        let path = parse(OP, path)?;
        let _guard = self.locks.lock(&path).await;
        self.store
            .remove_resource(&path)
            .await
            .map_err(|e| e.at(OP, &path))?;
        self.cache.invalidate(&path).await;
        info!(path = %path, user = %self.user, "Resource removed");
        Ok(())
    }

    /// Move the resource at `from`, with its history, to `to`.
    pub async fn rename_resource(&self, from: &str, to: &str) -> AppResult<ResourceMeta> {
        const OP: &str = "rename_resource";
        let from = parse(OP, from)?;
        let to = parse(OP, to)?;
        let _guard = self.locks.lock_all(&[&from, &to]).await;
        let meta = self
            .store
            .rename_resource(&from, &to, &self.user)
            .await
            .map_err(|e| e.at(OP, &from))?;
        self.cache.invalidate(&from).await;
        self.cache.invalidate(&to).await;
        info!(from = %from, to = %to, user = %self.user, "Resource renamed");
        Ok(meta)
    }

    /// Copy the resource at `from` to `to` as a new resource.
    pub async fn copy_resource(&self, from: &str, to: &str) -> AppResult<ResourceMeta> {
        const OP: &str = "copy_resource";
        let from = parse(OP, from)?;
        let to = parse(OP, to)?;
        let _guard = self.locks.lock_all(&[&from, &to]).await;
        let meta = self
            .store
            .copy_resource(&from, &to, &self.user)
            .await
            .map_err(|e| e.at(OP, &from))?;
        self.cache.invalidate(&to).await;
        info!(from = %from, to = %to, user = %self.user, "Resource copied");
        Ok(meta)
    }

    // ── either kind ─────────────────────────────────────────────────

    /// The folder or resource at `path`.
    pub async fn get_object(&self, path: &str) -> AppResult<Option<RepositoryObject>> {
        const OP: &str = "get_object";
        let path = parse(OP, path)?;
        self.lookup(OP, &path).await
    }

    /// Whether anything exists at `path`.
    pub async fn exists(&self, path: &str) -> AppResult<bool> {
        Ok(self.get_object(path).await?.is_some())
    }

    // ── search ──────────────────────────────────────────────────────

    /// Objects whose name starts with `parameter`, anywhere.
    pub async fn search_name(
        &self,
        parameter: &str,
        case_insensitive: bool,
    ) -> AppResult<Vec<RepositoryObject>> {
        self.search_name_in(parameter, case_insensitive, "/").await
    }

    /// Objects under `root` whose name starts with `parameter`.
    pub async fn search_name_in(
        &self,
        parameter: &str,
        case_insensitive: bool,
        root: &str,
    ) -> AppResult<Vec<RepositoryObject>> {
        const OP: &str = "search_name";
        let root = parse(OP, root)?;
        let found = self
            .store
            .search_name(parameter, case_insensitive, &root)
            .await
            .map_err(|e| e.at(OP, &root))?;
        debug!(parameter, case_insensitive, root = %root, hits = found.len(), "Name search");
        Ok(found)
    }

    /// Objects whose path contains `parameter`, anywhere.
    pub async fn search_path(
        &self,
        parameter: &str,
        case_insensitive: bool,
    ) -> AppResult<Vec<RepositoryObject>> {
        self.search_path_in(parameter, case_insensitive, "/").await
    }

    /// Objects under `root` whose path contains `parameter`.
    pub async fn search_path_in(
        &self,
        parameter: &str,
        case_insensitive: bool,
        root: &str,
    ) -> AppResult<Vec<RepositoryObject>> {
        const OP: &str = "search_path";
        let root = parse(OP, root)?;
        let found = self
            .store
            .search_path(parameter, case_insensitive, &root)
            .await
            .map_err(|e| e.at(OP, &root))?;
        debug!(parameter, case_insensitive, root = %root, hits = found.len(), "Path search");
        Ok(found)
    }

    /// Text resources whose content contains `parameter`, anywhere.
    pub async fn search_text(
        &self,
        parameter: &str,
        case_insensitive: bool,
    ) -> AppResult<Vec<RepositoryObject>> {
        self.search_text_in(parameter, case_insensitive, "/").await
    }

    /// Text resources under `root` whose content contains `parameter`.
    pub async fn search_text_in(
        &self,
        parameter: &str,
        case_insensitive: bool,
        root: &str,
    ) -> AppResult<Vec<RepositoryObject>> {
        const OP: &str = "search_text";
        let root = parse(OP, root)?;
        let found = self
            .store
            .search_text(parameter, case_insensitive, &root)
            .await
            .map_err(|e| e.at(OP, &root))?;
        debug!(parameter, case_insensitive, root = %root, hits = found.len(), "Text search");
        Ok(found)
    }

    // ── versions ────────────────────────────────────────────────────

    /// Every version of the resource at `path`, oldest first. Empty for
    /// a path that never existed or was removed.
    pub async fn get_resource_versions(&self, path: &str) -> AppResult<Vec<FileVersion>> {
        const OP: &str = "get_resource_versions";
        let path = parse(OP, path)?;
        self.store.versions(&path).await.map_err(|e| e.at(OP, &path))
    }

    /// One version of the resource at `path`.
    pub async fn get_resource_version(
        &self,
        path: &str,
        version: i64,
    ) -> AppResult<Option<FileVersion>> {
        const OP: &str = "get_resource_version";
        let path = parse(OP, path)?;
        self.store
            .version(&path, version)
            .await
            .map_err(|e| e.at(OP, &path))
    }

    /// Purge versions older than the configured retention, keeping every
    /// live resource's current version. Returns the number removed.
    pub async fn cleanup_old_versions(&self) -> AppResult<u64> {
        const OP: &str = "cleanup_old_versions";
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let removed = self
            .store
            .remove_versions_before(cutoff)
            .await
            .map_err(|e| e.at(OP, "/"))?;
        info!(
            retention_days = self.retention_days,
            cutoff = %cutoff,
            removed,
            "Old versions cleaned up"
        );
        Ok(removed)
    }

    // ── lifecycle ───────────────────────────────────────────────────

    /// Check database connectivity.
    pub async fn health_check(&self) -> AppResult<bool> {
        self.store.health_check().await
    }

    /// Drop cached entries and close every pooled connection.
    pub async fn dispose(&self) {
        self.cache.clear().await;
        self.store.close().await;
        info!("Repository disposed");
    }

    async fn lookup(
        &self,
        op: &'static str,
        path: &RepositoryPath,
    ) -> AppResult<Option<RepositoryObject>> {
        self.cache
            .object(path, || self.store.object(path))
            .await
            .map_err(|e| e.at(op, path))
    }
}

/// Validate a caller-supplied path.
pub(crate) fn parse(op: &'static str, raw: &str) -> AppResult<RepositoryPath> {
    RepositoryPath::try_parse(raw).map_err(|e| e.at(op, raw))
}
