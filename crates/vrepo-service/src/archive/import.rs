//! Zip import.

use std::io::{Cursor, Read};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use vrepo_core::error::ErrorKind;
use vrepo_core::result::AppResult;
use vrepo_core::types::RepositoryPath;
use vrepo_database::NewContent;

use super::{ImportSummary, io_error, join_error, zip_error};
use crate::repository::{RepositoryService, parse};

/// Upper bound on the buffer reserved up front for one entry; the
/// declared size in the archive header is not trusted beyond this.
const MAX_PREALLOCATION: u64 = 1 << 20;

/// A decoded archive entry with a sanitized relative name.
#[derive(Debug)]
struct ImportEntry {
    name: String,
    directory: bool,
    content: Vec<u8>,
}

impl RepositoryService {
    /// Import the archive read from `reader` under `root`.
    ///
    /// Directory entries become folders (with their ancestors). File
    /// entries become resources typed by extension. Without `overwrite`
    /// an existing resource is left alone and counted as skipped; with it
    /// the resource gets a new version.
    pub async fn import_zip<R>(
        &self,
        mut reader: R,
        root: &str,
        overwrite: bool,
    ) -> AppResult<ImportSummary>
    where
        R: AsyncRead + Unpin,
    {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| io_error("Failed to read archive", e).at("import_zip", root))?;
        self.import_zip_bytes(bytes, root, overwrite).await
    }

    /// Import an in-memory archive under `root`.
    pub async fn import_zip_bytes(
        &self,
        archive: Vec<u8>,
        root: &str,
        overwrite: bool,
    ) -> AppResult<ImportSummary> {
        const OP: &str = "import_zip";
        let root = parse(OP, root)?;
        let (entries, unsafe_names) = tokio::task::spawn_blocking(move || read_archive(archive))
            .await
            .map_err(join_error)?
            .map_err(|e| e.at(OP, &root))?;

        let mut summary = ImportSummary {
            skipped: unsafe_names,
            ..ImportSummary::default()
        };
        for entry in entries {
            let target = root.append(&entry.name);
            if entry.directory {
                self.import_folder(&target)
                    .await
                    .map_err(|e| e.at(OP, &target))?;
                summary.folders += 1;
            } else if self
                .import_resource(&target, &entry.content, overwrite)
                .await
                .map_err(|e| e.at(OP, &target))?
            {
                summary.resources += 1;
            } else {
                debug!(path = %target, "Existing resource kept");
                summary.skipped += 1;
            }
        }

        info!(
            root = %root,
            overwrite,
            folders = summary.folders,
            resources = summary.resources,
            skipped = summary.skipped,
            user = %self.user(),
            "Archive imported"
        );
        Ok(summary)
    }

    async fn import_folder(&self, path: &RepositoryPath) -> AppResult<()> {
        let _guard = self.locks.lock(path).await;
        self.store.ensure_folder(path, self.user()).await?;
        self.cache.invalidate(path).await;
        Ok(())
    }

    /// Returns `false` when an existing resource was kept.
    async fn import_resource(
        &self,
        path: &RepositoryPath,
        bytes: &[u8],
        overwrite: bool,
    ) -> AppResult<bool> {
        let content_type = self.resolver.content_type(path.last_segment());
        let content = NewContent {
            bytes,
            binary: self.resolver.is_binary(&content_type),
            content_type: &content_type,
        };

        let _guard = self.locks.lock(path).await;
        match self
            .store
            .create_resource(path, content, overwrite, self.user())
            .await
        {
            Ok(_) => {
                self.cache.invalidate(path).await;
                Ok(true)
            }
            Err(e) if !overwrite && e.is(ErrorKind::AlreadyExists) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Decode every entry. Returns the entries in archive order and the
/// number of entries skipped for unsafe names.
fn read_archive(archive: Vec<u8>) -> AppResult<(Vec<ImportEntry>, u64)> {
    let mut archive =
        ZipArchive::new(Cursor::new(archive)).map_err(|e| zip_error("Failed to open archive", e))?;

    let mut entries = Vec::with_capacity(archive.len());
    let mut skipped = 0;
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| zip_error("Failed to read archive entry", e))?;

        let raw = file.name().to_string();
        let Some(name) = sanitize(&raw) else {
            warn!(entry = %raw, "Unsafe archive entry skipped");
            skipped += 1;
            continue;
        };

        if file.is_dir() {
            entries.push(ImportEntry {
                name,
                directory: true,
                content: Vec::new(),
            });
            continue;
        }

        let mut content = Vec::with_capacity(file.size().min(MAX_PREALLOCATION) as usize);
        file.read_to_end(&mut content)
            .map_err(|e| io_error(&format!("Failed to decompress '{raw}'"), e))?;
        entries.push(ImportEntry {
            name,
            directory: false,
            content,
        });
    }
    Ok((entries, skipped))
}

/// Relative, `/`-separated form of an entry name, or `None` when the
/// name is absolute, names a drive, climbs out with `..`, or is empty.
fn sanitize(raw: &str) -> Option<String> {
    let normalized = raw.replace('\\', "/");
    if normalized.starts_with('/') {
        return None;
    }

    let mut segments = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if segments.is_empty() && s.ends_with(':') => return None,
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use vrepo_core::config::CacheConfig;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use crate::testing::service;

    fn archive(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            match content {
                None => writer.add_directory(*name, options).unwrap(),
                Some(bytes) => {
                    writer.start_file(*name, options).unwrap();
                    writer.write_all(bytes).unwrap();
                }
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a/b.txt").as_deref(), Some("a/b.txt"));
        assert_eq!(sanitize("a\\b\\c.txt").as_deref(), Some("a/b/c.txt"));
        assert_eq!(sanitize("./a//b/").as_deref(), Some("a/b"));
        assert_eq!(sanitize("/etc/passwd"), None);
        assert_eq!(sanitize("a/../../b"), None);
        assert_eq!(sanitize("C:/windows"), None);
        assert_eq!(sanitize("./"), None);
    }

    #[tokio::test]
    async fn test_import_creates_tree() {
        let dir = tempfile::tempdir().unwrap();
        let repo = service(&dir, CacheConfig::default()).await;

        let bytes = archive(&[
            ("docs/", None),
            ("docs/empty/", None),
            ("docs/readme.txt", Some(&b"hello"[..])),
            ("img/logo.png", Some(&[0x89, 0x50][..])),
        ]);
        let summary = repo.import_zip_bytes(bytes, "/target", false).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                folders: 2,
                resources: 2,
                skipped: 0
            }
        );

        assert!(repo.has_collection("/target/docs/empty").await.unwrap());
        assert!(repo.has_collection("/target/img").await.unwrap());
        let readme = repo.get_resource("/target/docs/readme.txt").await.unwrap().unwrap();
        assert_eq!(readme.content, b"hello");
        assert!(!readme.meta.binary);
        let logo = repo.get_resource("/target/img/logo.png").await.unwrap().unwrap();
        assert!(logo.meta.binary);
        assert_eq!(logo.meta.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_import_override_policy() {
        let dir = tempfile::tempdir().unwrap();
        let repo = service(&dir, CacheConfig::default()).await;
        repo.create_resource("/r/a.txt", b"original").await.unwrap();

        let bytes = archive(&[("a.txt", Some(&b"incoming"[..])), ("b.txt", Some(&b"new"[..]))]);
        let kept = repo.import_zip_bytes(bytes.clone(), "/r", false).await.unwrap();
        assert_eq!((kept.resources, kept.skipped), (1, 1));
        let a = repo.get_resource("/r/a.txt").await.unwrap().unwrap();
        assert_eq!(a.content, b"original");

        let replaced = repo.import_zip_bytes(bytes, "/r", true).await.unwrap();
        assert_eq!((replaced.resources, replaced.skipped), (2, 0));
        let a = repo.get_resource("/r/a.txt").await.unwrap().unwrap();
        assert_eq!(a.content, b"incoming");
        assert_eq!(a.meta.current_version, 2);
    }

    #[tokio::test]
    async fn test_import_skips_unsafe_names() {
        let dir = tempfile::tempdir().unwrap();
        let repo = service(&dir, CacheConfig::default()).await;

        let bytes = archive(&[("../escape.txt", Some(&b"x"[..])), ("ok.txt", Some(&b"y"[..]))]);
        let summary = repo.import_zip_bytes(bytes, "/in", false).await.unwrap();
        assert_eq!((summary.resources, summary.skipped), (1, 1));
        assert!(!repo.exists("/escape.txt").await.unwrap());
        assert!(repo.has_resource("/in/ok.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_import_folder_in_the_way() {
        let dir = tempfile::tempdir().unwrap();
        let repo = service(&dir, CacheConfig::default()).await;
        repo.create_collection("/in/clash.txt").await.unwrap();

        let bytes = archive(&[("clash.txt", Some(&b"x"[..]))]);
        let err = repo.import_zip_bytes(bytes, "/in", true).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPath);
        assert_eq!(err.operation, Some("import_zip"));
        assert_eq!(err.path.as_deref(), Some("/in/clash.txt"));
    }

    #[tokio::test]
    async fn test_import_malformed_archive() {
        let dir = tempfile::tempdir().unwrap();
        let repo = service(&dir, CacheConfig::default()).await;

        let err = repo
            .import_zip(&b"definitely not a zip"[..], "/", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Archive);
    }
}
