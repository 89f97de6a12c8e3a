//! Zip export.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use vrepo_core::error::AppError;
use vrepo_core::result::AppResult;
use vrepo_core::types::RepositoryPath;
use vrepo_entity::RepositoryObject;

use super::{io_error, join_error, zip_error};
use crate::repository::{RepositoryService, parse};

/// One archive entry, named relative to the export base.
#[derive(Debug)]
enum Entry {
    Directory(String),
    File { name: String, content: Vec<u8> },
}

impl Entry {
    fn name(&self) -> &str {
        match self {
            Self::Directory(name) => name,
            Self::File { name, .. } => name,
        }
    }
}

impl RepositoryService {
    /// Export a single path.
    ///
    /// With `inclusive` the folder's own name is the top-level entry;
    /// without it the archive holds the folder's contents. A resource is
    /// always stored under its own name.
    pub async fn export_zip_single(&self, path: &str, inclusive: bool) -> AppResult<Vec<u8>> {
        self.export_zip(&[path], inclusive).await
    }

    /// Export several paths into one archive.
    ///
    /// With more than one root every root keeps its own name, whatever
    /// `inclusive` says, so that their entries cannot collide. Entries
    /// that still collide are skipped with a warning.
    pub async fn export_zip(&self, paths: &[&str], inclusive: bool) -> AppResult<Vec<u8>> {
        const OP: &str = "export_zip";
        let roots = paths
            .iter()
            .map(|p| parse(OP, p))
            .collect::<AppResult<Vec<_>>>()?;
        let keep_root = inclusive || roots.len() > 1;

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        for root in &roots {
            self.collect_entries(root, keep_root, &mut entries, &mut seen)
                .await
                .map_err(|e| e.at(OP, root))?;
        }

        let count = entries.len();
        let archive = tokio::task::spawn_blocking(move || write_archive(entries))
            .await
            .map_err(join_error)?
            .map_err(|e| e.at(OP, paths.join(",")))?;

        info!(
            roots = roots.len(),
            inclusive = keep_root,
            entries = count,
            bytes = archive.len(),
            "Archive exported"
        );
        Ok(archive)
    }

    /// Export into `writer`. Returns the number of bytes written.
    pub async fn export_zip_to<W>(
        &self,
        paths: &[&str],
        inclusive: bool,
        writer: &mut W,
    ) -> AppResult<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let archive = self.export_zip(paths, inclusive).await?;
        writer
            .write_all(&archive)
            .await
            .map_err(|e| AppError::from(e).at("export_zip", paths.join(",")))?;
        writer
            .flush()
            .await
            .map_err(|e| AppError::from(e).at("export_zip", paths.join(",")))?;
        Ok(archive.len() as u64)
    }

    async fn collect_entries(
        &self,
        root: &RepositoryPath,
        keep_root: bool,
        entries: &mut Vec<Entry>,
        seen: &mut HashSet<String>,
    ) -> AppResult<()> {
        let object = self
            .store
            .object(root)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Nothing exists at '{root}'")))?;
        let parent = root.parent().unwrap_or_else(RepositoryPath::root);

        if let RepositoryObject::Resource(_) = object {
            let content = self.read_content(root).await?;
            if let Some(name) = entry_name(root, &parent) {
                push(entries, seen, Entry::File { name, content });
            }
            return Ok(());
        }

        let base = if keep_root { parent } else { root.clone() };
        let descendants = self.store.descendants(root).await?;
        if descendants.is_empty() {
            if let Some(name) = entry_name(root, &base) {
                push(entries, seen, Entry::Directory(format!("{name}/")));
            }
            return Ok(());
        }

        let non_empty: HashSet<RepositoryPath> = descendants
            .iter()
            .filter_map(|object| object.path().parent())
            .collect();
        for object in descendants {
            let path = object.path().clone();
            let Some(name) = entry_name(&path, &base) else {
                continue;
            };
            match object {
                RepositoryObject::Folder(_) if non_empty.contains(&path) => {}
                RepositoryObject::Folder(_) => {
                    push(entries, seen, Entry::Directory(format!("{name}/")));
                }
                RepositoryObject::Resource(_) => {
                    let content = self.read_content(&path).await?;
                    push(entries, seen, Entry::File { name, content });
                }
            }
        }
        Ok(())
    }

    async fn read_content(&self, path: &RepositoryPath) -> AppResult<Vec<u8>> {
        self.store
            .resource(path)
            .await?
            .map(|resource| resource.content)
            .ok_or_else(|| AppError::not_found(format!("Resource '{path}' vanished during export")))
    }
}

fn entry_name(path: &RepositoryPath, base: &RepositoryPath) -> Option<String> {
    path.relative_to(base).filter(|name| !name.is_empty())
}

fn push(entries: &mut Vec<Entry>, seen: &mut HashSet<String>, entry: Entry) {
    if !seen.insert(entry.name().to_string()) {
        warn!(entry = entry.name(), "Duplicate archive entry skipped");
        return;
    }
    entries.push(entry);
}

fn write_archive(entries: Vec<Entry>) -> AppResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries {
        match entry {
            Entry::Directory(name) => writer
                .add_directory(name, options)
                .map_err(|e| zip_error("Failed to add directory entry", e))?,
            Entry::File { name, content } => {
                writer
                    .start_file(name, options)
                    .map_err(|e| zip_error("Failed to start archive entry", e))?;
                writer
                    .write_all(&content)
                    .map_err(|e| io_error("Failed to write archive entry", e))?;
            }
        }
    }

    let cursor = writer
        .finish()
        .map_err(|e| zip_error("Failed to finish archive", e))?;
    Ok(cursor.into_inner())
}
