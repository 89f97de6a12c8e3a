//! Resource repository implementation.
//!
//! Text content is stored as ordered chunks in `vrepo_documents`;
//! binary content as a single blob in `vrepo_binaries`. Content that is
//! declared textual but is not valid UTF-8 is stored as binary.

use std::sync::Arc;

use sqlx::{AnyConnection, Row};
use tracing::debug;

use vrepo_core::error::AppError;
use vrepo_core::result::AppResult;
use vrepo_core::types::RepositoryPath;
use vrepo_entity::{ObjectKind, Resource, ResourceMeta};

use super::{NewObject, ObjectRow, db_error, find_object, insert_object};
use crate::dialect::Dialect;

/// Repository for resource rows and their current content.
#[derive(Debug, Clone)]
pub struct FileRepository {
    dialect: Arc<dyn Dialect>,
    chunk_size: usize,
}

impl FileRepository {
    /// Create a new resource repository storing text in chunks of
    /// `chunk_size` characters.
    pub fn new(dialect: Arc<dyn Dialect>, chunk_size: usize) -> Self {
        Self {
            dialect,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Find resource metadata by path.
    pub async fn find(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
    ) -> AppResult<Option<ResourceMeta>> {
        Ok(find_object(conn, self.dialect.as_ref(), path)
            .await?
            .filter(|row| !row.is_folder())
            .map(ObjectRow::into_meta))
    }

    /// Find a resource together with its content.
    pub async fn find_with_content(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
    ) -> AppResult<Option<Resource>> {
        let Some(meta) = self.find(conn, path).await? else {
            return Ok(None);
        };
        let content = self.read_content(conn, path, meta.binary).await?;
        Ok(Some(Resource { meta, content }))
    }

    /// Current content of the resource at `path`.
    pub async fn read_content(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
        binary: bool,
    ) -> AppResult<Vec<u8>> {
        if binary {
            let sql = self
                .dialect
                .translate("SELECT bin_content FROM vrepo_binaries WHERE bin_path = ?");
            let row = sqlx::query(&sql)
                .bind(path.to_string())
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| db_error("Failed to read binary content", e))?;
            return match row {
                Some(row) => self.dialect.read_binary(&row, "bin_content"),
                None => Ok(Vec::new()),
            };
        }

        read_document(conn, self.dialect.as_ref(), &path.to_string())
            .await
            .map(String::into_bytes)
    }

    /// Insert a resource row and its content. The parent folder must
    /// exist. Returns whether the content was stored as binary.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
        content: &[u8],
        binary: bool,
        content_type: &str,
        user: &str,
        now: i64,
    ) -> AppResult<bool> {
        let binary = stores_as_binary(content, binary);
        insert_object(
            conn,
            self.dialect.as_ref(),
            &NewObject {
                path,
                kind: ObjectKind::Resource,
                binary,
                content_type: Some(content_type),
                size: content.len() as i64,
                user,
                now,
            },
        )
        .await?;
        self.write_content(conn, path, content, binary).await?;
        debug!(path = %path, size = content.len(), binary, "Resource created");
        Ok(binary)
    }

    /// Replace the content of an existing resource and stamp the
    /// modification. Returns whether the content was stored as binary.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_content(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
        content: &[u8],
        binary: bool,
        content_type: &str,
        user: &str,
        now: i64,
    ) -> AppResult<bool> {
        let binary = stores_as_binary(content, binary);
        let sql = self.dialect.translate(
            "UPDATE vrepo_objects SET binary_flag = ?, content_type = ?, content_size = ?, \
             modified_by = ?, modified_at = ? WHERE obj_path = ? AND obj_type = ?",
        );
        let result = sqlx::query(&sql)
            .bind(i64::from(binary))
            .bind(content_type.to_string())
            .bind(content.len() as i64)
            .bind(user.to_string())
            .bind(now)
            .bind(path.to_string())
            .bind(ObjectKind::Resource.code())
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to update resource", e))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Resource '{path}' does not exist")));
        }
        self.write_content(conn, path, content, binary).await?;
        debug!(path = %path, size = content.len(), binary, "Resource content updated");
        Ok(binary)
    }

    async fn write_content(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
        content: &[u8],
        binary: bool,
    ) -> AppResult<()> {
        self.delete_content(conn, path).await?;
        let key = path.to_string();

        if binary {
            let sql = self
                .dialect
                .translate("INSERT INTO vrepo_binaries (bin_path, bin_content) VALUES (?, ?)");
            sqlx::query(&sql)
                .bind(key)
                .bind(content.to_vec())
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error("Failed to store binary content", e))?;
            return Ok(());
        }

        let text = std::str::from_utf8(content)
            .map_err(|e| AppError::internal(format!("Text content is not UTF-8: {e}")))?;
        let sql = self.dialect.translate(
            "INSERT INTO vrepo_documents (doc_path, chunk_index, chunk_text) VALUES (?, ?, ?)",
        );
        for (index, chunk) in split_chunks(text, self.chunk_size).into_iter().enumerate() {
            sqlx::query(&sql)
                .bind(key.clone())
                .bind(index as i64)
                .bind(chunk.to_string())
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error("Failed to store document chunk", e))?;
        }
        Ok(())
    }

    async fn delete_content(&self, conn: &mut AnyConnection, path: &RepositoryPath) -> AppResult<()> {
        for sql in [
            "DELETE FROM vrepo_documents WHERE doc_path = ?",
            "DELETE FROM vrepo_binaries WHERE bin_path = ?",
        ] {
            sqlx::query(&self.dialect.translate(sql))
                .bind(path.to_string())
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error("Failed to delete content", e))?;
        }
        Ok(())
    }

    /// Delete the resource row and its content. Version history is left
    /// to [`super::VersionRepository::remove_all`]. Returns `false` when
    /// nothing was stored at `path`.
    pub async fn remove(&self, conn: &mut AnyConnection, path: &RepositoryPath) -> AppResult<bool> {
        self.delete_content(conn, path).await?;
        let sql = self
            .dialect
            .translate("DELETE FROM vrepo_objects WHERE obj_path = ? AND obj_type = ?");
        let result = sqlx::query(&sql)
            .bind(path.to_string())
            .bind(ObjectKind::Resource.code())
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to remove resource", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a resource row and its content from `from` to `to`.
    pub async fn rename(
        &self,
        conn: &mut AnyConnection,
        from: &RepositoryPath,
        to: &RepositoryPath,
        user: &str,
        now: i64,
    ) -> AppResult<()> {
        let parent = to.parent().unwrap_or_else(RepositoryPath::root).to_string();
        let sql = self.dialect.translate(
            "UPDATE vrepo_objects SET obj_path = ?, obj_name = ?, obj_parent = ?, \
             modified_by = ?, modified_at = ? WHERE obj_path = ?",
        );
        sqlx::query(&sql)
            .bind(to.to_string())
            .bind(to.last_segment().to_string())
            .bind(parent)
            .bind(user.to_string())
            .bind(now)
            .bind(from.to_string())
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to rename resource", e))?;

        for sql in [
            "UPDATE vrepo_documents SET doc_path = ? WHERE doc_path = ?",
            "UPDATE vrepo_binaries SET bin_path = ? WHERE bin_path = ?",
        ] {
            sqlx::query(&self.dialect.translate(sql))
                .bind(to.to_string())
                .bind(from.to_string())
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error("Failed to move resource content", e))?;
        }
        debug!(from = %from, to = %to, "Resource renamed");
        Ok(())
    }
}

fn stores_as_binary(content: &[u8], binary: bool) -> bool {
    binary || std::str::from_utf8(content).is_err()
}

/// Split `text` into pieces of at most `size` characters.
pub(crate) fn split_chunks(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (index, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..index]);
            start = index;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// Reassemble the text document stored at `path` from its chunks.
pub(crate) async fn read_document(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    path: &str,
) -> AppResult<String> {
    let sql = dialect.translate(
        "SELECT chunk_text FROM vrepo_documents WHERE doc_path = ? ORDER BY chunk_index ASC",
    );
    let rows = sqlx::query(&sql)
        .bind(path.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to read document content", e))?;
    let mut text = String::new();
    for row in rows {
        let chunk: String = row
            .try_get("chunk_text")
            .map_err(|e| db_error("Failed to decode document chunk", e))?;
        text.push_str(&chunk);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionPool;
    use crate::migration::run_migrations;
    use vrepo_core::config::DatabaseConfig;

    async fn setup(dir: &tempfile::TempDir, chunk: usize) -> (ConnectionPool, FileRepository) {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("files.db").display());
        let pool = ConnectionPool::connect(&DatabaseConfig::with_url(url))
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = FileRepository::new(pool.dialect(), chunk);
        (pool, repo)
    }

    #[test]
    fn test_split_chunks_respects_char_boundaries() {
        assert_eq!(split_chunks("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(split_chunks("äöüß", 3), vec!["äöü", "ß"]);
        assert!(split_chunks("", 3).is_empty());
        assert_eq!(split_chunks("abc", 3), vec!["abc"]);
    }

    #[tokio::test]
    async fn test_text_round_trips_through_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, repo) = setup(&dir, 4).await;
        let pooled = pool.acquire().await.unwrap();
        let mut conn = pooled.lease().await.unwrap();

        let path = RepositoryPath::parse("/notes.txt");
        let text = "The quick brown fox jumps over the lazy dog";
        let binary = repo
            .create(&mut conn, &path, text.as_bytes(), false, "text/plain", "bob", 10)
            .await
            .unwrap();
        assert!(!binary);

        let resource = repo.find_with_content(&mut conn, &path).await.unwrap().unwrap();
        assert_eq!(resource.text(), Some(text));
        assert_eq!(resource.meta.size, text.len() as i64);
        assert_eq!(resource.meta.content_type, "text/plain");
        assert_eq!(resource.meta.info.created_by, "bob");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_stored_as_binary() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, repo) = setup(&dir, 16).await;
        let pooled = pool.acquire().await.unwrap();
        let mut conn = pooled.lease().await.unwrap();

        let path = RepositoryPath::parse("/blob.txt");
        let bytes = vec![0xff, 0x00, 0xfe];
        let binary = repo
            .create(&mut conn, &path, &bytes, false, "text/plain", "u", 1)
            .await
            .unwrap();
        assert!(binary);
        let resource = repo.find_with_content(&mut conn, &path).await.unwrap().unwrap();
        assert!(resource.meta.binary);
        assert_eq!(resource.content, bytes);
    }

    #[tokio::test]
    async fn test_update_switches_storage_and_rename_moves_content() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, repo) = setup(&dir, 16).await;
        let pooled = pool.acquire().await.unwrap();
        let mut conn = pooled.lease().await.unwrap();

        let path = RepositoryPath::parse("/data.bin");
        repo.create(&mut conn, &path, &[1, 2, 3], true, "application/octet-stream", "u", 1)
            .await
            .unwrap();
        repo.update_content(&mut conn, &path, b"now text", false, "text/plain", "v", 2)
            .await
            .unwrap();
        let resource = repo.find_with_content(&mut conn, &path).await.unwrap().unwrap();
        assert!(!resource.meta.binary);
        assert_eq!(resource.content, b"now text");
        assert_eq!(resource.meta.info.modified_by, "v");

        let moved = RepositoryPath::parse("/data2.bin");
        repo.rename(&mut conn, &path, &moved, "w", 3).await.unwrap();
        assert!(repo.find(&mut conn, &path).await.unwrap().is_none());
        let resource = repo.find_with_content(&mut conn, &moved).await.unwrap().unwrap();
        assert_eq!(resource.content, b"now text");
        assert_eq!(resource.meta.info.name, "data2.bin");

        assert!(repo.remove(&mut conn, &moved).await.unwrap());
        assert!(!repo.remove(&mut conn, &moved).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_resource_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, repo) = setup(&dir, 16).await;
        let pooled = pool.acquire().await.unwrap();
        let mut conn = pooled.lease().await.unwrap();
        let err = repo
            .update_content(&mut conn, &RepositoryPath::parse("/nope"), b"x", false, "text/plain", "u", 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind, vrepo_core::error::ErrorKind::NotFound);
    }
}
