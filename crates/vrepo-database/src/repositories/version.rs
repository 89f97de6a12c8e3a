//! Version history repository.

use std::sync::Arc;

use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Row};
use tracing::debug;

use vrepo_core::error::AppError;
use vrepo_core::result::AppResult;
use vrepo_core::types::RepositoryPath;
use vrepo_entity::{FileVersion, ObjectKind};

use super::{db_error, from_millis};
use crate::dialect::Dialect;

const VERSION_COLUMNS: &str =
    "ver_path, ver_number, binary_flag, content_type, ver_content, created_by, created_at";

/// Repository for immutable version snapshots.
#[derive(Debug, Clone)]
pub struct VersionRepository {
    dialect: Arc<dyn Dialect>,
}

impl VersionRepository {
    /// Create a new version repository.
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }

    /// Record a new version of `path` and return its number.
    ///
    /// The number comes from bumping the live row's `current_version`
    /// inside the caller's transaction, so concurrent writers never hand
    /// out the same number and numbers never restart after cleanup. A
    /// path with no live resource has no history to extend and fails
    /// with `NotFound`.
    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
        content: &[u8],
        binary: bool,
        content_type: &str,
        user: &str,
        now: i64,
    ) -> AppResult<i64> {
        let key = path.to_string();
        let bumped = sqlx::query(&self.dialect.translate(
            "UPDATE vrepo_objects SET current_version = current_version + 1 \
             WHERE obj_path = ? AND obj_type = ?",
        ))
        .bind(key.clone())
        .bind(ObjectKind::Resource.code())
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to allocate version number", e))?;

        if bumped.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "No resource at '{path}' to record a version for"
            )));
        }
        let number: i64 = sqlx::query_scalar(
            &self
                .dialect
                .translate("SELECT current_version FROM vrepo_objects WHERE obj_path = ?"),
        )
        .bind(key.clone())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to read version number", e))?;

        let sql = self.dialect.translate(
            "INSERT INTO vrepo_versions (ver_path, ver_number, binary_flag, content_type, \
             ver_content, created_by, created_at, ver_size) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(number)
            .bind(i64::from(binary))
            .bind(content_type.to_string())
            .bind(content.to_vec())
            .bind(user.to_string())
            .bind(now)
            .bind(content.len() as i64)
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to insert version", e))?;

        debug!(path = %path, version = number, "Version recorded");
        Ok(number)
    }

    /// All versions of `path`, oldest first.
    pub async fn list(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
    ) -> AppResult<Vec<FileVersion>> {
        let sql = self.dialect.translate(&format!(
            "SELECT {VERSION_COLUMNS} FROM vrepo_versions WHERE ver_path = ? ORDER BY ver_number ASC"
        ));
        let rows = sqlx::query(&sql)
            .bind(path.to_string())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to list versions", e))?;
        rows.iter().map(|row| self.decode(row)).collect()
    }

    /// A single version of `path`.
    pub async fn find(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
        version: i64,
    ) -> AppResult<Option<FileVersion>> {
        let sql = self.dialect.translate(&format!(
            "SELECT {VERSION_COLUMNS} FROM vrepo_versions WHERE ver_path = ? AND ver_number = ?"
        ));
        let row = sqlx::query(&sql)
            .bind(path.to_string())
            .bind(version)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to find version", e))?;
        row.as_ref().map(|row| self.decode(row)).transpose()
    }

    /// Delete the whole history of `path`.
    pub async fn remove_all(&self, conn: &mut AnyConnection, path: &RepositoryPath) -> AppResult<u64> {
        let sql = self
            .dialect
            .translate("DELETE FROM vrepo_versions WHERE ver_path = ?");
        let result = sqlx::query(&sql)
            .bind(path.to_string())
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to remove versions", e))?;
        Ok(result.rows_affected())
    }

    /// Delete versions created before `cutoff` (epoch milliseconds),
    /// sparing each live resource's current version.
    pub async fn remove_before(&self, conn: &mut AnyConnection, cutoff: i64) -> AppResult<u64> {
        let sql = self.dialect.translate(
            "DELETE FROM vrepo_versions WHERE created_at < ? AND NOT EXISTS (\
                SELECT 1 FROM vrepo_objects o \
                WHERE o.obj_path = vrepo_versions.ver_path \
                AND o.current_version = vrepo_versions.ver_number)",
        );
        let result = sqlx::query(&sql)
            .bind(cutoff)
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to clean up versions", e))?;
        Ok(result.rows_affected())
    }

    /// Re-key the history of `from` to `to`.
    pub async fn rename(
        &self,
        conn: &mut AnyConnection,
        from: &RepositoryPath,
        to: &RepositoryPath,
    ) -> AppResult<u64> {
        let sql = self
            .dialect
            .translate("UPDATE vrepo_versions SET ver_path = ? WHERE ver_path = ?");
        let result = sqlx::query(&sql)
            .bind(to.to_string())
            .bind(from.to_string())
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to move versions", e))?;
        Ok(result.rows_affected())
    }

    fn decode(&self, row: &AnyRow) -> AppResult<FileVersion> {
        let get_err = |e| db_error("Failed to decode version", e);
        let path: String = row.try_get("ver_path").map_err(get_err)?;
        let binary: i64 = row.try_get("binary_flag").map_err(get_err)?;
        let content_type: Option<String> = row.try_get("content_type").map_err(get_err)?;
        let created_by: Option<String> = row.try_get("created_by").map_err(get_err)?;
        let created_at: i64 = row.try_get("created_at").map_err(get_err)?;
        Ok(FileVersion {
            path: RepositoryPath::parse(&path),
            version: row.try_get("ver_number").map_err(get_err)?,
            binary: binary != 0,
            content_type: content_type.unwrap_or_default(),
            content: self.dialect.read_binary(row, "ver_content")?,
            created_by: created_by.unwrap_or_default(),
            created_at: from_millis(created_at),
        })
    }
}
