//! Folder repository implementation.

use std::sync::Arc;

use sqlx::AnyConnection;
use tracing::debug;

use vrepo_core::error::AppError;
use vrepo_core::result::AppResult;
use vrepo_core::types::{PageRequest, RepositoryPath};
use vrepo_entity::{Folder, ObjectKind};

use super::{
    NewObject, OBJECT_COLUMNS, ObjectRow, char_len, db_error, find_object, from_millis, insert_object,
    subtree_binds, subtree_clause,
};
use crate::dialect::Dialect;

/// Tables holding path-keyed rows, with their path column.
const PATH_TABLES: &[(&str, &str)] = &[
    ("vrepo_objects", "obj_path"),
    ("vrepo_documents", "doc_path"),
    ("vrepo_binaries", "bin_path"),
    ("vrepo_versions", "ver_path"),
];

/// Repository for folder rows and subtree operations.
#[derive(Debug, Clone)]
pub struct FolderRepository {
    dialect: Arc<dyn Dialect>,
}

impl FolderRepository {
    /// Create a new folder repository.
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }

    /// Find a folder by path. Root always exists.
    pub async fn find(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
    ) -> AppResult<Option<Folder>> {
        if path.is_root() {
            return Ok(Some(Folder::root(from_millis(0))));
        }
        Ok(find_object(conn, self.dialect.as_ref(), path)
            .await?
            .filter(ObjectRow::is_folder)
            .map(ObjectRow::into_folder))
    }

    /// Create `path` and every missing ancestor.
    ///
    /// Existing ancestor folders are left alone; an ancestor occupied by
    /// a resource is an invalid path. Returns the paths that were
    /// actually created, shallowest first.
    pub async fn ensure(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
        user: &str,
        now: i64,
    ) -> AppResult<Vec<RepositoryPath>> {
        let mut created = Vec::new();
        for depth in 1..=path.len() {
            let current = path.truncate(depth);
            match find_object(conn, self.dialect.as_ref(), &current).await? {
                Some(row) if row.is_folder() => continue,
                Some(_) => {
                    return Err(AppError::invalid_path(format!(
                        "'{current}' is a resource, not a folder"
                    )));
                }
                None => {}
            }
            insert_object(
                conn,
                self.dialect.as_ref(),
                &NewObject {
                    path: &current,
                    kind: ObjectKind::Folder,
                    binary: false,
                    content_type: None,
                    size: 0,
                    user,
                    now,
                },
            )
            .await?;
            debug!(path = %current, "Folder created");
            created.push(current);
        }
        Ok(created)
    }

    /// Direct children of `path`, folders first, then by name.
    pub async fn children(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
    ) -> AppResult<Vec<ObjectRow>> {
        let sql = self.dialect.translate(&format!(
            "SELECT {OBJECT_COLUMNS} FROM vrepo_objects WHERE obj_parent = ? \
             ORDER BY obj_type ASC, obj_name ASC"
        ));
        sqlx::query_as::<_, ObjectRow>(&sql)
            .bind(path.to_string())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to list children", e))
    }

    /// One page of [`FolderRepository::children`] plus the total count.
    pub async fn children_page(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
        page: &PageRequest,
    ) -> AppResult<(Vec<ObjectRow>, u64)> {
        let total: i64 = sqlx::query_scalar(
            &self
                .dialect
                .translate("SELECT COUNT(*) FROM vrepo_objects WHERE obj_parent = ?"),
        )
        .bind(path.to_string())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to count children", e))?;

        let sql = self.dialect.translate(&format!(
            "SELECT {OBJECT_COLUMNS} FROM vrepo_objects WHERE obj_parent = ? \
             ORDER BY obj_type ASC, obj_name ASC {}",
            self.dialect.pagination(page.limit(), page.offset())
        ));
        let rows = sqlx::query_as::<_, ObjectRow>(&sql)
            .bind(path.to_string())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to list children", e))?;

        Ok((rows, u64::try_from(total).unwrap_or(0)))
    }

    /// Every registry row strictly beneath `path`, shallowest first.
    pub async fn descendants(
        &self,
        conn: &mut AnyConnection,
        path: &RepositoryPath,
    ) -> AppResult<Vec<ObjectRow>> {
        let prefix = path.subtree_prefix();
        let (sql, bind_prefix) = if path.is_root() {
            (
                format!("SELECT {OBJECT_COLUMNS} FROM vrepo_objects ORDER BY obj_path ASC"),
                false,
            )
        } else {
            (
                format!(
                    "SELECT {OBJECT_COLUMNS} FROM vrepo_objects \
                     WHERE SUBSTR(obj_path, 1, ?) = ? ORDER BY obj_path ASC"
                ),
                true,
            )
        };
        let sql = self.dialect.translate(&sql);
        let mut query = sqlx::query_as::<_, ObjectRow>(&sql);
        if bind_prefix {
            query = query.bind(char_len(&prefix)).bind(prefix.clone());
        }
        let mut rows = query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to list descendants", e))?;
        rows.sort_by_key(|row| (row.path().len(), row.obj_path.clone()));
        Ok(rows)
    }

    /// Delete `path` and everything beneath it, including content and
    /// version history. Returns the number of registry rows removed.
    pub async fn remove(&self, conn: &mut AnyConnection, path: &RepositoryPath) -> AppResult<u64> {
        if path.is_root() {
            return Err(AppError::invalid_path("The root folder cannot be removed"));
        }
        let (exact, len, prefix) = subtree_binds(path);
        let mut removed = 0;
        for (table, column) in PATH_TABLES {
            let sql = self.dialect.translate(&format!(
                "DELETE FROM {table} WHERE {}",
                subtree_clause(column)
            ));
            let result = sqlx::query(&sql)
                .bind(exact.clone())
                .bind(len)
                .bind(prefix.clone())
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error("Failed to remove folder subtree", e))?;
            if *table == "vrepo_objects" {
                removed = result.rows_affected();
            }
        }
        debug!(path = %path, removed, "Folder subtree removed");
        Ok(removed)
    }

    /// Move the folder at `from` and its whole subtree to `to`.
    ///
    /// The destination's ancestors must already exist and `to` must be
    /// free; the facade checks both.
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
            .map_err(|e| db_error("Failed to rename folder", e))?;

        // Descendants keep their tail and swap the prefix.
        let old_prefix = from.subtree_prefix();
        let new_prefix = to.subtree_prefix();
        let prefix_len = char_len(&old_prefix);
        let tail_start = prefix_len + 1;
        let d = self.dialect.as_ref();

        let objects = d.translate(&format!(
            "UPDATE vrepo_objects SET obj_path = {}, obj_parent = {} \
             WHERE SUBSTR(obj_path, 1, ?) = ?",
            d.concat("?", "SUBSTR(obj_path, ?)"),
            d.concat("?", "SUBSTR(obj_parent, ?)"),
        ));
        // obj_parent of a direct child equals the old folder path, which
        // has no trailing separator, so its tail starts one earlier.
        sqlx::query(&objects)
            .bind(new_prefix.clone())
            .bind(tail_start)
            .bind(to.to_string())
            .bind(tail_start - 1)
            .bind(prefix_len)
            .bind(old_prefix.clone())
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to move folder contents", e))?;

        for (table, column) in &PATH_TABLES[1..] {
            let sql = d.translate(&format!(
                "UPDATE {table} SET {column} = {} WHERE SUBSTR({column}, 1, ?) = ?",
                d.concat("?", &format!("SUBSTR({column}, ?)")),
            ));
            sqlx::query(&sql)
                .bind(new_prefix.clone())
                .bind(tail_start)
                .bind(prefix_len)
                .bind(old_prefix.clone())
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error("Failed to move folder contents", e))?;
        }

        debug!(from = %from, to = %to, "Folder renamed");
        Ok(())
    }
}
