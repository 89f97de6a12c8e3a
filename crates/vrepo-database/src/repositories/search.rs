//! Name, path, and content search.

use std::collections::BTreeSet;
use std::sync::Arc;

use sqlx::{AnyConnection, Row};
use tracing::debug;

use vrepo_core::result::AppResult;
use vrepo_core::types::RepositoryPath;

use super::file::read_document;
use super::{OBJECT_COLUMNS, ObjectRow, char_len, db_error, find_object};
use crate::dialect::{Dialect, MatchMode, Predicate};

/// Repository for search queries over the registry and text content.
#[derive(Debug, Clone)]
pub struct SearchRepository {
    dialect: Arc<dyn Dialect>,
}

impl SearchRepository {
    /// Create a new search repository.
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }

    /// Objects whose name starts with `needle`.
    pub async fn by_name(
        &self,
        conn: &mut AnyConnection,
        needle: &str,
        case_insensitive: bool,
        root: &RepositoryPath,
    ) -> AppResult<Vec<ObjectRow>> {
        let predicate =
            self.dialect
                .match_predicate("obj_name", needle, MatchMode::Prefix, case_insensitive);
        self.objects_matching(conn, predicate, root).await
    }

    /// Objects whose full path contains `needle`.
    pub async fn by_path(
        &self,
        conn: &mut AnyConnection,
        needle: &str,
        case_insensitive: bool,
        root: &RepositoryPath,
    ) -> AppResult<Vec<ObjectRow>> {
        let predicate =
            self.dialect
                .match_predicate("obj_path", needle, MatchMode::Contains, case_insensitive);
        self.objects_matching(conn, predicate, root).await
    }

    /// Text resources whose content contains `needle`.
    ///
    /// Chunks are matched in SQL first. Documents spanning several chunks
    /// are then re-checked in full so that a needle crossing a chunk
    /// boundary is still found.
    pub async fn by_text(
        &self,
        conn: &mut AnyConnection,
        needle: &str,
        case_insensitive: bool,
        root: &RepositoryPath,
    ) -> AppResult<Vec<ObjectRow>> {
        let predicate = self.dialect.match_predicate(
            "chunk_text",
            needle,
            MatchMode::Contains,
            case_insensitive,
        );
        let scope = under(root, "doc_path");

        let sql = self.dialect.translate(&format!(
            "SELECT DISTINCT doc_path FROM vrepo_documents WHERE {}{}",
            predicate.sql, scope.sql
        ));
        let mut query = sqlx::query(&sql);
        for value in &predicate.binds {
            query = query.bind(value.clone());
        }
        if let Some(len) = scope.len {
            query = query.bind(len).bind(scope.prefix.clone());
        }
        let mut matched: BTreeSet<String> = query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to search document content", e))?
            .iter()
            .map(|row| row.try_get::<String, _>("doc_path"))
            .collect::<Result<_, _>>()
            .map_err(|e| db_error("Failed to decode search result", e))?;

        for path in self.multi_chunk_documents(conn, root).await? {
            if matched.contains(&path) {
                continue;
            }
            let text = read_document(conn, self.dialect.as_ref(), &path).await?;
            if self.contains(&text, needle, case_insensitive) {
                matched.insert(path);
            }
        }

        let mut rows = Vec::with_capacity(matched.len());
        for path in matched {
            if let Some(row) =
                find_object(conn, self.dialect.as_ref(), &RepositoryPath::parse(&path)).await?
            {
                rows.push(row);
            }
        }
        debug!(needle, case_insensitive, hits = rows.len(), "Text search finished");
        Ok(rows)
    }

    async fn objects_matching(
        &self,
        conn: &mut AnyConnection,
        predicate: Predicate,
        root: &RepositoryPath,
    ) -> AppResult<Vec<ObjectRow>> {
        let scope = under(root, "obj_path");
        let sql = self.dialect.translate(&format!(
            "SELECT {OBJECT_COLUMNS} FROM vrepo_objects WHERE {}{} ORDER BY obj_path ASC",
            predicate.sql, scope.sql
        ));
        let mut query = sqlx::query_as::<_, ObjectRow>(&sql);
        for value in &predicate.binds {
            query = query.bind(value.clone());
        }
        if let Some(len) = scope.len {
            query = query.bind(len).bind(scope.prefix.clone());
        }
        query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to search objects", e))
    }

    fn contains(&self, haystack: &str, needle: &str, case_insensitive: bool) -> bool {
        if case_insensitive {
            self.dialect
                .fold_case(haystack)
                .contains(&self.dialect.fold_case(needle))
        } else {
            haystack.contains(needle)
        }
    }

    async fn multi_chunk_documents(
        &self,
        conn: &mut AnyConnection,
        root: &RepositoryPath,
    ) -> AppResult<Vec<String>> {
        let scope = under(root, "doc_path");
        let sql = self.dialect.translate(&format!(
            "SELECT doc_path FROM vrepo_documents WHERE 1 = 1{} \
             GROUP BY doc_path HAVING COUNT(*) > 1",
            scope.sql
        ));
        let mut query = sqlx::query(&sql);
        if let Some(len) = scope.len {
            query = query.bind(len).bind(scope.prefix.clone());
        }
        query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to list chunked documents", e))?
            .iter()
            .map(|row| row.try_get::<String, _>("doc_path"))
            .collect::<Result<_, _>>()
            .map_err(|e| db_error("Failed to decode search result", e))
    }
}

/// Optional `AND SUBSTR(col, 1, ?) = ?` restriction to a subtree.
struct Scope {
    sql: String,
    len: Option<i32>,
    prefix: String,
}

fn under(root: &RepositoryPath, column: &str) -> Scope {
    if root.is_root() {
        return Scope {
            sql: String::new(),
            len: None,
            prefix: String::new(),
        };
    }
    let prefix = root.subtree_prefix();
    Scope {
        sql: format!(" AND SUBSTR({column}, 1, ?) = ?"),
        len: Some(char_len(&prefix)),
        prefix,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionPool;
    use crate::migration::run_migrations;
    use crate::repositories::{FileRepository, FolderRepository};
    use vrepo_core::config::DatabaseConfig;

    struct Fixture {
        pool: ConnectionPool,
        search: SearchRepository,
        _dir: tempfile::TempDir,
    }

    async fn fixture(chunk: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("search.db").display());
        let pool = ConnectionPool::connect(&DatabaseConfig::with_url(url))
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        let folders = FolderRepository::new(pool.dialect());
        let files = FileRepository::new(pool.dialect(), chunk);
        {
            let pooled = pool.acquire().await.unwrap();
            let mut conn = pooled.lease().await.unwrap();
            for folder in ["/docs", "/other"] {
                folders
                    .ensure(&mut conn, &RepositoryPath::parse(folder), "u", 1)
                    .await
                    .unwrap();
            }
            for (path, body) in [
                ("/docs/Readme.md", "Hello World"),
                ("/docs/notes.txt", "hello again"),
                ("/other/readme.txt", "nothing here"),
            ] {
                files
                    .create(
                        &mut conn,
                        &RepositoryPath::parse(path),
                        body.as_bytes(),
                        false,
                        "text/plain",
                        "u",
                        1,
                    )
                    .await
                    .unwrap();
            }
        }
        let search = SearchRepository::new(pool.dialect());
        Fixture {
            pool,
            search,
            _dir: dir,
        }
    }

    fn paths(rows: &[ObjectRow]) -> Vec<&str> {
        rows.iter().map(|r| r.obj_path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_text_search_case_sensitivity() {
        let fx = fixture(4).await;
        let pooled = fx.pool.acquire().await.unwrap();
        let mut conn = pooled.lease().await.unwrap();
        let root = RepositoryPath::root();

        let exact = fx.search.by_text(&mut conn, "Hello", false, &root).await.unwrap();
        assert_eq!(paths(&exact), vec!["/docs/Readme.md"]);

        let folded = fx.search.by_text(&mut conn, "hello", true, &root).await.unwrap();
        assert_eq!(paths(&folded), vec!["/docs/Readme.md", "/docs/notes.txt"]);
    }

    #[tokio::test]
    async fn test_text_search_spans_chunk_boundaries() {
        // With 4-character chunks "Hello World" is "Hell", "o Wo", "rld".
        let fx = fixture(4).await;
        let pooled = fx.pool.acquire().await.unwrap();
        let mut conn = pooled.lease().await.unwrap();
        let hits = fx
            .search
            .by_text(&mut conn, "lo Wor", false, &RepositoryPath::root())
            .await
            .unwrap();
        assert_eq!(paths(&hits), vec!["/docs/Readme.md"]);
    }

    #[tokio::test]
    async fn test_name_search_is_prefix_and_scoped() {
        let fx = fixture(64).await;
        let pooled = fx.pool.acquire().await.unwrap();
        let mut conn = pooled.lease().await.unwrap();

        let all = fx
            .search
            .by_name(&mut conn, "readme", true, &RepositoryPath::root())
            .await
            .unwrap();
        assert_eq!(paths(&all), vec!["/docs/Readme.md", "/other/readme.txt"]);

        let exact = fx
            .search
            .by_name(&mut conn, "readme", false, &RepositoryPath::root())
            .await
            .unwrap();
        assert_eq!(paths(&exact), vec!["/other/readme.txt"]);

        let scoped = fx
            .search
            .by_name(&mut conn, "readme", true, &RepositoryPath::parse("/docs"))
            .await
            .unwrap();
        assert_eq!(paths(&scoped), vec!["/docs/Readme.md"]);

        let none = fx
            .search
            .by_name(&mut conn, "me", true, &RepositoryPath::root())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_path_search_matches_substring() {
        let fx = fixture(64).await;
        let pooled = fx.pool.acquire().await.unwrap();
        let mut conn = pooled.lease().await.unwrap();
        let hits = fx
            .search
            .by_path(&mut conn, "cs/no", false, &RepositoryPath::root())
            .await
            .unwrap();
        assert_eq!(paths(&hits), vec!["/docs/notes.txt"]);

        let wildcard = fx
            .search
            .by_path(&mut conn, "%", false, &RepositoryPath::root())
            .await
            .unwrap();
        assert!(wildcard.is_empty());
    }

    #[tokio::test]
    async fn test_text_search_folds_case_alike_for_chunked_documents() {
        let fx = fixture(64).await;
        let pooled = fx.pool.acquire().await.unwrap();
        let mut conn = pooled.lease().await.unwrap();
        let files = FileRepository::new(fx.pool.dialect(), 4);
        for (path, body) in [("/docs/flat.txt", "Äbc"), ("/docs/split.txt", "xxÄbc")] {
            files
                .create(
                    &mut conn,
                    &RepositoryPath::parse(path),
                    body.as_bytes(),
                    false,
                    "text/plain",
                    "u",
                    1,
                )
                .await
                .unwrap();
        }

        let folded = fx
            .search
            .by_text(&mut conn, "ÄBC", true, &RepositoryPath::root())
            .await
            .unwrap();
        assert_eq!(paths(&folded), vec!["/docs/flat.txt", "/docs/split.txt"]);

        // Non-ASCII letters only match their own case here.
        let lower = fx
            .search
            .by_text(&mut conn, "äbc", true, &RepositoryPath::root())
            .await
            .unwrap();
        assert!(lower.is_empty());
    }
}
