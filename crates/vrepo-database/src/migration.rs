//! Schema bootstrap and versioned migration.
//!
//! The schema is described by portable templates rendered through the
//! active [`Dialect`]. Bootstrap probes the version table; when it is
//! missing the base schema is created, and any recorded version older
//! than [`SCHEMA_VERSION`] is upgraded step by step.

use sqlx::AnyConnection;
use tokio::sync::Mutex;
use tracing::{debug, info};

use vrepo_core::error::{AppError, ErrorKind};
use vrepo_core::result::AppResult;

use crate::connection::ConnectionPool;
use crate::dialect::Dialect;

/// Schema version produced by this build.
pub const SCHEMA_VERSION: i64 = 2;

/// Serializes bootstrap across every pool in the process.
static SCHEMA_LOCK: Mutex<()> = Mutex::const_new(());

const BASE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS vrepo_objects (\
        obj_path $PATH NOT NULL, \
        obj_name $NAME NOT NULL, \
        obj_parent $PATH NOT NULL, \
        obj_type $BIGINT NOT NULL, \
        binary_flag $BIGINT NOT NULL, \
        content_type $NAME, \
        current_version $BIGINT NOT NULL, \
        created_by $NAME, \
        created_at $BIGINT NOT NULL, \
        modified_by $NAME, \
        modified_at $BIGINT NOT NULL, \
        PRIMARY KEY (obj_path))$TABLE_OPTIONS",
    "$CREATE_INDEX vrepo_objects_parent ON vrepo_objects (obj_parent)",
    "CREATE TABLE IF NOT EXISTS vrepo_documents (\
        doc_path $PATH NOT NULL, \
        chunk_index $BIGINT NOT NULL, \
        chunk_text $TEXT NOT NULL, \
        PRIMARY KEY (doc_path, chunk_index))$TABLE_OPTIONS",
    "CREATE TABLE IF NOT EXISTS vrepo_binaries (\
        bin_path $PATH NOT NULL, \
        bin_content $BLOB, \
        PRIMARY KEY (bin_path))$TABLE_OPTIONS",
    "CREATE TABLE IF NOT EXISTS vrepo_versions (\
        ver_path $PATH NOT NULL, \
        ver_number $BIGINT NOT NULL, \
        binary_flag $BIGINT NOT NULL, \
        content_type $NAME, \
        ver_content $BLOB, \
        created_by $NAME, \
        created_at $BIGINT NOT NULL, \
        PRIMARY KEY (ver_path, ver_number))$TABLE_OPTIONS",
    "CREATE TABLE IF NOT EXISTS vrepo_schema (\
        schema_version $BIGINT NOT NULL, \
        applied_at $TIMESTAMP DEFAULT $CURRENT_TIMESTAMP)$TABLE_OPTIONS",
];

/// Statements upgrading the schema from `version - 1` to `version`.
fn upgrade_steps(dialect: &dyn Dialect, version: i64) -> Option<Vec<String>> {
    match version {
        2 => Some(vec![
            add_column(dialect, "vrepo_objects", "content_size $BIGINT DEFAULT 0 NOT NULL"),
            add_column(dialect, "vrepo_versions", "ver_size $BIGINT DEFAULT 0 NOT NULL"),
        ]),
        _ => None,
    }
}

fn add_column(dialect: &dyn Dialect, table: &str, definition: &str) -> String {
    let (open, close) = dialect.column_add_clause();
    dialect.translate(&format!("ALTER TABLE {table} {open}{definition}{close}"))
}

/// Create or upgrade the schema so that it matches [`SCHEMA_VERSION`].
///
/// Returns the schema version found before any change (`0` for a fresh
/// database).
pub async fn run_migrations(pool: &ConnectionPool) -> AppResult<i64> {
    migrate_to(pool, SCHEMA_VERSION).await
}

async fn migrate_to(pool: &ConnectionPool, target: i64) -> AppResult<i64> {
    let _guard = SCHEMA_LOCK.lock().await;
    let dialect = pool.dialect();
    let pooled = pool.acquire().await?;
    let mut conn = pooled.lease().await?;

    let found = stored_version(&mut conn).await;
    let mut current = match found {
        Some(version) => version,
        None => {
            info!(engine = %dialect.kind(), "Creating repository schema");
            for template in BASE_SCHEMA {
                execute(&mut conn, &dialect.translate(template)).await?;
            }
            record_version(&mut conn, dialect.as_ref(), 1).await?;
            1
        }
    };

    if current > target {
        return Err(AppError::schema_mismatch(format!(
            "Stored schema version {current} is newer than supported version {target}"
        )));
    }

    while current < target {
        let next = current + 1;
        let steps = upgrade_steps(dialect.as_ref(), next).ok_or_else(|| {
            AppError::schema_mismatch(format!(
                "No migration from schema version {current} to {next}"
            ))
        })?;
        info!(from = current, to = next, "Upgrading repository schema");
        for sql in &steps {
            execute(&mut conn, sql).await?;
        }
        record_version(&mut conn, dialect.as_ref(), next).await?;
        current = next;
    }

    debug!(version = current, "Repository schema is current");
    Ok(found.unwrap_or(0))
}

/// The highest recorded schema version, or `None` when the schema table
/// is missing or empty.
async fn stored_version(conn: &mut AnyConnection) -> Option<i64> {
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vrepo_schema")
        .fetch_one(&mut *conn)
        .await
        .ok()?;
    if rows == 0 {
        return None;
    }
    sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(schema_version) FROM vrepo_schema")
        .fetch_one(&mut *conn)
        .await
        .ok()
        .flatten()
}

async fn record_version(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    version: i64,
) -> AppResult<()> {
    sqlx::query(&dialect.translate("INSERT INTO vrepo_schema (schema_version) VALUES (?)"))
        .bind(version)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to record schema version", e)
        })?;
    Ok(())
}

async fn execute(conn: &mut AnyConnection, sql: &str) -> AppResult<()> {
    sqlx::query(sql).execute(&mut *conn).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Storage,
            format!("Failed to apply schema statement: {e}"),
            e,
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrepo_core::config::DatabaseConfig;

    async fn pool(dir: &tempfile::TempDir) -> ConnectionPool {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("schema.db").display());
        ConnectionPool::connect(&DatabaseConfig::with_url(url))
            .await
            .unwrap()
    }

    async fn max_version(pool: &ConnectionPool) -> i64 {
        let pooled = pool.acquire().await.unwrap();
        let mut conn = pooled.lease().await.unwrap();
        stored_version(&mut conn).await.unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_reaches_current_version() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        assert_eq!(run_migrations(&pool).await.unwrap(), 0);
        assert_eq!(max_version(&pool).await, SCHEMA_VERSION);

        // Second bootstrap is a no-op.
        assert_eq!(run_migrations(&pool).await.unwrap(), SCHEMA_VERSION);
        assert_eq!(max_version(&pool).await, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_upgrade_from_version_one() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        assert_eq!(migrate_to(&pool, 1).await.unwrap(), 0);
        assert_eq!(max_version(&pool).await, 1);

        assert_eq!(run_migrations(&pool).await.unwrap(), 1);
        assert_eq!(max_version(&pool).await, 2);

        let pooled = pool.acquire().await.unwrap();
        let mut conn = pooled.lease().await.unwrap();
        let size: i64 = sqlx::query_scalar("SELECT COUNT(content_size) FROM vrepo_objects")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(size, 0);
    }

    #[tokio::test]
    async fn test_newer_stored_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        run_migrations(&pool).await.unwrap();
        {
            let pooled = pool.acquire().await.unwrap();
            let mut conn = pooled.lease().await.unwrap();
            record_version(&mut conn, pool.dialect().as_ref(), SCHEMA_VERSION + 1)
                .await
                .unwrap();
        }
        let err = run_migrations(&pool).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SchemaMismatch);
    }

    #[test]
    fn test_add_column_per_dialect() {
        use crate::dialect::{MySqlDialect, PostgresDialect};
        assert_eq!(
            add_column(&MySqlDialect, "t", "c $BIGINT"),
            "ALTER TABLE t ADD (c BIGINT)"
        );
        assert_eq!(
            add_column(&PostgresDialect, "t", "c $BIGINT"),
            "ALTER TABLE t ADD COLUMN c BIGINT"
        );
    }
}
