//! DAO implementations over a borrowed connection.
//!
//! Repositories never own a connection: each method takes
//! `&mut AnyConnection` so that the facade can run several of them inside
//! one transaction.

pub mod file;
pub mod folder;
pub mod search;
pub mod version;

use chrono::{DateTime, Utc};
use sqlx::AnyConnection;

use vrepo_core::error::{AppError, ErrorKind};
use vrepo_core::result::AppResult;
use vrepo_core::types::RepositoryPath;
use vrepo_entity::{EntityInfo, Folder, ObjectKind, RepositoryObject, ResourceMeta};

use crate::dialect::Dialect;

pub use file::FileRepository;
pub use folder::FolderRepository;
pub use search::SearchRepository;
pub use version::VersionRepository;

/// Column list shared by every `vrepo_objects` query.
pub(crate) const OBJECT_COLUMNS: &str = "obj_path, obj_name, obj_parent, obj_type, binary_flag, \
     content_type, current_version, created_by, created_at, modified_by, modified_at, content_size";

/// One row of `vrepo_objects`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ObjectRow {
    pub obj_path: String,
    pub obj_name: String,
    pub obj_parent: String,
    pub obj_type: i64,
    pub binary_flag: i64,
    pub content_type: Option<String>,
    pub current_version: i64,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub modified_by: Option<String>,
    pub modified_at: i64,
    pub content_size: i64,
}

impl ObjectRow {
    /// Object kind, or a storage error for an unknown discriminator.
    pub fn kind(&self) -> AppResult<ObjectKind> {
        ObjectKind::from_code(self.obj_type).ok_or_else(|| {
            AppError::storage(format!(
                "Unknown object type {} at '{}'",
                self.obj_type, self.obj_path
            ))
        })
    }

    pub fn is_folder(&self) -> bool {
        self.obj_type == ObjectKind::Folder.code()
    }

    pub fn path(&self) -> RepositoryPath {
        RepositoryPath::parse(&self.obj_path)
    }

    fn info(&self) -> EntityInfo {
        EntityInfo {
            name: self.obj_name.clone(),
            path: self.path(),
            created_by: self.created_by.clone().unwrap_or_default(),
            created_at: from_millis(self.created_at),
            modified_by: self.modified_by.clone().unwrap_or_default(),
            modified_at: from_millis(self.modified_at),
        }
    }

    pub fn into_folder(self) -> Folder {
        Folder { info: self.info() }
    }

    pub fn into_meta(self) -> ResourceMeta {
        ResourceMeta {
            info: self.info(),
            binary: self.binary_flag != 0,
            content_type: self.content_type.unwrap_or_default(),
            current_version: self.current_version,
            size: self.content_size,
        }
    }

    pub fn into_object(self) -> AppResult<RepositoryObject> {
        Ok(match self.kind()? {
            ObjectKind::Folder => RepositoryObject::Folder(self.into_folder()),
            ObjectKind::Resource => RepositoryObject::Resource(self.into_meta()),
        })
    }
}

/// Values for a new `vrepo_objects` row.
#[derive(Debug, Clone)]
pub(crate) struct NewObject<'a> {
    pub path: &'a RepositoryPath,
    pub kind: ObjectKind,
    pub binary: bool,
    pub content_type: Option<&'a str>,
    pub size: i64,
    pub user: &'a str,
    pub now: i64,
}

/// Look up a single registry row.
pub(crate) async fn find_object(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    path: &RepositoryPath,
) -> AppResult<Option<ObjectRow>> {
    let sql = dialect.translate(&format!(
        "SELECT {OBJECT_COLUMNS} FROM vrepo_objects WHERE obj_path = ?"
    ));
    sqlx::query_as::<_, ObjectRow>(&sql)
        .bind(path.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to find object", e))
}

/// Insert a registry row. A primary-key clash becomes `AlreadyExists`.
pub(crate) async fn insert_object(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    object: &NewObject<'_>,
) -> AppResult<()> {
    let parent = object
        .path
        .parent()
        .unwrap_or_else(RepositoryPath::root)
        .to_string();
    let sql = dialect.translate(
        "INSERT INTO vrepo_objects (obj_path, obj_name, obj_parent, obj_type, binary_flag, \
         content_type, current_version, created_by, created_at, modified_by, modified_at, \
         content_size) VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?)",
    );
    sqlx::query(&sql)
        .bind(object.path.to_string())
        .bind(object.path.last_segment().to_string())
        .bind(parent)
        .bind(object.kind.code())
        .bind(i64::from(object.binary))
        .bind(object.content_type.map(str::to_string))
        .bind(object.user.to_string())
        .bind(object.now)
        .bind(object.user.to_string())
        .bind(object.now)
        .bind(object.size)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::already_exists(format!("'{}' already exists", object.path))
            } else {
                db_error("Failed to insert object", e)
            }
        })?;
    Ok(())
}

/// `(column = ? OR SUBSTR(column, 1, ?) = ?)` with its binds, matching a
/// path and everything beneath it without `LIKE` wildcards.
pub(crate) fn subtree_clause(column: &str) -> String {
    format!("({column} = ? OR SUBSTR({column}, 1, ?) = ?)")
}

/// Bind values for [`subtree_clause`].
pub(crate) fn subtree_binds(path: &RepositoryPath) -> (String, i32, String) {
    let prefix = path.subtree_prefix();
    (path.to_string(), char_len(&prefix), prefix)
}

/// Character length as an `i32`, the type `SUBSTR` positions bind as.
pub(crate) fn char_len(s: &str) -> i32 {
    i32::try_from(s.chars().count()).unwrap_or(i32::MAX)
}

/// Milliseconds since the epoch for `at`.
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Timestamp from stored epoch milliseconds.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub(crate) fn now_millis() -> i64 {
    to_millis(Utc::now())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn db_error(message: &str, err: sqlx::Error) -> AppError {
    AppError::with_source(ErrorKind::Storage, format!("{message}: {err}"), err)
}
