//! SQLite dialect.

use sqlx::Row;
use sqlx::any::AnyRow;

use vrepo_core::error::{AppError, ErrorKind};
use vrepo_core::result::AppResult;

use super::{Dialect, DialectKind, MatchMode, Predicate};

/// SQLite 3.
///
/// SQLite's `LIKE` folds ASCII case, so case-sensitive matches use
/// `INSTR` instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn path_type(&self) -> &'static str {
        "TEXT"
    }

    fn name_type(&self) -> &'static str {
        "TEXT"
    }

    fn blob_type(&self) -> &'static str {
        "BLOB"
    }

    fn like_is_case_insensitive(&self) -> bool {
        true
    }

    // LIKE only folds ASCII letters.
    fn fold_case(&self, text: &str) -> String {
        text.to_ascii_uppercase()
    }

    fn case_sensitive_match(&self, column: &str, needle: &str, mode: MatchMode) -> Predicate {
        let sql = match mode {
            MatchMode::Prefix => format!("INSTR({column}, ?) = 1"),
            MatchMode::Contains => format!("INSTR({column}, ?) > 0"),
        };
        Predicate {
            sql,
            binds: vec![needle.to_string()],
        }
    }

    // Values written through a TEXT affinity can come back as text.
    fn read_binary(&self, row: &AnyRow, column: &str) -> AppResult<Vec<u8>> {
        match row.try_get::<Option<Vec<u8>>, _>(column) {
            Ok(value) => Ok(value.unwrap_or_default()),
            Err(_) => row
                .try_get::<Option<String>, _>(column)
                .map(|value| value.map(String::into_bytes).unwrap_or_default())
                .map_err(|e| {
                    AppError::with_source(
                        ErrorKind::Storage,
                        format!("Failed to read binary column '{column}'"),
                        e,
                    )
                }),
        }
    }
}
