//! MySQL / MariaDB dialect.

use super::{Dialect, DialectKind};

/// MySQL and MariaDB.
///
/// Tables use a binary collation so that primary keys and `LIKE`
/// compare case-sensitively, matching the other engines. Paths are
/// capped at 700 characters to keep composite utf8mb4 keys under the
/// InnoDB index limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn path_type(&self) -> &'static str {
        "VARCHAR(700)"
    }

    fn text_type(&self) -> &'static str {
        "MEDIUMTEXT"
    }

    fn blob_type(&self) -> &'static str {
        "LONGBLOB"
    }

    fn table_options(&self) -> &'static str {
        " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin"
    }

    fn create_index(&self) -> &'static str {
        "CREATE INDEX"
    }

    fn column_add_clause(&self) -> (&'static str, &'static str) {
        ("ADD (", ")")
    }

    fn concat(&self, left: &str, right: &str) -> String {
        format!("CONCAT({left}, {right})")
    }
}
