//! PostgreSQL dialect.

use super::{Dialect, DialectKind};

/// PostgreSQL. Uses numbered placeholders and SQL:2008 row limiting.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn path_type(&self) -> &'static str {
        "VARCHAR(1024)"
    }

    fn blob_type(&self) -> &'static str {
        "BYTEA"
    }

    fn pagination(&self, limit: u64, offset: u64) -> String {
        format!("OFFSET {offset} ROWS FETCH FIRST {limit} ROWS ONLY")
    }
}
