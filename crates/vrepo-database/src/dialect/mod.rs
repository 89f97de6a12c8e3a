//! SQL dialect abstraction.
//!
//! Every statement in the DAO layer is written once as a portable
//! template using `?` placeholders and `$TOKEN` type markers. The active
//! [`Dialect`] renders the template for its engine and supplies the few
//! fragments that differ between engines (pagination, column addition,
//! string concatenation, case-insensitive matching, binary reads).

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sqlx::Row;
use sqlx::any::AnyRow;

use vrepo_core::error::{AppError, ErrorKind};
use vrepo_core::result::AppResult;

pub use self::mysql::MySqlDialect;
pub use self::postgres::PostgresDialect;
pub use self::sqlite::SqliteDialect;

/// Escape character used in every generated `LIKE` pattern.
pub const LIKE_ESCAPE: char = '!';

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectKind {
    /// SQLite 3.
    Sqlite,
    /// PostgreSQL.
    Postgres,
    /// MySQL and MariaDB.
    MySql,
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Postgres => write!(f, "postgresql"),
            Self::MySql => write!(f, "mysql"),
        }
    }
}

/// How a search needle is anchored against a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The column starts with the needle.
    Prefix,
    /// The column contains the needle anywhere.
    Contains,
}

/// A rendered SQL condition together with the values for its `?`
/// placeholders, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Portable SQL fragment (still using `?` placeholders).
    pub sql: String,
    /// Bind values for the fragment's placeholders.
    pub binds: Vec<String>,
}

/// Engine-specific SQL rendering.
pub trait Dialect: Send + Sync + fmt::Debug + 'static {
    /// The engine this dialect targets.
    fn kind(&self) -> DialectKind;

    /// Placeholder for the `index`-th (1-based) bind parameter.
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Column type for repository paths (`$PATH`).
    fn path_type(&self) -> &'static str;

    /// Column type for short names and user identifiers (`$NAME`).
    fn name_type(&self) -> &'static str {
        "VARCHAR(255)"
    }

    /// Column type for text chunks (`$TEXT`).
    fn text_type(&self) -> &'static str {
        "TEXT"
    }

    /// Column type for binary payloads (`$BLOB`).
    fn blob_type(&self) -> &'static str;

    /// Column type for 64-bit integers (`$BIGINT`).
    fn bigint_type(&self) -> &'static str {
        "BIGINT"
    }

    /// Column type for timestamps (`$TIMESTAMP`).
    fn timestamp_type(&self) -> &'static str {
        "TIMESTAMP"
    }

    /// Expression for the current timestamp (`$CURRENT_TIMESTAMP`).
    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    /// Trailing table options appended after `CREATE TABLE (...)`
    /// (`$TABLE_OPTIONS`).
    fn table_options(&self) -> &'static str {
        ""
    }

    /// Leading keywords for an idempotent index creation (`$CREATE_INDEX`).
    fn create_index(&self) -> &'static str {
        "CREATE INDEX IF NOT EXISTS"
    }

    /// Pagination clause appended to an ordered `SELECT`.
    fn pagination(&self, limit: u64, offset: u64) -> String {
        format!("LIMIT {limit} OFFSET {offset}")
    }

    /// Opening and closing fragments wrapped around a column definition
    /// in `ALTER TABLE t <open>col def<close>`.
    fn column_add_clause(&self) -> (&'static str, &'static str) {
        ("ADD COLUMN ", "")
    }

    /// String concatenation of two SQL expressions.
    fn concat(&self, left: &str, right: &str) -> String {
        format!("{left} || {right}")
    }

    /// Read a binary column, treating NULL as empty content.
    fn read_binary(&self, row: &AnyRow, column: &str) -> AppResult<Vec<u8>> {
        row.try_get::<Option<Vec<u8>>, _>(column)
            .map(Option::unwrap_or_default)
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to read binary column '{column}'"),
                    e,
                )
            })
    }

    /// Whether plain `LIKE` ignores case on this engine for the schema's
    /// text columns.
    fn like_is_case_insensitive(&self) -> bool {
        false
    }

    /// Fold `text` the way a case-insensitive [`Dialect::match_predicate`]
    /// folds it in SQL, for matches re-checked in memory.
    fn fold_case(&self, text: &str) -> String {
        text.to_uppercase()
    }

    /// Case-sensitive match for engines whose `LIKE` folds case.
    fn case_sensitive_match(&self, column: &str, needle: &str, mode: MatchMode) -> Predicate {
        like(column, needle, mode)
    }

    /// A condition matching `needle` against `column`.
    fn match_predicate(
        &self,
        column: &str,
        needle: &str,
        mode: MatchMode,
        case_insensitive: bool,
    ) -> Predicate {
        match (case_insensitive, self.like_is_case_insensitive()) {
            (false, true) => self.case_sensitive_match(column, needle, mode),
            (true, false) => Predicate {
                sql: format!("UPPER({column}) LIKE ? ESCAPE '{LIKE_ESCAPE}'"),
                binds: vec![like_pattern(&needle.to_uppercase(), mode)],
            },
            _ => like(column, needle, mode),
        }
    }

    /// Render a portable template for this engine.
    ///
    /// `?` placeholders are renumbered through [`Dialect::placeholder`]
    /// and `$TOKEN` markers are replaced by the dialect's fragments.
    /// Quoted string literals pass through untouched, as do unknown
    /// tokens.
    fn translate(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + 16);
        let mut chars = template.chars().peekable();
        let mut in_quote = false;
        let mut index = 0;

        while let Some(c) = chars.next() {
            if in_quote {
                out.push(c);
                if c == '\'' {
                    in_quote = false;
                }
                continue;
            }
            match c {
                '\'' => {
                    in_quote = true;
                    out.push(c);
                }
                '?' => {
                    index += 1;
                    out.push_str(&self.placeholder(index));
                }
                '$' => {
                    let mut token = String::new();
                    while let Some(&next) = chars.peek() {
                        if next.is_ascii_uppercase() || next == '_' {
                            token.push(next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    match self.token(&token) {
                        Some(fragment) => out.push_str(fragment),
                        None => {
                            out.push('$');
                            out.push_str(&token);
                        }
                    }
                }
                _ => out.push(c),
            }
        }
        out
    }

    /// Fragment for a `$TOKEN` name, or `None` when unknown.
    fn token(&self, name: &str) -> Option<&'static str> {
        Some(match name {
            "PATH" => self.path_type(),
            "NAME" => self.name_type(),
            "TEXT" => self.text_type(),
            "BLOB" => self.blob_type(),
            "BIGINT" => self.bigint_type(),
            "TIMESTAMP" => self.timestamp_type(),
            "CURRENT_TIMESTAMP" => self.current_timestamp(),
            "TABLE_OPTIONS" => self.table_options(),
            "CREATE_INDEX" => self.create_index(),
            _ => return None,
        })
    }
}

fn like(column: &str, needle: &str, mode: MatchMode) -> Predicate {
    Predicate {
        sql: format!("{column} LIKE ? ESCAPE '{LIKE_ESCAPE}'"),
        binds: vec![like_pattern(needle, mode)],
    }
}

/// Escape `needle` for `LIKE ... ESCAPE '!'` and anchor it per `mode`.
pub fn like_pattern(needle: &str, mode: MatchMode) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    if mode == MatchMode::Contains {
        pattern.push('%');
    }
    for c in needle.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Dialects keyed by normalized engine product name.
#[derive(Debug, Clone)]
pub struct DialectRegistry {
    dialects: HashMap<String, Arc<dyn Dialect>>,
}

impl Default for DialectRegistry {
    fn default() -> Self {
        let mut registry = Self {
            dialects: HashMap::new(),
        };
        let sqlite: Arc<dyn Dialect> = Arc::new(SqliteDialect);
        let postgres: Arc<dyn Dialect> = Arc::new(PostgresDialect);
        let mysql: Arc<dyn Dialect> = Arc::new(MySqlDialect);
        registry.register("sqlite", sqlite);
        registry.register("postgresql", postgres.clone());
        registry.register("postgres", postgres);
        registry.register("mysql", mysql.clone());
        registry.register("mariadb", mysql);
        registry
    }
}

impl DialectRegistry {
    /// Register (or replace) the dialect for a product name.
    pub fn register(&mut self, product: &str, dialect: Arc<dyn Dialect>) {
        self.dialects.insert(normalize(product), dialect);
    }

    /// Resolve the dialect for the product name reported by a connection.
    pub fn resolve(&self, product: &str) -> AppResult<Arc<dyn Dialect>> {
        self.dialects.get(&normalize(product)).cloned().ok_or_else(|| {
            AppError::configuration(format!("Unsupported database engine '{product}'"))
        })
    }
}

/// Resolve against the built-in registry.
pub fn resolve(product: &str) -> AppResult<Arc<dyn Dialect>> {
    DialectRegistry::default().resolve(product)
}

fn normalize(product: &str) -> String {
    product
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_numbers_placeholders_for_postgres() {
        let sql = PostgresDialect.translate("SELECT a FROM t WHERE x = ? AND y = '?' AND z = ?");
        assert_eq!(sql, "SELECT a FROM t WHERE x = $1 AND y = '?' AND z = $2");
        let sql = SqliteDialect.translate("SELECT a FROM t WHERE x = ?");
        assert_eq!(sql, "SELECT a FROM t WHERE x = ?");
    }

    #[test]
    fn test_translate_tokens() {
        let template = "CREATE TABLE t (p $PATH, b $BLOB, n $BIGINT)$TABLE_OPTIONS";
        assert_eq!(
            SqliteDialect.translate(template),
            "CREATE TABLE t (p TEXT, b BLOB, n BIGINT)"
        );
        assert_eq!(
            PostgresDialect.translate(template),
            "CREATE TABLE t (p VARCHAR(1024), b BYTEA, n BIGINT)"
        );
        assert_eq!(
            MySqlDialect.translate(template),
            "CREATE TABLE t (p VARCHAR(700), b LONGBLOB, n BIGINT) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin"
        );
        assert_eq!(SqliteDialect.translate("$UNKNOWN x"), "$UNKNOWN x");
    }

    #[test]
    fn test_pagination() {
        assert_eq!(SqliteDialect.pagination(10, 20), "LIMIT 10 OFFSET 20");
        assert_eq!(MySqlDialect.pagination(10, 20), "LIMIT 10 OFFSET 20");
        assert_eq!(
            PostgresDialect.pagination(10, 20),
            "OFFSET 20 ROWS FETCH FIRST 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("a_b%c!", MatchMode::Prefix), "a!_b!%c!!%");
        assert_eq!(like_pattern("abc", MatchMode::Contains), "%abc%");
    }

    #[test]
    fn test_match_predicate_variants() {
        let ci = PostgresDialect.match_predicate("obj_name", "Ab", MatchMode::Prefix, true);
        assert_eq!(ci.sql, "UPPER(obj_name) LIKE ? ESCAPE '!'");
        assert_eq!(ci.binds, vec!["AB%".to_string()]);

        let cs = PostgresDialect.match_predicate("obj_name", "Ab", MatchMode::Prefix, false);
        assert_eq!(cs.sql, "obj_name LIKE ? ESCAPE '!'");

        let lite_ci = SqliteDialect.match_predicate("chunk_text", "Ab", MatchMode::Contains, true);
        assert_eq!(lite_ci.sql, "chunk_text LIKE ? ESCAPE '!'");
        assert_eq!(lite_ci.binds, vec!["%Ab%".to_string()]);

        let lite_cs = SqliteDialect.match_predicate("chunk_text", "Ab", MatchMode::Contains, false);
        assert_eq!(lite_cs.sql, "INSTR(chunk_text, ?) > 0");
        assert_eq!(lite_cs.binds, vec!["Ab".to_string()]);
    }

    #[test]
    fn test_registry_resolution() {
        assert_eq!(resolve("SQLite").unwrap().kind(), DialectKind::Sqlite);
        assert_eq!(resolve("PostgreSQL").unwrap().kind(), DialectKind::Postgres);
        assert_eq!(resolve("MySQL").unwrap().kind(), DialectKind::MySql);
        assert_eq!(resolve("MariaDB").unwrap().kind(), DialectKind::MySql);
        let err = resolve("Oracle").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_column_add_and_concat() {
        assert_eq!(SqliteDialect.column_add_clause(), ("ADD COLUMN ", ""));
        assert_eq!(MySqlDialect.column_add_clause(), ("ADD (", ")"));
        assert_eq!(PostgresDialect.concat("?", "x"), "? || x");
        assert_eq!(MySqlDialect.concat("?", "x"), "CONCAT(?, x)");
    }
}
