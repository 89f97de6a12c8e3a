//! Unified error types for vrepo.
//!
//! Every crate maps its internal failures into [`AppError`] so that
//! callers of the repository facade see exactly one error type, with a
//! distinguishable [`ErrorKind`] per failure category.

use std::fmt;
use thiserror::Error;

/// Top-level error categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The path does not exist where existence is required.
    NotFound,
    /// Create on an occupied path without the override flag.
    AlreadyExists,
    /// Malformed or disallowed path (including kind clashes such as a
    /// resource where a folder already lives).
    InvalidPath,
    /// Connectivity, SQL, or pool failure. Always carries the cause.
    Storage,
    /// Stored schema version cannot be reconciled with the running code.
    SchemaMismatch,
    /// Invalid configuration, including an unsupported database engine.
    Configuration,
    /// A malformed archive was supplied for import.
    Archive,
    /// An unexpected internal failure (e.g. a panicked blocking task).
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::AlreadyExists => write!(f, "ALREADY_EXISTS"),
            Self::InvalidPath => write!(f, "INVALID_PATH"),
            Self::Storage => write!(f, "STORAGE"),
            Self::SchemaMismatch => write!(f, "SCHEMA_MISMATCH"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Archive => write!(f, "ARCHIVE"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified error returned by every repository operation.
///
/// Errors raised deep inside the DAO layer carry only a kind and a
/// message; the facade attaches the operation name and the path once via
/// [`AppError::at`] before handing the error to the caller.
#[derive(Debug, Error)]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Facade operation that failed (e.g. `"create_resource"`).
    pub operation: Option<&'static str>,
    /// Repository path the operation was addressing.
    pub path: Option<String>,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        match (self.operation, &self.path) {
            (Some(op), Some(path)) => write!(f, " ({op} '{path}')"),
            (Some(op), None) => write!(f, " ({op})"),
            (None, Some(path)) => write!(f, " ('{path}')"),
            (None, None) => Ok(()),
        }
    }
}

impl AppError {
    /// Create a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            operation: None,
            path: None,
            source: None,
        }
    }

    /// Create a new error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            operation: None,
            path: None,
            source: Some(Box::new(source)),
        }
    }

    /// Attach facade context. An error that already carries an operation
    /// keeps its original context.
    pub fn at(mut self, operation: &'static str, path: impl fmt::Display) -> Self {
        if self.operation.is_none() {
            self.operation = Some(operation);
            self.path = Some(path.to_string());
        }
        self
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create an already-exists error.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    /// Create an invalid-path error.
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidPath, message)
    }

    /// Create a storage error without a cause.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    /// Create a schema-mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaMismatch, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an archive error.
    pub fn archive(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Archive, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Whether this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Storage, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_context() {
        let err = AppError::not_found("Resource does not exist").at("get_resource", "/a/b.txt");
        assert_eq!(
            err.to_string(),
            "NOT_FOUND: Resource does not exist (get_resource '/a/b.txt')"
        );
    }

    #[test]
    fn test_context_is_attached_once() {
        let err = AppError::storage("boom")
            .at("remove_collection", "/a")
            .at("import_zip", "/");
        assert_eq!(err.operation, Some("remove_collection"));
        assert_eq!(err.path.as_deref(), Some("/a"));
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: AppError = io.into();
        assert!(err.is(ErrorKind::Storage));
        assert!(std::error::Error::source(&err).is_some());
    }
}
