//! Zip import and export.
//!
//! Archives use `/` separators. Folders are written as directory entries
//! only when they are empty, since every other folder is implied by the
//! entries beneath it. Zip encoding and decoding run on the blocking
//! pool; the repository reads and writes around them stay async.

mod export;
mod import;

use vrepo_core::error::{AppError, ErrorKind};

/// Outcome of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Directory entries applied.
    pub folders: u64,
    /// Resources created or overwritten.
    pub resources: u64,
    /// Entries left untouched: existing resources without override, and
    /// names that would escape the target root.
    pub skipped: u64,
}

/// Map a zip failure into an `Archive` error.
pub(crate) fn zip_error(context: &str, err: zip::result::ZipError) -> AppError {
    AppError::with_source(ErrorKind::Archive, format!("{context}: {err}"), err)
}

/// Map an I/O failure while encoding or decoding an archive.
pub(crate) fn io_error(context: &str, err: std::io::Error) -> AppError {
    AppError::with_source(ErrorKind::Archive, format!("{context}: {err}"), err)
}

/// Map a join failure of a blocking archive task.
pub(crate) fn join_error(err: tokio::task::JoinError) -> AppError {
    AppError::with_source(ErrorKind::Internal, "Archive task failed", err)
}
