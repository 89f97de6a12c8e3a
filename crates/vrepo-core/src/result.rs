//! Convenience result type alias for vrepo.

use crate::error::AppError;

/// A specialized `Result` type for repository operations.
pub type AppResult<T> = Result<T, AppError>;
