//! Core value types shared across the workspace.

pub mod pagination;
pub mod path;

pub use pagination::{PageRequest, PageResponse};
pub use path::RepositoryPath;
