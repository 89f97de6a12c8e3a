//! # vrepo-core
//!
//! Core crate for vrepo. Contains the error taxonomy, configuration
//! schemas, the repository path model, pagination, and the traits that
//! other crates implement (cache providers, content-type resolvers).
//!
//! This crate has **no** internal dependencies on other vrepo crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
pub use types::{PageRequest, PageResponse, RepositoryPath};
