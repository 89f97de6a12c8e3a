//! # vrepo-service
//!
//! The public repository facade. [`RepositoryService`] validates paths,
//! serializes writers per path, keeps the path cache coherent, and
//! attaches operation context to every error before it reaches the
//! caller. Zip import/export and version retention are built on top of
//! it.
//!
//! Services follow constructor injection: the store, cache, and
//! content-type resolver are handed in at construction time.

pub mod archive;
pub mod content_type;
pub mod locks;
pub mod maintenance;
pub mod repository;

#[cfg(test)]
mod testing;

pub use archive::ImportSummary;
pub use content_type::{ExtensionMapResolver, MimeGuessResolver};
pub use locks::PathLocks;
pub use maintenance::{CleanupTask, spawn_version_cleanup};
pub use repository::{RepositoryService, ResourceOptions};
