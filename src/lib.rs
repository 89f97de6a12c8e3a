//! # vrepo
//!
//! A database-backed virtual repository: path-addressed folders and
//! versioned resources stored over a bounded pool of SQL connections,
//! with a path cache, zip import/export, and version retention.
//!
//! [`bootstrap::open`] wires every crate together from an [`AppConfig`];
//! [`logging::init_logging`] installs the tracing subscriber.

pub mod bootstrap;
pub mod logging;

pub use bootstrap::{Repository, open};
pub use logging::init_logging;

pub use vrepo_core::config::{AppConfig, CacheConfig, DatabaseConfig, LoggingConfig, RepositoryConfig};
pub use vrepo_core::traits::ContentTypeResolver;
pub use vrepo_core::{AppError, AppResult, ErrorKind, PageRequest, PageResponse, RepositoryPath};
pub use vrepo_entity::{FileVersion, Folder, RepositoryObject, Resource, ResourceMeta};
pub use vrepo_service::{
    ExtensionMapResolver, ImportSummary, MimeGuessResolver, RepositoryService, ResourceOptions,
};
