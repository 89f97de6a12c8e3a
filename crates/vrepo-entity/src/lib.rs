//! # vrepo-entity
//!
//! Entity value objects for the repository. Every entity is materialized
//! from a query on demand and holds no references to its parent or its
//! children; relationships are expressed purely through path prefixes.

pub mod file;
pub mod folder;
pub mod object;

pub use file::{FileVersion, Resource, ResourceMeta};
pub use folder::Folder;
pub use object::{EntityInfo, ObjectKind, RepositoryObject};
