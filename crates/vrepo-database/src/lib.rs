//! # vrepo-database
//!
//! Relational persistence for the repository: engine dialects, the
//! bounded connection pool with leak eviction, schema bootstrap and
//! migration, the folder/file/version/search DAOs, and the
//! [`RepositoryStore`] facade that coordinates them.

pub mod connection;
pub mod dialect;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::{ConnectionPool, PoolStats, PooledConnection};
pub use dialect::{Dialect, DialectKind, DialectRegistry, MatchMode};
pub use store::{NewContent, RepositoryStore, StoreOptions};
