//! In-memory cache provider backed by moka.

pub mod store;

pub use store::MemoryCacheProvider;
