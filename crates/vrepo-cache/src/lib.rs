//! # vrepo-cache
//!
//! Path-keyed cache in front of the repository read paths.
//!
//! - **memory**: in-process cache using [moka](https://crates.io/crates/moka)
//! - **disabled**: no provider at all; every read falls through
//!
//! The mode is selected at construction time from [`CacheConfig`].
//!
//! [`CacheConfig`]: vrepo_core::config::CacheConfig

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;

pub use provider::{CacheManager, CachedValue};
