//! Path cache configuration.

use serde::{Deserialize, Serialize};

/// Settings for the path-keyed object cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When `false` every read falls through to the database.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum number of cached entries.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    /// TTL for cached entries in seconds.
    #[serde(default = "default_ttl")]
    pub time_to_live_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_capacity: default_max_capacity(),
            time_to_live_seconds: default_ttl(),
        }
    }
}

impl CacheConfig {
    /// A configuration that bypasses caching entirely.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_capacity() -> u64 {
    10000
}

fn default_ttl() -> u64 {
    300
}
