//! Repository behaviour settings.

use serde::{Deserialize, Serialize};

/// Settings that shape content storage and version retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Audit name recorded when no explicit user is supplied.
    #[serde(default = "default_user")]
    pub default_user: String,
    /// Versions older than this many days are purged by cleanup.
    #[serde(default = "default_retention_days")]
    pub version_retention_days: u32,
    /// Characters per stored document chunk.
    #[serde(default = "default_chunk_size")]
    pub text_chunk_size: usize,
    /// Period of the background version cleanup; `0` disables it.
    #[serde(default)]
    pub cleanup_interval_seconds: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_user: default_user(),
            version_retention_days: default_retention_days(),
            text_chunk_size: default_chunk_size(),
            cleanup_interval_seconds: 0,
        }
    }
}

fn default_user() -> String {
    "system".to_string()
}

fn default_retention_days() -> u32 {
    30
}

fn default_chunk_size() -> usize {
    16384
}
