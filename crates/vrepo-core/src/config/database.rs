//! Database connection and pool configuration.

use serde::{Deserialize, Serialize};

/// Connection settings for the bounded pool wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL (`sqlite://`, `postgres://`, `mysql://`).
    #[serde(default = "default_url")]
    pub url: String,
    /// Maximum number of physically open connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// How many bounded waits an acquirer performs before evicting the
    /// oldest connection.
    #[serde(default = "default_wait_attempts")]
    pub acquire_wait_attempts: u32,
    /// Length of each bounded wait in milliseconds.
    #[serde(default = "default_wait_interval")]
    pub acquire_wait_interval_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
            acquire_wait_attempts: default_wait_attempts(),
            acquire_wait_interval_ms: default_wait_interval(),
        }
    }
}

impl DatabaseConfig {
    /// Configuration for the given URL with default pool limits.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

fn default_url() -> String {
    "sqlite://data/repository.db?mode=rwc".to_string()
}

fn default_max_connections() -> usize {
    8
}

fn default_wait_attempts() -> u32 {
    5
}

fn default_wait_interval() -> u64 {
    500
}
