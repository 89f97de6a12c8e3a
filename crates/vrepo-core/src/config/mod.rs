//! Configuration schemas.
//!
//! All configuration structs are deserialized from a TOML file via the
//! `config` crate. Every field has a serde default, so a missing section
//! (or an empty file) yields a working configuration.

pub mod cache;
pub mod database;
pub mod logging;
pub mod repository;

use serde::{Deserialize, Serialize};

pub use self::cache::CacheConfig;
pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::repository::RepositoryConfig;

use crate::error::AppError;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection and pool settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Path cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Content storage and retention settings.
    #[serde(default)]
    pub repository: RepositoryConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// The file extension may be omitted. A missing file is an error;
    /// use [`AppConfig::default`] for an all-defaults configuration.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(true))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Configuration pointing at the given database URL, all else default.
    pub fn for_database(url: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::with_url(url),
            ..Self::default()
        }
    }
}
