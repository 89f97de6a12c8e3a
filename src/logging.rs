//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt};

use vrepo_core::config::LoggingConfig;
use vrepo_core::error::AppError;
use vrepo_core::result::AppResult;

/// Install the global subscriber described by `config`.
///
/// Returns `false` when a subscriber was already installed (for example
/// by an earlier test); that is not an error.
pub fn init_logging(config: &LoggingConfig) -> AppResult<bool> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| {
        AppError::configuration(format!("Invalid log filter '{}': {e}", config.level))
    })?;

    let installed = match config.format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .try_init(),
        "pretty" => fmt()
            .pretty()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        other => {
            return Err(AppError::configuration(format!(
                "Unknown log format '{other}'. Supported: json, pretty"
            )));
        }
    };
    Ok(installed.is_ok())
}
