mod config;

pub use config::{Config, FeatureDefaults, SessionDefaults, SyncConfig};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/breathflow[-dev]/` based on BREATHFLOW_ENV.
///
/// Set BREATHFLOW_ENV=dev to use development data directory.
/// BREATHFLOW_DATA_DIR overrides both.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("BREATHFLOW_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("BREATHFLOW_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("breathflow-dev")
            } else {
                base_dir.join("breathflow")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
