//! Configuration file loader.
//!
//! Unlike optional per-project tooling config, the analysis configuration
//! is required: without a database URI and storage credentials there is
//! nothing to hand the container, so a missing file is an error rather
//! than a default.

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::models::AnalysisConfig;
use std::path::Path;

/// Load and validate the analysis configuration from a TOML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, is not valid TOML,
/// or fails structural validation (empty instance id or service name).
pub fn load_config(path: &Path) -> ConfigResult<AnalysisConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let config: AnalysisConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?;

    if config.instance_id.is_empty() {
        return Err(ConfigError::InvalidConfig {
            path: path.to_path_buf(),
            reason: "instance_id must not be empty".to_string(),
        });
    }
    if config.service.is_empty() {
        return Err(ConfigError::InvalidConfig {
            path: path.to_path_buf(),
            reason: "service must not be empty".to_string(),
        });
    }

    Ok(config)
}
