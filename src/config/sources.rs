//! Config sources: global file under the XDG config dir, an explicit file and
//! `BATCH_STUDIO__*` environment variables.

use crate::error::GenerationError;
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Path to the global config file.
/// Uses XDG_CONFIG_HOME when set, otherwise ~/.config/batch-studio/config.toml.
pub fn global_config_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg).join("batch-studio").join("config.toml"));
        }
    }
    directories::BaseDirs::new().map(|dirs| {
        dirs.home_dir()
            .join(".config")
            .join("batch-studio")
            .join("config.toml")
    })
}

/// Add the global config file if it exists.
pub fn add_global_file(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, GenerationError> {
    match global_config_path() {
        Some(path) if path.exists() => {
            debug!(config_path = %path.display(), "Loading global configuration");
            Ok(builder.add_source(File::from(path).required(false)))
        }
        Some(path) => {
            debug!(config_path = %path.display(), "No global configuration file");
            Ok(builder)
        }
        None => Ok(builder),
    }
}

/// Add an explicitly requested file. It must exist.
pub fn add_explicit_file(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<ConfigBuilder<DefaultState>, GenerationError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| GenerationError::Config(format!("{}: {}", path.display(), e)))?;
    debug!(config_path = %canonical.display(), "Loading configuration file");
    Ok(builder.add_source(File::from(canonical).required(true)))
}

/// Environment overrides, e.g. `BATCH_STUDIO__PROVIDERS__FAL__API_KEY`.
pub fn add_environment(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("BATCH_STUDIO")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
