//! Persisted settings.

use super::StudioConfig;
use crate::error::{GenerationError, StorageError};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};

/// Load and save studio settings
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<StudioConfig, GenerationError>;
    fn save(&self, config: &StudioConfig) -> Result<(), GenerationError>;
}

/// Strip session-only secrets before anything is written.
fn persistable(config: &StudioConfig) -> StudioConfig {
    let mut copy = config.clone();
    copy.providers.firefly.access_token.clear();
    copy
}

/// TOML-backed settings file
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<StudioConfig, GenerationError> {
        if !self.path.exists() {
            return Ok(StudioConfig::default());
        }
        super::ConfigLoader::load_from_file(&self.path)
    }

    fn save(&self, config: &StudioConfig) -> Result<(), GenerationError> {
        let text = toml::to_string_pretty(&persistable(config))
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StorageError::from)?;
            }
        }
        std::fs::write(&self.path, text).map_err(StorageError::from)?;
        Ok(())
    }
}

/// In-process settings, for tests and embedding
#[derive(Default)]
pub struct MemorySettingsStore {
    inner: RwLock<Option<StudioConfig>>,
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<StudioConfig, GenerationError> {
        Ok(self.inner.read().clone().unwrap_or_default())
    }

    fn save(&self, config: &StudioConfig) -> Result<(), GenerationError> {
        *self.inner.write() = Some(persistable(config));
        Ok(())
    }
}
