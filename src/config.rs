//! Configuration System
//!
//! Studio settings: active provider, prompt mode, concurrency and per-provider
//! credentials. Loaded hierarchically (defaults, global file, explicit file,
//! environment) through the `config` crate and persisted through a
//! [`SettingsStore`].

use crate::error::GenerationError;
use crate::logging::LoggingConfig;
use crate::provider::ProviderKind;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod merge_policy;
mod sources;
mod store;

pub use store::{FileSettingsStore, MemorySettingsStore, SettingsStore};

pub const MIN_GENERATION_CONCURRENCY: usize = 1;
pub const MAX_GENERATION_CONCURRENCY: usize = 4;
pub const DEFAULT_GENERATION_CONCURRENCY: usize = 2;

pub const DEFAULT_FAL_MODEL: &str = "fal-ai/flux/schnell";
pub const DEFAULT_GOOGLE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_FIREFLY_MODEL: &str = "firefly-v3";

/// Clamp a requested worker count into the supported range. Zero selects the default.
pub fn effective_concurrency(requested: usize) -> usize {
    let requested = if requested == 0 {
        DEFAULT_GENERATION_CONCURRENCY
    } else {
        requested
    };
    requested.clamp(MIN_GENERATION_CONCURRENCY, MAX_GENERATION_CONCURRENCY)
}

/// How the common prompt is combined with each card prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Common prompt and card prompt joined by a blank line
    #[default]
    Simple,
    /// Common prompt is a template with `{{item}}` placeholders
    Advanced,
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudioConfig {
    #[serde(default)]
    pub active_provider: ProviderKind,

    #[serde(default)]
    pub mode: PromptMode,

    #[serde(default)]
    pub common_prompt: String,

    /// Requested number of concurrent workers (clamped at use)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_concurrency() -> usize {
    DEFAULT_GENERATION_CONCURRENCY
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            active_provider: ProviderKind::default(),
            mode: PromptMode::default(),
            common_prompt: String::new(),
            concurrency: default_concurrency(),
            providers: ProvidersConfig::default(),
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub fal: FalSettings,
    #[serde(default)]
    pub google: GoogleSettings,
    #[serde(default)]
    pub firefly: FireflySettings,
}

/// Which fal.ai endpoint family to call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FalEndpointMode {
    #[default]
    Sync,
    Queue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FalSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_fal_model")]
    pub model: String,
    #[serde(default)]
    pub endpoint_mode: FalEndpointMode,
    #[serde(default = "default_fal_sync_base")]
    pub sync_base_url: String,
    #[serde(default = "default_fal_queue_base")]
    pub queue_base_url: String,
    #[serde(default = "default_fal_models_url")]
    pub models_url: String,
}

fn default_fal_model() -> String {
    DEFAULT_FAL_MODEL.to_string()
}

fn default_fal_sync_base() -> String {
    "https://fal.run".to_string()
}

fn default_fal_queue_base() -> String {
    "https://queue.fal.run".to_string()
}

fn default_fal_models_url() -> String {
    "https://api.fal.ai/v1/models".to_string()
}

impl Default for FalSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_fal_model(),
            endpoint_mode: FalEndpointMode::default(),
            sync_base_url: default_fal_sync_base(),
            queue_base_url: default_fal_queue_base(),
            models_url: default_fal_models_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_google_model")]
    pub model: String,
    #[serde(default = "default_google_api_base")]
    pub api_base: String,
}

fn default_google_model() -> String {
    DEFAULT_GOOGLE_MODEL.to_string()
}

fn default_google_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_google_model(),
            api_base: default_google_api_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireflySettings {
    #[serde(default)]
    pub client_id: String,
    /// Session-only; cleared before settings are saved
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_firefly_api_base")]
    pub api_base: String,
    #[serde(default = "default_content_class")]
    pub content_class: String,
    #[serde(default)]
    pub proxy_url: String,
    #[serde(default)]
    pub proxy_token: String,
    #[serde(default = "default_firefly_model")]
    pub model: String,
}

fn default_firefly_api_base() -> String {
    "https://firefly-api.adobe.io".to_string()
}

fn default_content_class() -> String {
    "photo".to_string()
}

fn default_firefly_model() -> String {
    DEFAULT_FIREFLY_MODEL.to_string()
}

impl Default for FireflySettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            access_token: String::new(),
            api_base: default_firefly_api_base(),
            content_class: default_content_class(),
            proxy_url: String::new(),
            proxy_token: String::new(),
            model: default_firefly_model(),
        }
    }
}

impl FireflySettings {
    pub fn uses_proxy(&self) -> bool {
        !self.proxy_url.trim().is_empty()
    }

    pub fn has_direct_token(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.access_token.trim().is_empty()
    }
}

/// Storage locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the card database and requirement cache
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the data directory: explicit setting, then the platform data dir.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "batch-studio")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".batch-studio"))
    }

    pub fn cards_path(&self) -> PathBuf {
        self.resolve_data_dir().join("cards")
    }

    pub fn requirement_cache_path(&self) -> PathBuf {
        self.resolve_data_dir().join("model-requirements.json")
    }
}

impl StudioConfig {
    /// Model configured for a provider
    pub fn model_for(&self, provider: ProviderKind) -> &str {
        match provider {
            ProviderKind::Fal => &self.providers.fal.model,
            ProviderKind::Google => &self.providers.google.model,
            ProviderKind::Firefly => &self.providers.firefly.model,
        }
    }

    pub fn set_model_for(&mut self, provider: ProviderKind, model: impl Into<String>) {
        let model = model.into();
        match provider {
            ProviderKind::Fal => self.providers.fal.model = model,
            ProviderKind::Google => self.providers.google.model = model,
            ProviderKind::Firefly => self.providers.firefly.model = model,
        }
    }

    pub fn active_model(&self) -> &str {
        self.model_for(self.active_provider)
    }

    /// Frozen copy used for one generation: provider switched, optional model override.
    pub fn snapshot_for(&self, provider: ProviderKind, model_override: Option<&str>) -> StudioConfig {
        let mut snapshot = self.clone();
        snapshot.active_provider = provider;
        if let Some(model) = model_override.map(str::trim).filter(|m| !m.is_empty()) {
            snapshot.set_model_for(provider, model);
        }
        snapshot
    }

    pub fn effective_concurrency(&self) -> usize {
        effective_concurrency(self.concurrency)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for provider in ProviderKind::all() {
            if self.model_for(provider).trim().is_empty() {
                errors.push(format!("{}: model cannot be empty", provider.label()));
            }
        }

        let urls = [
            ("fal.sync_base_url", &self.providers.fal.sync_base_url),
            ("fal.queue_base_url", &self.providers.fal.queue_base_url),
            ("fal.models_url", &self.providers.fal.models_url),
            ("google.api_base", &self.providers.google.api_base),
            ("firefly.api_base", &self.providers.firefly.api_base),
        ];
        for (name, value) in urls {
            if let Err(e) = Url::parse(value) {
                errors.push(format!("{}: invalid URL '{}': {}", name, value, e));
            }
        }
        if self.providers.firefly.uses_proxy() {
            if let Err(e) = Url::parse(self.providers.firefly.proxy_url.trim()) {
                errors.push(format!("firefly.proxy_url: invalid URL: {}", e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Hierarchical configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from defaults, the global config file and the environment.
    pub fn load() -> Result<StudioConfig, GenerationError> {
        Self::load_with(None)
    }

    /// Load with an explicit file layered above the global file.
    pub fn load_from_file(path: &Path) -> Result<StudioConfig, GenerationError> {
        if !path.exists() {
            return Err(GenerationError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        Self::load_with(Some(path))
    }

    fn load_with(explicit: Option<&Path>) -> Result<StudioConfig, GenerationError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = sources::add_global_file(builder)?;
        if let Some(path) = explicit {
            builder = sources::add_explicit_file(builder, path)?;
        }
        builder = sources::add_environment(builder);

        let config: StudioConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}
