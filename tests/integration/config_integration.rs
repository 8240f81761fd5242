//! Integration tests for configuration layering and persisted settings

use crate::integration::test_utils::with_env;
use batch_studio::config::{
    ConfigLoader, FalEndpointMode, FileSettingsStore, PromptMode, SettingsStore, StudioConfig,
};
use batch_studio::error::ErrorKind;
use batch_studio::provider::ProviderKind;
use tempfile::TempDir;

#[test]
fn test_explicit_file_overrides_defaults() {
    let test_dir = TempDir::new().unwrap();
    let config_file = test_dir.path().join("studio.toml");
    std::fs::write(
        &config_file,
        r#"
active_provider = "google"
mode = "advanced"
common_prompt = "Poster of {{item}}"
concurrency = 3

[providers.fal]
endpoint_mode = "queue"

[providers.google]
api_key = "g-key"
"#,
    )
    .unwrap();

    let config = with_env(&test_dir, &[], || ConfigLoader::load_from_file(&config_file)).unwrap();
    assert_eq!(config.active_provider, ProviderKind::Google);
    assert_eq!(config.mode, PromptMode::Advanced);
    assert_eq!(config.effective_concurrency(), 3);
    assert_eq!(config.providers.fal.endpoint_mode, FalEndpointMode::Queue);
    assert_eq!(config.providers.google.api_key, "g-key");
    // Untouched sections keep their defaults
    assert_eq!(config.providers.fal.sync_base_url, "https://fal.run");
    assert!(config.validate().is_ok());
}

#[test]
fn test_environment_overrides_files() {
    let test_dir = TempDir::new().unwrap();
    let global_dir = test_dir.path().join("batch-studio");
    std::fs::create_dir_all(&global_dir).unwrap();
    std::fs::write(
        global_dir.join("config.toml"),
        "concurrency = 1\n\n[providers.fal]\napi_key = \"from-file\"\n",
    )
    .unwrap();

    let config = with_env(
        &test_dir,
        &[
            ("BATCH_STUDIO__CONCURRENCY", "4"),
            ("BATCH_STUDIO__PROVIDERS__FAL__API_KEY", "from-env"),
        ],
        ConfigLoader::load,
    )
    .unwrap();
    assert_eq!(config.concurrency, 4);
    assert_eq!(config.providers.fal.api_key, "from-env");
}

#[test]
fn test_global_file_is_read_from_config_home() {
    let test_dir = TempDir::new().unwrap();
    let global_dir = test_dir.path().join("batch-studio");
    std::fs::create_dir_all(&global_dir).unwrap();
    std::fs::write(global_dir.join("config.toml"), "active_provider = \"firefly\"\n").unwrap();

    let config = with_env(&test_dir, &[], ConfigLoader::load).unwrap();
    assert_eq!(config.active_provider, ProviderKind::Firefly);
}

#[test]
fn test_missing_explicit_file_is_config_error() {
    let test_dir = TempDir::new().unwrap();
    let missing = test_dir.path().join("nope.toml");
    let err = ConfigLoader::load_from_file(&missing).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("nope.toml"));
}

#[test]
fn test_settings_file_round_trip_drops_session_token() {
    let test_dir = TempDir::new().unwrap();
    let store = FileSettingsStore::new(test_dir.path().join("settings").join("studio.toml"));

    let mut config = StudioConfig::default();
    config.active_provider = ProviderKind::Firefly;
    config.providers.firefly.client_id = "client-1".to_string();
    config.providers.firefly.access_token = "short-lived".to_string();
    config.concurrency = 4;
    store.save(&config).unwrap();

    let loaded = with_env(&test_dir, &[], || store.load()).unwrap();
    assert_eq!(loaded.active_provider, ProviderKind::Firefly);
    assert_eq!(loaded.providers.firefly.client_id, "client-1");
    assert!(loaded.providers.firefly.access_token.is_empty());
    assert_eq!(loaded.concurrency, 4);
}
