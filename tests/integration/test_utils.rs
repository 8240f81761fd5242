//! Shared test utilities for integration tests
//!
//! Environment isolation for config loading, plus configs that point every
//! provider at a mock server.

#![allow(dead_code)]

use batch_studio::config::{FalEndpointMode, StudioConfig};
use std::sync::Mutex;
use tempfile::TempDir;

/// Serializes environment variable access across tests running in parallel
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Environment variable state to restore after a test
struct EnvState {
    saved: Vec<(String, Option<String>)>,
}

impl EnvState {
    fn capture(keys: &[&str]) -> Self {
        Self {
            saved: keys
                .iter()
                .map(|key| (key.to_string(), std::env::var(key).ok()))
                .collect(),
        }
    }

    fn restore(self) {
        for (key, value) in self.saved {
            match value {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// Run `f` with XDG_CONFIG_HOME and HOME inside `test_dir` and the given extra
/// variables set. Everything is restored afterwards.
///
/// # Example
/// ```
/// use tempfile::TempDir;
/// use crate::test_utils::with_env;
///
/// let test_dir = TempDir::new().unwrap();
/// with_env(&test_dir, &[("BATCH_STUDIO__CONCURRENCY", "3")], || {
///     // ConfigLoader::load() sees only test_dir and the variables above
/// });
/// ```
pub fn with_env<F, R>(test_dir: &TempDir, vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let mut keys = vec!["HOME", "XDG_CONFIG_HOME"];
    keys.extend(vars.iter().map(|(key, _)| *key));
    let env_state = EnvState::capture(&keys);

    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_home).unwrap();
    std::env::set_var("HOME", &test_home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path());
    for (key, value) in vars {
        std::env::set_var(key, value);
    }

    let result = f();

    env_state.restore();
    result
}

/// fal.ai settings aimed at `base`, synchronous endpoint.
pub fn fal_config(base: &str) -> StudioConfig {
    let mut config = StudioConfig::default();
    config.providers.fal.api_key = "fal-test-key".to_string();
    config.providers.fal.model = "fal-ai/flux/dev".to_string();
    config.providers.fal.sync_base_url = base.to_string();
    config.providers.fal.queue_base_url = format!("{}/queue", base);
    config.providers.fal.models_url = format!("{}/v1/models", base);
    config
}

/// fal.ai settings aimed at `base`, queue endpoint.
pub fn fal_queue_config(base: &str) -> StudioConfig {
    let mut config = fal_config(base);
    config.providers.fal.endpoint_mode = FalEndpointMode::Queue;
    config
}

/// Minimal fal model listing carrying an OpenAPI document whose request body
/// schema is `input`.
pub fn fal_model_listing(endpoint_id: &str, input: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "models": [{
            "endpoint_id": endpoint_id,
            "metadata": {"display_name": endpoint_id},
            "openapi": {
                "openapi": "3.0.0",
                "paths": {
                    format!("/{}", endpoint_id): {
                        "post": {
                            "requestBody": {
                                "content": {
                                    "application/json": {
                                        "schema": {"$ref": "#/components/schemas/Input"}
                                    }
                                }
                            }
                        }
                    }
                },
                "components": {"schemas": {"Input": input}}
            }
        }]
    })
}
