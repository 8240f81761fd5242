//! Model catalog: paginated model listings for fal.ai and Google, plus the
//! per-model OpenAPI lookup used for capability resolution.

use crate::config::StudioConfig;
use crate::error::GenerationError;
use crate::provider::http::{send_json, trim_base};
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const MAX_FAL_MODEL_PAGES: usize = 20;
pub const MAX_GOOGLE_MODEL_PAGES: usize = 8;
const PAGE_SIZE: &str = "200";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub label: String,
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Model list from a bare array or a `models`/`data`/`items` wrapper.
fn extract_model_list(payload: &Value) -> &[Value] {
    if let Some(list) = payload.as_array() {
        return list;
    }
    ["models", "data", "items"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn normalize_fal_item(raw: &Value) -> Option<ModelEntry> {
    let id = first_str(
        raw,
        &["endpoint_id", "endpointId", "id", "modelId", "slug", "name", "path"],
    )?;
    let label = raw
        .get("metadata")
        .and_then(|m| first_str(m, &["display_name", "displayName"]))
        .or_else(|| first_str(raw, &["title", "displayName", "name"]))
        .unwrap_or(id);
    Some(ModelEntry {
        id: id.to_string(),
        label: label.to_string(),
    })
}

fn normalize_google_item(raw: &Value) -> Option<ModelEntry> {
    let name = raw.get("name").and_then(Value::as_str)?;
    if let Some(methods) = raw.get("supportedGenerationMethods").and_then(Value::as_array) {
        let invokable = methods
            .iter()
            .any(|m| m.as_str() == Some("generateContent"));
        if !methods.is_empty() && !invokable {
            return None;
        }
    }
    let id = name.strip_prefix("models/").unwrap_or(name).trim();
    if id.is_empty() || id.contains("embedding") {
        return None;
    }
    Some(ModelEntry {
        id: id.to_string(),
        label: id.to_string(),
    })
}

/// Drop repeated ids (first wins) and sort by label, then id.
fn finalize(entries: Vec<ModelEntry>) -> Vec<ModelEntry> {
    let mut seen = HashSet::new();
    let mut unique: Vec<ModelEntry> = entries
        .into_iter()
        .filter(|entry| seen.insert(entry.id.clone()))
        .collect();
    unique.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.id.cmp(&b.id)));
    unique
}

pub fn normalize_fal_models(payload: &Value) -> Vec<ModelEntry> {
    finalize(extract_model_list(payload).iter().filter_map(normalize_fal_item).collect())
}

pub fn normalize_google_models(payload: &Value) -> Vec<ModelEntry> {
    let list = payload
        .get("models")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    finalize(list.iter().filter_map(normalize_google_item).collect())
}

fn parse_url(raw: &str) -> Result<Url, GenerationError> {
    Url::parse(raw.trim()).map_err(|e| GenerationError::Config(format!("Invalid URL '{}': {}", raw, e)))
}

/// All fal.ai models visible to the configured key.
pub async fn fetch_fal_models(
    http: &Client,
    config: &StudioConfig,
    cancel: &CancellationToken,
) -> Result<Vec<ModelEntry>, GenerationError> {
    let settings = &config.providers.fal;
    let api_key = settings.api_key.trim();
    if api_key.is_empty() {
        return Err(GenerationError::Config(
            "Set a fal.ai API key to list models".to_string(),
        ));
    }

    let mut collected = Vec::new();
    let mut cursor: Option<String> = None;
    for page in 0..MAX_FAL_MODEL_PAGES {
        let mut url = parse_url(&settings.models_url)?;
        url.query_pairs_mut().append_pair("limit", PAGE_SIZE);
        if let Some(cursor) = &cursor {
            url.query_pairs_mut().append_pair("cursor", cursor);
        }

        let payload = send_json(
            http.get(url)
                .header("Authorization", format!("Key {}", api_key)),
            cancel,
        )
        .await?
        .body;
        collected.extend(normalize_fal_models(&payload));

        let next = payload
            .get("next_cursor")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        debug!(page, collected = collected.len(), has_next = next.is_some(), "fal model page");
        match next {
            Some(next) => cursor = Some(next.to_string()),
            None => break,
        }
    }

    let models = finalize(collected);
    if models.is_empty() {
        return Err(GenerationError::api("fal.ai returned an empty model list"));
    }
    Ok(models)
}

/// Google models that can be invoked with `generateContent`.
pub async fn fetch_google_models(
    http: &Client,
    config: &StudioConfig,
    cancel: &CancellationToken,
) -> Result<Vec<ModelEntry>, GenerationError> {
    let settings = &config.providers.google;
    let api_key = settings.api_key.trim();
    if api_key.is_empty() {
        return Err(GenerationError::Config(
            "Set a Google API key to list models".to_string(),
        ));
    }

    let mut collected = Vec::new();
    let mut page_token: Option<String> = None;
    for page in 0..MAX_GOOGLE_MODEL_PAGES {
        let mut url = parse_url(&format!("{}/models", trim_base(&settings.api_base)))?;
        url.query_pairs_mut()
            .append_pair("key", api_key)
            .append_pair("pageSize", PAGE_SIZE);
        if let Some(token) = &page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }

        let payload = send_json(http.get(url), cancel).await?.body;
        collected.extend(normalize_google_models(&payload));

        let next = payload
            .get("nextPageToken")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        debug!(page, collected = collected.len(), has_next = next.is_some(), "Google model page");
        match next {
            Some(next) => page_token = Some(next.to_string()),
            None => break,
        }
    }

    let models = finalize(collected);
    if models.is_empty() {
        return Err(GenerationError::api("Google returned an empty model list"));
    }
    Ok(models)
}

fn find_raw_fal_model<'a>(payload: &'a Value, endpoint_id: &str) -> Option<&'a Value> {
    let list = extract_model_list(payload);
    list.iter()
        .find(|entry| {
            first_str(entry, &["endpoint_id", "endpointId", "id", "name"]) == Some(endpoint_id)
        })
        .or_else(|| list.first())
}

fn extract_openapi(raw_model: &Value) -> Option<&Value> {
    const KEYS: &[&str] = &["openapi-3.0", "openapi_3_0", "openapi"];
    KEYS.iter()
        .find_map(|key| raw_model.get(*key).filter(|v| v.is_object()))
        .or_else(|| {
            let metadata = raw_model.get("metadata")?;
            KEYS.iter()
                .find_map(|key| metadata.get(*key).filter(|v| v.is_object()))
        })
}

/// OpenAPI document of one fal.ai endpoint.
pub async fn fetch_fal_model_openapi(
    http: &Client,
    config: &StudioConfig,
    endpoint_id: &str,
    cancel: &CancellationToken,
) -> Result<Value, GenerationError> {
    let settings = &config.providers.fal;
    let api_key = settings.api_key.trim();
    if api_key.is_empty() {
        return Err(GenerationError::Config(
            "Set a fal.ai API key to read model input requirements".to_string(),
        ));
    }
    let endpoint_id = endpoint_id.trim();
    if endpoint_id.is_empty() {
        return Err(GenerationError::Validation("Model id is not set".to_string()));
    }

    let mut url = parse_url(&settings.models_url)?;
    url.query_pairs_mut()
        .append_pair("endpoint_id", endpoint_id)
        .append_pair("expand", "openapi-3.0")
        .append_pair("limit", "1");

    let payload = send_json(
        http.get(url)
            .header("Authorization", format!("Key {}", api_key)),
        cancel,
    )
    .await?
    .body;

    find_raw_fal_model(&payload, endpoint_id)
        .and_then(extract_openapi)
        .cloned()
        .ok_or_else(|| GenerationError::api("Model details did not include an OpenAPI schema"))
}
