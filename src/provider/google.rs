//! Google AI Studio client: one `generateContent` call returning inline image data.

use super::http::{join_model_path, send_json, summarize_payload};
use super::{extract_image_url, GenerationRequest, GenerationResult, ImageProvider, ProviderKind};
use crate::config::DEFAULT_GOOGLE_MODEL;
use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Instant;
use tracing::info;

pub struct GoogleClient {
    http: Client,
}

impl GoogleClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ImageProvider for GoogleClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        let settings = &request.config.providers.google;
        let api_key = settings.api_key.trim();
        if api_key.is_empty() {
            return Err(GenerationError::Config(
                "Google API key is not configured".to_string(),
            ));
        }

        let model = if settings.model.trim().is_empty() {
            DEFAULT_GOOGLE_MODEL
        } else {
            settings.model.trim()
        };
        // The model id is a single path segment followed by the method suffix
        let mut endpoint = join_model_path(&settings.api_base, "models")?;
        endpoint
            .path_segments_mut()
            .map_err(|_| GenerationError::Config("Google API base cannot be a base".to_string()))?
            .push(&format!("{}:generateContent", model));

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.final_prompt }]
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"]
            }
        });

        let started = Instant::now();
        info!(provider = "google", model, "Submitting generation");
        let response = send_json(
            self.http
                .post(endpoint)
                .header("x-goog-api-key", api_key)
                .json(&body),
            &request.cancel,
        )
        .await?;

        let image_url = extract_image_url(&response.body).ok_or_else(|| {
            GenerationError::api(format!(
                "Google response did not include an image. payload={}",
                summarize_payload(&response.body)
            ))
        })?;

        info!(
            provider = "google",
            model,
            duration_ms = started.elapsed().as_millis() as u64,
            "Generation completed"
        );
        Ok(GenerationResult {
            image_url,
            provider: ProviderKind::Google,
            model: model.to_string(),
            raw: response.body,
        })
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }
}
