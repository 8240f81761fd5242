//! fal.ai client: immediate-response (`sync`) and queue-with-polling modes.

use super::http::{
    join_model_path, send_json, sleep_or_cancel, summarize_payload, PollPolicy,
};
use super::{extract_image_url, GenerationRequest, GenerationResult, ImageProvider, ProviderKind};
use crate::config::{FalEndpointMode, DEFAULT_FAL_MODEL};
use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct FalClient {
    http: Client,
    queue_poll: PollPolicy,
}

impl FalClient {
    pub fn new(http: Client, queue_poll: PollPolicy) -> Self {
        Self { http, queue_poll }
    }

    fn authorized(&self, builder: RequestBuilder, api_key: &str) -> RequestBuilder {
        builder.header("Authorization", format!("Key {}", api_key))
    }

    async fn poll_queue(
        &self,
        status_url: &str,
        api_key: &str,
        cancel: &CancellationToken,
    ) -> Result<Value, GenerationError> {
        for attempt in 1..=self.queue_poll.max_attempts {
            let status = send_json(self.authorized(self.http.get(status_url), api_key), cancel)
                .await?
                .body;
            let state = status.get("status").and_then(Value::as_str).unwrap_or("");
            debug!(attempt, status = state, "fal queue poll");

            match state {
                "COMPLETED" => {
                    let response_url = status
                        .get("response_url")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| {
                            GenerationError::api("fal queue completed but response_url is missing")
                        })?;
                    let result =
                        send_json(self.authorized(self.http.get(response_url), api_key), cancel)
                            .await?;
                    return Ok(result.body);
                }
                "FAILED" => {
                    let message = status
                        .get("error")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .unwrap_or("fal queue job failed");
                    return Err(GenerationError::api(message));
                }
                _ => {}
            }

            sleep_or_cancel(self.queue_poll.interval, cancel).await?;
        }

        warn!(
            max_attempts = self.queue_poll.max_attempts,
            "fal queue polling exhausted"
        );
        Err(GenerationError::Timeout("fal queue polling timed out".to_string()))
    }
}

#[async_trait]
impl ImageProvider for FalClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        let settings = &request.config.providers.fal;
        let api_key = settings.api_key.trim();
        if api_key.is_empty() {
            return Err(GenerationError::Config(
                "fal.ai API key is not configured".to_string(),
            ));
        }

        let model = if settings.model.trim().is_empty() {
            DEFAULT_FAL_MODEL
        } else {
            settings.model.trim()
        };
        let base = match settings.endpoint_mode {
            FalEndpointMode::Sync => &settings.sync_base_url,
            FalEndpointMode::Queue => &settings.queue_base_url,
        };
        let endpoint = join_model_path(base, model)?;

        let mut body = Map::new();
        body.insert("prompt".to_string(), Value::String(request.final_prompt.clone()));
        for (key, value) in &request.provider_input {
            body.insert(key.clone(), value.clone());
        }

        let started = Instant::now();
        info!(
            provider = "fal",
            model,
            mode = ?settings.endpoint_mode,
            "Submitting generation"
        );
        let submitted = send_json(
            self.authorized(self.http.post(endpoint), api_key).json(&body),
            &request.cancel,
        )
        .await?;
        debug!(status = submitted.status.as_u16(), "fal submit accepted");

        let payload = match settings.endpoint_mode {
            FalEndpointMode::Sync => submitted.body,
            FalEndpointMode::Queue => {
                let status_url = submitted
                    .body
                    .get("status_url")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        GenerationError::api("fal queue response did not include status_url")
                    })?
                    .to_string();
                self.poll_queue(&status_url, api_key, &request.cancel).await?
            }
        };

        let image_url = extract_image_url(&payload).ok_or_else(|| {
            GenerationError::api(format!(
                "fal.ai response did not include an image. payload={}",
                summarize_payload(&payload)
            ))
        })?;

        info!(
            provider = "fal",
            model,
            duration_ms = started.elapsed().as_millis() as u64,
            "Generation completed"
        );
        Ok(GenerationResult {
            image_url,
            provider: ProviderKind::Fal,
            model: model.to_string(),
            raw: payload,
        })
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Fal
    }
}
