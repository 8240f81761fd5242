//! Adobe Firefly client.
//!
//! Proxy mode posts to a credential-exchanging proxy and expects the final
//! payload back. Direct mode submits an async job with an access token; the
//! submit response may already carry the image, otherwise the job is polled
//! until an image reference appears.

use super::http::{
    send_json, sleep_or_cancel, summarize_payload, trim_base, JsonResponse, PollPolicy,
};
use super::{extract_image_url, GenerationRequest, GenerationResult, ImageProvider, ProviderKind};
use crate::config::{FireflySettings, DEFAULT_FIREFLY_MODEL};
use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SUCCESS_STATES: &[&str] = &["succeeded", "completed", "done"];
const FAILURE_STATES: &[&str] = &["failed", "error", "canceled"];

pub struct FireflyClient {
    http: Client,
    poll: PollPolicy,
}

fn model_of(settings: &FireflySettings) -> &str {
    if settings.model.trim().is_empty() {
        DEFAULT_FIREFLY_MODEL
    } else {
        settings.model.trim()
    }
}

/// Status URL from the submit body or the `Location` header.
fn resolve_status_url(response: &JsonResponse) -> Option<String> {
    response
        .body
        .get("statusUrl")
        .or_else(|| response.body.get("status_url"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| response.location.clone().filter(|s| !s.is_empty()))
}

impl FireflyClient {
    pub fn new(http: Client, poll: PollPolicy) -> Self {
        Self { http, poll }
    }

    async fn generate_via_proxy(
        &self,
        prompt: &str,
        settings: &FireflySettings,
        cancel: &CancellationToken,
    ) -> Result<Value, GenerationError> {
        let proxy = trim_base(&settings.proxy_url);
        let mut builder = self
            .http
            .post(format!("{}/generate", proxy))
            .json(&json!({ "prompt": prompt, "model": model_of(settings) }));
        let token = settings.proxy_token.trim();
        if !token.is_empty() {
            builder = builder.header("x-proxy-token", token);
        }
        Ok(send_json(builder, cancel).await?.body)
    }

    async fn generate_direct(
        &self,
        prompt: &str,
        settings: &FireflySettings,
        cancel: &CancellationToken,
    ) -> Result<Value, GenerationError> {
        let access_token = settings.access_token.trim();
        let client_id = settings.client_id.trim();
        if access_token.is_empty() || client_id.is_empty() {
            return Err(GenerationError::Config(
                "Firefly client ID and access token are required".to_string(),
            ));
        }

        let content_class = if settings.content_class.trim().is_empty() {
            "photo"
        } else {
            settings.content_class.trim()
        };
        let body = json!({
            "prompt": prompt,
            "numVariations": 1,
            "contentClass": content_class,
            "model": model_of(settings),
        });
        let url = format!("{}/v3/images/generate-async", trim_base(&settings.api_base));

        let submitted = send_json(
            self.authorized(self.http.post(url), access_token, client_id)
                .json(&body),
            cancel,
        )
        .await?;

        if extract_image_url(&submitted.body).is_some() {
            debug!("Firefly submit returned a finished image");
            return Ok(submitted.body);
        }

        let status_url = resolve_status_url(&submitted)
            .ok_or_else(|| GenerationError::api("Firefly response missing status URL"))?;
        self.poll_status(&status_url, access_token, client_id, cancel)
            .await
    }

    fn authorized(&self, builder: RequestBuilder, access_token: &str, client_id: &str) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", access_token))
            .header("x-api-key", client_id)
    }

    async fn poll_status(
        &self,
        status_url: &str,
        access_token: &str,
        client_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Value, GenerationError> {
        for attempt in 1..=self.poll.max_attempts {
            let payload = send_json(
                self.authorized(self.http.get(status_url), access_token, client_id),
                cancel,
            )
            .await?
            .body;

            if extract_image_url(&payload).is_some() {
                return Ok(payload);
            }

            let status = payload
                .get("status")
                .or_else(|| payload.get("state"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_ascii_lowercase();
            debug!(attempt, status = %status, "Firefly poll");

            if SUCCESS_STATES.contains(&status.as_str()) {
                return Err(GenerationError::api(
                    "Firefly job finished but image URL was not found in polling payload.",
                ));
            }
            if FAILURE_STATES.contains(&status.as_str()) {
                let reason = payload
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .or_else(|| payload.get("message"))
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(status.as_str())
                    .to_string();
                return Err(GenerationError::api(format!("Firefly job failed: {}", reason)));
            }

            sleep_or_cancel(self.poll.interval, cancel).await?;
        }

        warn!(max_attempts = self.poll.max_attempts, "Firefly polling exhausted");
        Err(GenerationError::Timeout("Firefly polling timed out".to_string()))
    }
}

#[async_trait]
impl ImageProvider for FireflyClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        let settings = &request.config.providers.firefly;
        let model = model_of(settings);
        let started = Instant::now();
        info!(
            provider = "firefly",
            model,
            proxy = settings.uses_proxy(),
            "Submitting generation"
        );

        let payload = if settings.uses_proxy() {
            self.generate_via_proxy(&request.final_prompt, settings, &request.cancel)
                .await?
        } else {
            self.generate_direct(&request.final_prompt, settings, &request.cancel)
                .await?
        };

        let image_url = extract_image_url(&payload).ok_or_else(|| {
            GenerationError::api(format!(
                "Firefly response did not include an image. payload={}",
                summarize_payload(&payload)
            ))
        })?;

        info!(
            provider = "firefly",
            model,
            duration_ms = started.elapsed().as_millis() as u64,
            "Generation completed"
        );
        Ok(GenerationResult {
            image_url,
            provider: ProviderKind::Firefly,
            model: model.to_string(),
            raw: payload,
        })
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Firefly
    }
}
