//! Shared HTTP plumbing for provider clients: client construction, cancellable
//! requests, JSON/error decoding and poll pacing.

use crate::error::GenerationError;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn build_provider_http_client() -> Result<Client, GenerationError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(PROVIDER_HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| GenerationError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Fixed-interval polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Poll budgets per asynchronous provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// fal.ai queue status polling (about 90s)
    pub fal_queue: PollPolicy,
    /// Firefly async job polling (about 120s)
    pub firefly: PollPolicy,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            fal_queue: PollPolicy::new(Duration::from_millis(1500), 60),
            firefly: PollPolicy::new(Duration::from_millis(1500), 80),
        }
    }
}

impl PollSettings {
    /// Same attempt counts with a different interval, for tests and fast mocks
    pub fn with_interval(interval: Duration) -> Self {
        let defaults = Self::default();
        Self {
            fal_queue: PollPolicy::new(interval, defaults.fal_queue.max_attempts),
            firefly: PollPolicy::new(interval, defaults.firefly.max_attempts),
        }
    }
}

/// Decoded provider response
#[derive(Debug, Clone)]
pub(crate) struct JsonResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: Value,
}

pub(crate) fn map_transport_error(error: reqwest::Error) -> GenerationError {
    if error.is_timeout() {
        GenerationError::Network(format!("Request timed out: {}", error))
    } else if error.is_connect() {
        GenerationError::Network(format!("Connection error: {}", error))
    } else {
        GenerationError::Network(error.to_string())
    }
}

/// Send a request and decode its JSON body, aborting promptly on cancellation.
///
/// Bodies that are not JSON decode as `null`. Non-2xx responses become
/// `GenerationError::Api` carrying the provider's own error text when present.
pub(crate) async fn send_json(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<JsonResponse, GenerationError> {
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
        result = request.send() => result.map_err(map_transport_error)?,
    };

    let status = response.status();
    let location = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let text = tokio::select! {
        _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
        result = response.text() => result.map_err(map_transport_error)?,
    };
    let body = serde_json::from_str(&text).unwrap_or(Value::Null);

    if !status.is_success() {
        return Err(GenerationError::Api {
            status: Some(status.as_u16()),
            message: error_message_from(&body)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
        });
    }

    Ok(JsonResponse {
        status,
        location,
        body,
    })
}

/// Provider-supplied error text: `error` (string or `{message}`) then `message`.
pub(crate) fn error_message_from(body: &Value) -> Option<String> {
    let from_error = match body.get("error") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    };
    from_error.or_else(|| {
        body.get("message")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Compact description of a payload for error messages.
pub(crate) fn summarize_payload(body: &Value) -> String {
    match body.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => body.to_string(),
    }
}

/// Sleep between polls unless cancelled first.
pub(crate) async fn sleep_or_cancel(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), GenerationError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(GenerationError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Append a model id to a base URL, percent-encoding each path segment.
pub(crate) fn join_model_path(base: &str, model: &str) -> Result<Url, GenerationError> {
    let mut url = Url::parse(base.trim())
        .map_err(|e| GenerationError::Config(format!("Invalid base URL '{}': {}", base, e)))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| GenerationError::Config(format!("Base URL cannot be a base: {}", base)))?;
        segments.pop_if_empty();
        segments.extend(model.split('/').filter(|s| !s.is_empty()));
    }
    Ok(url)
}

pub(crate) fn trim_base(base: &str) -> &str {
    base.trim().trim_end_matches('/')
}
