//! Provider clients against mock HTTP servers

use crate::integration::test_utils::{fal_config, fal_queue_config};
use batch_studio::config::StudioConfig;
use batch_studio::error::{ErrorKind, GenerationError};
use batch_studio::provider::fal::FalClient;
use batch_studio::provider::firefly::FireflyClient;
use batch_studio::provider::google::GoogleClient;
use batch_studio::provider::http::PollPolicy;
use batch_studio::provider::{GenerationRequest, ImageProvider, ProviderKind};
use serde_json::{json, Map};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_poll(max_attempts: u32) -> PollPolicy {
    PollPolicy::new(Duration::from_millis(5), max_attempts)
}

fn fal_client() -> FalClient {
    FalClient::new(reqwest::Client::new(), fast_poll(10))
}

fn firefly_config(base: &str) -> StudioConfig {
    let mut config = StudioConfig::default();
    config.active_provider = ProviderKind::Firefly;
    config.providers.firefly.api_base = base.to_string();
    config.providers.firefly.client_id = "client-1".to_string();
    config.providers.firefly.access_token = "token-1".to_string();
    config
}

#[tokio::test]
async fn test_fal_sync_sends_prompt_and_provider_input() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .and(header("Authorization", "Key fal-test-key"))
        .and(body_partial_json(json!({
            "prompt": "a red fox",
            "image_url": "https://example.com/ref.png"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [{"url": "https://cdn.example.com/fox.png"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut input = Map::new();
    input.insert("image_url".to_string(), json!("https://example.com/ref.png"));
    let request =
        GenerationRequest::new("a red fox", fal_config(&server.uri())).with_provider_input(input);

    let result = fal_client().generate(&request).await.unwrap();
    assert_eq!(result.image_url, "https://cdn.example.com/fox.png");
    assert_eq!(result.provider, ProviderKind::Fal);
    assert_eq!(result.model, "fal-ai/flux/dev");
}

#[tokio::test]
async fn test_fal_error_body_becomes_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"error": {"message": "prompt too long"}})),
        )
        .mount(&server)
        .await;

    let request = GenerationRequest::new("p", fal_config(&server.uri()));
    let err = fal_client().generate(&request).await.unwrap_err();
    match err {
        GenerationError::Api { status, message } => {
            assert_eq!(status, Some(422));
            assert_eq!(message, "prompt too long");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_fal_sync_without_image_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"seed": 7})))
        .mount(&server)
        .await;

    let request = GenerationRequest::new("p", fal_config(&server.uri()));
    let err = fal_client().generate(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Api);
    assert!(err.to_string().contains("did not include an image"));
}

#[tokio::test]
async fn test_fal_queue_polls_until_completed() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("POST"))
        .and(path("/queue/fal-ai/flux/dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_id": "req-1",
            "status_url": format!("{}/queue/requests/req-1/status", base)
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/queue/requests/req-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "IN_PROGRESS"})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/queue/requests/req-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "COMPLETED",
            "response_url": format!("{}/queue/requests/req-1", base)
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/queue/requests/req-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": ["https://cdn.example.com/queued.png"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = GenerationRequest::new("queued prompt", fal_queue_config(&base));
    let result = fal_client().generate(&request).await.unwrap();
    assert_eq!(result.image_url, "https://cdn.example.com/queued.png");
}

#[tokio::test]
async fn test_fal_queue_failure_reports_provider_error() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("POST"))
        .and(path("/queue/fal-ai/flux/dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_url": format!("{}/status", base)
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "FAILED",
            "error": "NSFW content detected"
        })))
        .mount(&server)
        .await;

    let request = GenerationRequest::new("p", fal_queue_config(&base));
    let err = fal_client().generate(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Api);
    assert_eq!(err.to_string(), "NSFW content detected");
}

#[tokio::test]
async fn test_fal_queue_completed_without_response_url() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("POST"))
        .and(path("/queue/fal-ai/flux/dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_url": format!("{}/status", base)
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "COMPLETED"})))
        .mount(&server)
        .await;

    let request = GenerationRequest::new("p", fal_queue_config(&base));
    let err = fal_client().generate(&request).await.unwrap_err();
    assert_eq!(err.to_string(), "fal queue completed but response_url is missing");
}

#[tokio::test]
async fn test_fal_queue_gives_up_after_poll_budget() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("POST"))
        .and(path("/queue/fal-ai/flux/dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_url": format!("{}/status", base)
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "IN_QUEUE"})))
        .expect(3)
        .mount(&server)
        .await;

    let client = FalClient::new(reqwest::Client::new(), fast_poll(3));
    let request = GenerationRequest::new("p", fal_queue_config(&base));
    let err = client.generate(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_cancel_aborts_pending_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"images": [{"url": "https://late.example.com"}]}))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let request =
        GenerationRequest::new("p", fal_config(&server.uri())).with_cancel(cancel.clone());
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = fal_client().generate(&request).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_google_returns_inline_image_as_data_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/models/gemini-test.*generateContent$"))
        .and(header("x-goog-api-key", "g-key"))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "a lighthouse"}]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Here is your image"},
                        {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
                    ]
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = StudioConfig::default();
    config.active_provider = ProviderKind::Google;
    config.providers.google.api_key = "g-key".to_string();
    config.providers.google.model = "gemini-test".to_string();
    config.providers.google.api_base = server.uri();

    let client = GoogleClient::new(reqwest::Client::new());
    let result = client
        .generate(&GenerationRequest::new("a lighthouse", config))
        .await
        .unwrap();
    assert_eq!(result.image_url, "data:image/png;base64,iVBORw0KGgo=");
    assert_eq!(result.provider, ProviderKind::Google);
}

#[tokio::test]
async fn test_firefly_direct_follows_location_header() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("POST"))
        .and(path("/v3/images/generate-async"))
        .and(header("Authorization", "Bearer token-1"))
        .and(header("x-api-key", "client-1"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Location", format!("{}/v3/status/job-9", base).as_str())
                .set_body_json(json!({"jobId": "job-9"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/status/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/status/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "succeeded",
            "result": {"outputs": [{"image": {"url": "https://firefly.example.com/out.jpg"}}]}
        })))
        .mount(&server)
        .await;

    let client = FireflyClient::new(reqwest::Client::new(), fast_poll(10));
    let result = client
        .generate(&GenerationRequest::new("a desert road", firefly_config(&base)))
        .await
        .unwrap();
    assert_eq!(result.image_url, "https://firefly.example.com/out.jpg");
}

#[tokio::test]
async fn test_firefly_success_without_image_is_error() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("POST"))
        .and(path("/v3/images/generate-async"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "statusUrl": format!("{}/v3/status/job-1", base)
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/status/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "succeeded"})))
        .mount(&server)
        .await;

    let client = FireflyClient::new(reqwest::Client::new(), fast_poll(10));
    let err = client
        .generate(&GenerationRequest::new("p", firefly_config(&base)))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Firefly job finished but image URL was not found in polling payload."
    );
}

#[tokio::test]
async fn test_firefly_success_with_empty_image_url_is_error() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("POST"))
        .and(path("/v3/images/generate-async"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "statusUrl": format!("{}/v3/status/job-empty", base)
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/status/job-empty"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "succeeded",
            "outputs": [{"image": {"url": ""}}]
        })))
        .mount(&server)
        .await;

    let client = FireflyClient::new(reqwest::Client::new(), fast_poll(10));
    let err = client
        .generate(&GenerationRequest::new("p", firefly_config(&base)))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Firefly job finished but image URL was not found in polling payload."
    );
}

#[tokio::test]
async fn test_firefly_failed_job_reports_reason() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("POST"))
        .and(path("/v3/images/generate-async"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "status_url": format!("{}/v3/status/job-2", base)
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/status/job-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "error": {"message": "content policy"}
        })))
        .mount(&server)
        .await;

    let client = FireflyClient::new(reqwest::Client::new(), fast_poll(10));
    let err = client
        .generate(&GenerationRequest::new("p", firefly_config(&base)))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Firefly job failed: content policy");
}

#[tokio::test]
async fn test_firefly_proxy_mode_skips_direct_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/proxy/generate"))
        .and(header("x-proxy-token", "shared-secret"))
        .and(body_partial_json(json!({"prompt": "a harbor at dawn"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "imageUrl": "https://proxy.example.com/harbor.jpg"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = StudioConfig::default();
    config.providers.firefly.proxy_url = format!("{}/proxy/", server.uri());
    config.providers.firefly.proxy_token = "shared-secret".to_string();

    let client = FireflyClient::new(reqwest::Client::new(), fast_poll(10));
    let result = client
        .generate(&GenerationRequest::new("a harbor at dawn", config))
        .await
        .unwrap();
    assert_eq!(result.image_url, "https://proxy.example.com/harbor.jpg");
    assert_eq!(result.provider, ProviderKind::Firefly);
}
