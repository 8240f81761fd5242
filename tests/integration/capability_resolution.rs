//! Reference image requirement resolution against a mock model catalog

use crate::integration::test_utils::{fal_config, fal_model_listing};
use batch_studio::capability::{
    build_reference_image_payload, CapabilityResolver, ImageSupport, RequirementSource,
    RequirementStatus, RequirementTracker,
};
use batch_studio::provider::ProviderKind;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_listing(server: &MockServer, endpoint_id: &str, input: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(query_param("endpoint_id", endpoint_id))
        .and(header("Authorization", "Key fal-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fal_model_listing(endpoint_id, input)))
        .mount(server)
        .await;
}

fn resolver() -> CapabilityResolver {
    CapabilityResolver::new(reqwest::Client::new())
}

#[tokio::test]
async fn test_optional_array_field_resolves_and_builds_payload() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "fal-ai/flux/redux",
        json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string"},
                "image_urls": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["prompt"]
        }),
    )
    .await;

    let config = fal_config(&server.uri());
    let requirement = resolver()
        .resolve(ProviderKind::Fal, "fal-ai/flux/redux", &config, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(requirement.status, RequirementStatus::Ready);
    assert_eq!(requirement.image_support, ImageSupport::Optional);
    let payload = build_reference_image_payload(&requirement, Some("https://example.com/a.png"));
    assert_eq!(payload.get("image_urls"), Some(&json!(["https://example.com/a.png"])));
}

#[tokio::test]
async fn test_two_required_image_fields_are_reported_unsupported() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "fal-ai/inpaint",
        json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string"},
                "image_url": {"type": "string"},
                "mask_url": {"type": "string"}
            },
            "required": ["prompt", "image_url", "mask_url"]
        }),
    )
    .await;

    let config = fal_config(&server.uri());
    let requirement = resolver()
        .resolve(ProviderKind::Fal, "fal-ai/inpaint", &config, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(requirement.image_support, ImageSupport::Required);
    assert!(!requirement.unsupported_reason.is_empty());
}

#[tokio::test]
async fn test_catalog_failure_resolves_to_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "catalog down"})))
        .mount(&server)
        .await;

    let config = fal_config(&server.uri());
    let requirement = resolver()
        .resolve(ProviderKind::Fal, "fal-ai/flux/dev", &config, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(requirement.status, RequirementStatus::Error);
    assert!(requirement.error.contains("catalog down"));
}

#[tokio::test]
async fn test_non_fal_providers_never_hit_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let config = fal_config(&server.uri());
    let requirement = resolver()
        .resolve(ProviderKind::Google, "gemini-test", &config, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(requirement.image_support, ImageSupport::None);
}

#[tokio::test]
async fn test_tracker_reuses_cache_file_for_same_credential() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fal_model_listing(
            "fal-ai/edit",
            json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string"},
                    "image_url": {"type": "string"}
                },
                "required": ["prompt", "image_url"]
            }),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache_path = dir.path().join("requirements.json");
    let config = fal_config(&server.uri());

    let first = RequirementTracker::with_cache_file(Arc::new(resolver()), &cache_path, &config);
    let resolved = first
        .fetch(ProviderKind::Fal, "fal-ai/edit", &config, false)
        .await
        .unwrap();
    assert_eq!(resolved.image_support, ImageSupport::Required);
    assert!(cache_path.exists());

    // Same credential: served from the file without another lookup
    let second = RequirementTracker::with_cache_file(Arc::new(resolver()), &cache_path, &config);
    let cached = second
        .fetch(ProviderKind::Fal, "fal-ai/edit", &config, false)
        .await
        .unwrap();
    assert_eq!(cached, resolved);

    // Another credential discards the file
    let mut rotated = config.clone();
    rotated.providers.fal.api_key = "rotated-key".to_string();
    let third = RequirementTracker::with_cache_file(Arc::new(resolver()), &cache_path, &rotated);
    assert!(third.cached(ProviderKind::Fal, "fal-ai/edit").is_none());
}

#[tokio::test]
async fn test_forced_refresh_bypasses_cache() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "fal-ai/edit",
        json!({
            "type": "object",
            "properties": {"prompt": {"type": "string"}, "image": {"type": "string"}},
            "required": ["prompt"]
        }),
    )
    .await;

    let config = fal_config(&server.uri());
    let tracker = RequirementTracker::new(Arc::new(resolver()));
    tracker
        .fetch(ProviderKind::Fal, "fal-ai/edit", &config, false)
        .await
        .unwrap();
    tracker
        .fetch(ProviderKind::Fal, "fal-ai/edit", &config, true)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(tracker.current().image_support, ImageSupport::Optional);
}
