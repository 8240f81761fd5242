//! End-to-end batches: scheduler, real provider clients, sled store and
//! requirement tracker against a mock fal.ai server.

use crate::integration::test_utils::{fal_config, fal_model_listing};
use batch_studio::capability::{CapabilityResolver, RequirementTracker};
use batch_studio::card::CardStatus;
use batch_studio::config::{PromptMode, StudioConfig};
use batch_studio::error::ErrorKind;
use batch_studio::provider::{PollSettings, ProviderKind, ProviderRegistry};
use batch_studio::reference::ReferenceImage;
use batch_studio::scheduler::{GenerationScheduler, SchedulerContext, SchedulerEvent};
use batch_studio::store::{CardStore, SledCardStore};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn build_scheduler(config: StudioConfig, data_dir: &Path) -> (GenerationScheduler, Arc<SledCardStore>) {
    let store = Arc::new(SledCardStore::new(data_dir.join("cards")).unwrap());
    let tracker = Arc::new(RequirementTracker::with_cache_file(
        Arc::new(CapabilityResolver::new(reqwest::Client::new())),
        data_dir.join("requirements.json"),
        &config,
    ));
    let polling = PollSettings::with_interval(Duration::from_millis(5));
    let providers = Arc::new(ProviderRegistry::with_polling(polling).unwrap());
    let scheduler = GenerationScheduler::load(SchedulerContext {
        config,
        store: store.clone(),
        providers,
        tracker,
    })
    .unwrap();
    (scheduler, store)
}

async fn mount_text_only_model(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fal_model_listing(
            "fal-ai/flux/dev",
            json!({
                "type": "object",
                "properties": {"prompt": {"type": "string"}},
                "required": ["prompt"]
            }),
        )))
        .mount(server)
        .await;
}

async fn mount_generation(server: &MockServer, image: &str) {
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"images": [{"url": image}]}))
                .set_delay(Duration::from_millis(20)),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_batch_generates_and_persists_every_card() {
    let server = MockServer::start().await;
    mount_text_only_model(&server).await;
    mount_generation(&server, "https://cdn.example.com/out.png").await;

    let dir = TempDir::new().unwrap();
    let (scheduler, store) = build_scheduler(fal_config(&server.uri()), dir.path());
    let mut events = scheduler.subscribe();

    let report = scheduler
        .generate_all(Some("a fox\n\na heron\n  an owl  "))
        .await
        .unwrap();
    assert_eq!(report.queued, 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.concurrency, 2);

    let cards = scheduler.cards();
    assert_eq!(cards.len(), 3);
    for card in &cards {
        assert_eq!(card.status, CardStatus::Success);
        assert_eq!(card.image_url, "https://cdn.example.com/out.png");
        let generated = card.generated_with.as_ref().unwrap();
        assert_eq!(generated.model, "fal-ai/flux/dev");
    }

    let mut saw_finished = false;
    while let Ok(event) = events.try_recv() {
        if let SchedulerEvent::BatchFinished(finished) = event {
            assert_eq!(finished.succeeded, 3);
            saw_finished = true;
        }
    }
    assert!(saw_finished);

    store.flush().unwrap();
    let persisted = store.load_all().unwrap();
    assert_eq!(persisted.len(), 3);
    assert!(persisted.iter().all(|c| c.status == CardStatus::Success));
    let prompts: Vec<&str> = persisted.iter().map(|c| c.prompt.as_str()).collect();
    assert_eq!(prompts, vec!["a fox", "a heron", "an owl"]);
}

#[tokio::test]
async fn test_failed_card_is_retried_without_touching_siblings() {
    let server = MockServer::start().await;
    mount_text_only_model(&server).await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .and(body_partial_json(json!({"prompt": "Watercolor of a storm"})))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({"message": "capacity exceeded"})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_generation(&server, "https://cdn.example.com/ok.png").await;

    let mut config = fal_config(&server.uri());
    config.mode = PromptMode::Advanced;
    config.common_prompt = "Watercolor of {{item}}".to_string();

    let dir = TempDir::new().unwrap();
    let (scheduler, _store) = build_scheduler(config, dir.path());

    let report = scheduler
        .generate_all(Some("a calm lake\na storm\na meadow"))
        .await
        .unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);

    let failed = scheduler
        .cards()
        .into_iter()
        .find(|c| c.status == CardStatus::Error)
        .unwrap();
    assert_eq!(failed.prompt, "a storm");
    assert_eq!(failed.final_prompt, "Watercolor of a storm");
    assert_eq!(failed.error_message, "capacity exceeded");

    let retry = scheduler.regenerate_failed().await.unwrap();
    assert_eq!(retry.queued, 1);
    assert_eq!(retry.succeeded, 1);
    assert_eq!(scheduler.status_summary().success, 3);
}

#[tokio::test]
async fn test_required_reference_image_gates_and_feeds_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fal_model_listing(
            "fal-ai/flux/dev",
            json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string"},
                    "image_url": {"type": "string", "format": "uri"}
                },
                "required": ["prompt", "image_url"]
            }),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .and(body_partial_json(json!({"image_url": "https://example.com/ref.png"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"image": {"url": "https://cdn.example.com/edit.png"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (scheduler, _store) = build_scheduler(fal_config(&server.uri()), dir.path());

    let err = scheduler.generate_all(Some("restyle this")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReferenceImage);
    assert_eq!(
        err.to_string(),
        "This model requires a reference image. Provide an image file or URL"
    );
    let pending = scheduler.cards();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, CardStatus::Pending);

    scheduler.set_reference_image(Some(ReferenceImage::from_url("https://example.com/ref.png").unwrap()));
    let report = scheduler.generate_all(None).await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(
        scheduler.cards()[0].image_url,
        "https://cdn.example.com/edit.png"
    );
}

#[tokio::test]
async fn test_cards_survive_reload_from_disk() {
    let server = MockServer::start().await;
    mount_text_only_model(&server).await;
    mount_generation(&server, "https://cdn.example.com/kept.png").await;

    let dir = TempDir::new().unwrap();
    let config = fal_config(&server.uri());
    {
        let (scheduler, store) = build_scheduler(config.clone(), dir.path());
        scheduler.generate_all(Some("first\nsecond")).await.unwrap();
        store.flush().unwrap();
    }

    let (reloaded, _store) = build_scheduler(config, dir.path());
    let cards = reloaded.cards();
    assert_eq!(cards.len(), 2);
    assert!(cards.iter().all(|c| c.status == CardStatus::Success));

    // Requirement came from the cache file, so only the first run asked for it
    let lookups = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/v1/models")
        .count();
    assert_eq!(lookups, 1);
    assert!(reloaded
        .tracker()
        .cached(ProviderKind::Fal, "fal-ai/flux/dev")
        .is_some());
}
