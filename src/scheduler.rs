//! Generation Scheduler
//!
//! Drives cards through `pending → generating → {success, error}` with a
//! bounded pool of cooperative workers draining a shared FIFO queue.
//!
//! All orchestration state lives in one [`SchedulerContext`] owned by the
//! scheduler, so independent schedulers never share a running set, a
//! requirement tracker or a card list.

pub mod registry;

pub use registry::{ClaimGuard, RunningRegistry};

use crate::capability::{build_reference_image_payload, RequirementTracker};
use crate::card::{
    build_prompt_for_request, normalize_prompt_lines, Card, CardStatus, GeneratedWith,
    StatusSummary,
};
use crate::config::StudioConfig;
use crate::error::{GenerationError, StorageError};
use crate::preflight::{self, check_provider_config, check_template, run_preflight};
use crate::provider::{GenerationRequest, GenerationResult, ProviderClientResolver, ProviderKind};
use crate::reference::ReferenceImage;
use crate::store::CardStore;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Message stored on a card whose generation was cancelled while it still existed
pub const CANCELLED_MESSAGE: &str = "Generation cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Error,
}

/// Progress notifications for renderers
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    CardUpdated(Card),
    CardRemoved(String),
    Message { level: MessageLevel, text: String },
    BatchStarted { queued: usize, concurrency: usize },
    BatchFinished(BatchReport),
}

/// Outcome of one full-queue run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Ids actually queued after dedupe and running filter
    pub queued: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Queued cards removed before they finished
    pub removed: usize,
    pub concurrency: usize,
    /// Queued card ids in dequeue order
    pub card_ids: Vec<String>,
    #[serde(skip)]
    pub duration: Duration,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.queued == 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed > 0 {
            write!(
                f,
                "Generation finished: {} succeeded / {} failed",
                self.succeeded, self.failed
            )
        } else {
            write!(f, "Generation finished: {} succeeded", self.succeeded)
        }
    }
}

/// Dependencies and configuration a scheduler is built from
pub struct SchedulerContext {
    pub config: StudioConfig,
    pub store: Arc<dyn CardStore>,
    pub providers: Arc<dyn ProviderClientResolver>,
    pub tracker: Arc<RequirementTracker>,
}

struct SchedulerState {
    config: RwLock<StudioConfig>,
    /// Display order: newest first
    cards: RwLock<Vec<Card>>,
    reference: RwLock<Option<ReferenceImage>>,
    store: Arc<dyn CardStore>,
    providers: Arc<dyn ProviderClientResolver>,
    tracker: Arc<RequirementTracker>,
    running: RunningRegistry,
    batch_active: AtomicBool,
    events: broadcast::Sender<SchedulerEvent>,
}

/// Clears the batch flag when a batch exits on any path
struct BatchFlag<'a>(&'a AtomicBool);

impl Drop for BatchFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Unique ids not currently running, in first-seen order.
pub fn pick_runnable_card_ids<S: AsRef<str>>(
    card_ids: &[S],
    is_running: impl Fn(&str) -> bool,
) -> Vec<String> {
    let mut seen = HashSet::new();
    card_ids
        .iter()
        .map(AsRef::as_ref)
        .filter(|id| !id.is_empty() && seen.insert(*id) && !is_running(id))
        .map(str::to_string)
        .collect()
}

#[derive(Clone)]
pub struct GenerationScheduler {
    state: Arc<SchedulerState>,
}

impl GenerationScheduler {
    /// Build a scheduler over the store's cards. Cards persisted mid-generation
    /// are marked failed, since jobs are not resumed across restarts.
    pub fn load(context: SchedulerContext) -> Result<Self, StorageError> {
        let mut cards = context.store.load_all()?;
        for card in cards.iter_mut() {
            if card.recover_interrupted() {
                warn!(card_id = %card.id, "Recovered card interrupted mid-generation");
                context.store.upsert(card)?;
            }
        }
        cards.reverse();
        info!(cards = cards.len(), "Scheduler loaded");

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        context.tracker.sync_credentials(&context.config);
        Ok(Self {
            state: Arc::new(SchedulerState {
                config: RwLock::new(context.config),
                cards: RwLock::new(cards),
                reference: RwLock::new(None),
                store: context.store,
                providers: context.providers,
                tracker: context.tracker,
                running: RunningRegistry::new(),
                batch_active: AtomicBool::new(false),
                events,
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.state.events.subscribe()
    }

    pub fn config(&self) -> StudioConfig {
        self.state.config.read().clone()
    }

    /// Replace the settings; a changed resolution credential clears the requirement cache.
    pub fn set_config(&self, config: StudioConfig) {
        self.state.tracker.sync_credentials(&config);
        *self.state.config.write() = config;
    }

    pub fn tracker(&self) -> &Arc<RequirementTracker> {
        &self.state.tracker
    }

    pub fn set_reference_image(&self, reference: Option<ReferenceImage>) {
        *self.state.reference.write() = reference;
    }

    fn reference_value(&self) -> Option<String> {
        self.state
            .reference
            .read()
            .as_ref()
            .and_then(|r| r.value().map(str::to_string))
    }

    /// Snapshot of all cards, newest first
    pub fn cards(&self) -> Vec<Card> {
        self.state.cards.read().clone()
    }

    pub fn card(&self, card_id: &str) -> Option<Card> {
        self.state.cards.read().iter().find(|c| c.id == card_id).cloned()
    }

    pub fn status_summary(&self) -> StatusSummary {
        StatusSummary::from_cards(self.state.cards.read().iter())
    }

    pub fn is_running(&self, card_id: &str) -> bool {
        self.state.running.contains(card_id)
    }

    pub fn running_count(&self) -> usize {
        self.state.running.len()
    }

    pub fn is_batch_active(&self) -> bool {
        self.state.batch_active.load(Ordering::SeqCst)
    }

    fn emit(&self, event: SchedulerEvent) {
        // No subscribers is fine
        let _ = self.state.events.send(event);
    }

    fn message(&self, level: MessageLevel, text: impl Into<String>) {
        self.emit(SchedulerEvent::Message {
            level,
            text: text.into(),
        });
    }

    fn persist(&self, card: &Card) {
        if let Err(e) = self.state.store.upsert(card) {
            error!(card_id = %card.id, error = %e, "Failed to persist card");
        }
    }

    /// Create one pending card per non-empty line, bound to the active provider and model.
    pub fn add_cards_from_batch(&self, batch_text: &str) -> Result<Vec<Card>, GenerationError> {
        let config = self.config();
        check_template(&config)?;

        let lines = normalize_prompt_lines(batch_text);
        if lines.is_empty() {
            return Err(GenerationError::Validation(
                "Enter at least one prompt line".to_string(),
            ));
        }

        let provider = config.active_provider;
        let model = config.active_model().to_string();
        let created: Vec<Card> = lines
            .into_iter()
            .map(|line| {
                let mut card = Card::new(line);
                card.provider = Some(provider);
                card.model = model.clone();
                card
            })
            .collect();

        for card in &created {
            self.state.store.upsert(card)?;
        }
        {
            let mut cards = self.state.cards.write();
            let mut merged = created.clone();
            merged.append(&mut cards);
            *cards = merged;
        }
        for card in &created {
            self.emit(SchedulerEvent::CardUpdated(card.clone()));
        }
        info!(count = created.len(), provider = %provider, model = %model, "Added cards");
        self.message(MessageLevel::Success, format!("Added {} cards", created.len()));
        Ok(created)
    }

    /// Generate new cards from `batch_text` if it has lines, else every existing card.
    pub async fn generate_all(&self, batch_text: Option<&str>) -> Result<BatchReport, GenerationError> {
        let has_lines = batch_text
            .map(|text| !normalize_prompt_lines(text).is_empty())
            .unwrap_or(false);
        let target_ids: Vec<String> = match batch_text {
            Some(text) if has_lines => self
                .add_cards_from_batch(text)?
                .into_iter()
                .map(|card| card.id)
                .collect(),
            _ => self.state.cards.read().iter().map(|c| c.id.clone()).collect(),
        };

        if target_ids.is_empty() {
            self.message(MessageLevel::Info, "No cards to generate");
            return Ok(BatchReport::default());
        }
        self.process_queue(&target_ids).await
    }

    pub async fn regenerate_failed(&self) -> Result<BatchReport, GenerationError> {
        let failed: Vec<String> = self
            .state
            .cards
            .read()
            .iter()
            .filter(|c| c.status == CardStatus::Error)
            .map(|c| c.id.clone())
            .collect();
        if failed.is_empty() {
            self.message(MessageLevel::Info, "No failed cards");
            return Ok(BatchReport::default());
        }
        self.process_queue(&failed).await
    }

    /// Run a batch over `card_ids` with bounded concurrency.
    ///
    /// Only one batch runs at a time; single-card regenerates may run
    /// alongside it and are kept apart by the running registry.
    pub async fn process_queue<S: AsRef<str>>(
        &self,
        card_ids: &[S],
    ) -> Result<BatchReport, GenerationError> {
        if self
            .state
            .batch_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let err = GenerationError::Validation("A batch is already generating".to_string());
            self.message(MessageLevel::Info, err.to_string());
            return Err(err);
        }
        let _batch = BatchFlag(&self.state.batch_active);

        let config = self.config();
        let reference = self.reference_value();
        if let Err(failure) = run_preflight(&config, &self.state.tracker, reference.as_deref()).await {
            preflight::log_failure(&failure);
            self.message(MessageLevel::Error, failure.message());
            return Err(failure.error);
        }

        let queue = pick_runnable_card_ids(card_ids, |id| self.state.running.contains(id));
        if queue.is_empty() {
            self.message(MessageLevel::Info, "No runnable cards");
            return Ok(BatchReport::default());
        }

        let concurrency = config.effective_concurrency();
        let workers = concurrency.min(queue.len());
        let queued = queue.len();
        let started = Instant::now();
        info!(queued, concurrency, provider = %config.active_provider, "Batch started");
        self.emit(SchedulerEvent::BatchStarted {
            queued,
            concurrency,
        });
        self.message(MessageLevel::Info, format!("Generation started: {} cards", queued));

        let pending = Mutex::new(queue.iter().cloned().collect::<VecDeque<String>>());
        let active_provider = config.active_provider;
        join_all((0..workers).map(|worker| {
            let pending = &pending;
            async move {
                loop {
                    let next = pending.lock().pop_front();
                    let Some(card_id) = next else { break };
                    let provider = self
                        .card(&card_id)
                        .and_then(|c| c.provider)
                        .unwrap_or(active_provider);
                    debug!(worker, card_id = %card_id, "Worker picked card");
                    self.process_card(&card_id, provider).await;
                }
            }
        }))
        .await;

        let mut report = BatchReport {
            queued,
            concurrency,
            card_ids: queue.clone(),
            duration: started.elapsed(),
            ..BatchReport::default()
        };
        for card_id in &queue {
            match self.card(card_id).map(|c| c.status) {
                Some(CardStatus::Success) => report.succeeded += 1,
                Some(CardStatus::Error) => report.failed += 1,
                Some(_) => {}
                None => report.removed += 1,
            }
        }
        info!(
            queued,
            succeeded = report.succeeded,
            failed = report.failed,
            removed = report.removed,
            duration_ms = report.duration.as_millis() as u64,
            "Batch finished"
        );
        let level = if report.failed > 0 {
            MessageLevel::Info
        } else {
            MessageLevel::Success
        };
        self.message(level, report.to_string());
        self.emit(SchedulerEvent::BatchFinished(report.clone()));
        Ok(report)
    }

    /// Regenerate one card. Returns `Ok(None)` when the card is already generating.
    pub async fn regenerate(&self, card_id: &str) -> Result<Option<Card>, GenerationError> {
        let config = self.config();
        let reference = self.reference_value();
        if let Err(failure) = run_preflight(&config, &self.state.tracker, reference.as_deref()).await {
            preflight::log_failure(&failure);
            self.message(MessageLevel::Error, failure.message());
            return Err(failure.error);
        }

        if self.state.running.contains(card_id) {
            self.message(MessageLevel::Info, "This card is already generating");
            return Ok(None);
        }
        let card = self
            .card(card_id)
            .ok_or_else(|| GenerationError::Validation(format!("Card not found: {}", card_id)))?;

        let provider = card.provider.unwrap_or(config.active_provider);
        if let Err(e) = check_provider_config(provider, &config) {
            self.message(MessageLevel::Error, e.to_string());
            return Err(e);
        }

        info!(card_id, previous_status = %card.status, provider = %provider, "Regenerating card");
        match self.process_card(card_id, provider).await {
            Some(_) => Ok(self.card(card_id)),
            None => Ok(None),
        }
    }

    /// Generate one card. `None` if it was already running or no longer exists.
    pub async fn process_card(&self, card_id: &str, provider: ProviderKind) -> Option<CardStatus> {
        let guard = self.state.running.claim(card_id)?;

        let snapshot_source = self.config();
        let Some((prompt, model_override)) = self
            .card(card_id)
            .map(|card| (card.prompt, card.model))
        else {
            debug!(card_id, "Card disappeared before generation");
            return None;
        };
        let snapshot = snapshot_source.snapshot_for(provider, Some(&model_override));
        let model = snapshot.model_for(provider).to_string();
        let final_prompt = build_prompt_for_request(&snapshot, &prompt);

        self.update_card(card_id, |card| {
            card.status = CardStatus::Generating;
            card.error_message.clear();
            card.provider = Some(provider);
            if let Ok(final_prompt) = &final_prompt {
                card.final_prompt = final_prompt.clone();
            }
        })?;
        debug!(card_id, provider = %provider, model = %model, "Card generating");

        let started = Instant::now();
        let outcome = match final_prompt.clone() {
            Ok(final_prompt) => {
                let provider_input = if provider.accepts_reference_image() {
                    let requirement = self.state.tracker.requirement_for(provider, &model);
                    build_reference_image_payload(&requirement, self.reference_value().as_deref())
                } else {
                    serde_json::Map::new()
                };
                let request = GenerationRequest::new(final_prompt, snapshot.clone())
                    .with_provider_input(provider_input)
                    .with_cancel(guard.token().clone());
                self.state
                    .providers
                    .client_for(provider)
                    .generate(&request)
                    .await
            }
            Err(e) => Err(e),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let common_prompt = snapshot.common_prompt.trim().to_string();
        let final_prompt = final_prompt.unwrap_or_default();
        let finished = self.update_card(card_id, |card| {
            apply_outcome(card, &outcome, &final_prompt, &common_prompt)
        });
        drop(guard);

        match (&finished, &outcome) {
            (None, _) => {
                debug!(card_id, "Card removed during generation; result discarded");
                None
            }
            (Some(card), Ok(result)) => {
                info!(card_id, provider = %result.provider, model = %result.model, duration_ms, "Card generated");
                Some(card.status)
            }
            (Some(card), Err(e)) => {
                warn!(card_id, provider = %provider, model = %model, kind = %e.kind(), error = %e, duration_ms, "Card failed");
                Some(card.status)
            }
        }
    }

    /// Mutate a card in place, persist it and notify. `None` if it no longer exists.
    fn update_card(&self, card_id: &str, apply: impl FnOnce(&mut Card)) -> Option<Card> {
        let updated = {
            let mut cards = self.state.cards.write();
            let card = cards.iter_mut().find(|c| c.id == card_id)?;
            apply(card);
            card.touch();
            card.clone()
        };
        self.persist(&updated);
        self.emit(SchedulerEvent::CardUpdated(updated.clone()));
        Some(updated)
    }

    /// Signal a card's in-flight generation. The card ends in `error`.
    pub fn cancel_card(&self, card_id: &str) -> bool {
        let cancelled = self.state.running.cancel(card_id);
        if cancelled {
            info!(card_id, "Cancelled card generation");
        }
        cancelled
    }

    /// Remove a card, cancelling any in-flight generation for it.
    pub fn remove_card(&self, card_id: &str) -> Result<bool, StorageError> {
        let removed = {
            let mut cards = self.state.cards.write();
            let before = cards.len();
            cards.retain(|c| c.id != card_id);
            cards.len() != before
        };
        if !removed {
            return Ok(false);
        }
        self.state.running.cancel(card_id);
        self.state.store.delete(card_id)?;
        self.emit(SchedulerEvent::CardRemoved(card_id.to_string()));
        info!(card_id, "Removed card");
        Ok(true)
    }

    /// Remove every card, cancelling all in-flight work.
    pub fn clear_cards(&self) -> Result<usize, StorageError> {
        let cancelled = self.state.running.cancel_all();
        let removed: Vec<Card> = std::mem::take(&mut *self.state.cards.write());
        self.state.store.clear_all()?;
        for card in &removed {
            self.emit(SchedulerEvent::CardRemoved(card.id.clone()));
        }
        info!(removed = removed.len(), cancelled, "Cleared cards");
        Ok(removed.len())
    }
}

fn apply_outcome(
    card: &mut Card,
    outcome: &Result<GenerationResult, GenerationError>,
    final_prompt: &str,
    common_prompt: &str,
) {
    match outcome {
        Ok(result) => {
            card.status = CardStatus::Success;
            card.image_url = result.image_url.clone();
            card.provider = Some(result.provider);
            card.model = result.model.clone();
            card.error_message.clear();
            card.generated_with = Some(GeneratedWith {
                provider: result.provider,
                model: result.model.clone(),
                final_prompt: final_prompt.to_string(),
                common_prompt: common_prompt.to_string(),
            });
        }
        Err(GenerationError::Cancelled) => {
            card.status = CardStatus::Error;
            card.error_message = CANCELLED_MESSAGE.to_string();
        }
        Err(e) => {
            card.status = CardStatus::Error;
            card.error_message = e.to_string();
        }
    }
}
