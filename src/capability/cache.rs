//! Requirement cache and the single-flight, debounced tracker around it.

use super::resolver::{needs_resolution, RequirementSource};
use super::{requirement_cache_key, CapabilityRequirement, RequirementStatus};
use crate::config::StudioConfig;
use crate::error::{GenerationError, StorageError};
use crate::provider::ProviderKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay that collapses rapid model/credential edits into one resolution
pub const REQUIREMENT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Stable, non-reversible identifier of the credential used for resolution.
pub fn credential_fingerprint(secret: &str) -> String {
    let secret = secret.trim();
    if secret.is_empty() {
        return String::new();
    }
    hex::encode(blake3::hash(secret.as_bytes()).as_bytes())
}

/// Resolved requirements keyed by `provider:model`, scoped to one credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementCache {
    #[serde(default)]
    fingerprint: String,
    #[serde(default)]
    entries: BTreeMap<String, CapabilityRequirement>,
}

impl RequirementCache {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load a persisted cache. A cache written under another credential, or
    /// one that cannot be parsed, is discarded.
    pub fn load(path: &Path, fingerprint: &str) -> Result<Self, StorageError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new(fingerprint))
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<RequirementCache>(&text) {
            Ok(cache) if cache.fingerprint == fingerprint => Ok(cache),
            Ok(_) => {
                info!(path = %path.display(), "Discarding requirement cache for a different credential");
                Ok(Self::new(fingerprint))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable requirement cache");
                Ok(Self::new(fingerprint))
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn get(&self, key: &str) -> Option<&CapabilityRequirement> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, requirement: CapabilityRequirement) {
        self.entries.insert(requirement.cache_key(), requirement);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and rebind to a new credential
    pub fn reset(&mut self, fingerprint: impl Into<String>) {
        self.fingerprint = fingerprint.into();
        self.entries.clear();
    }
}

struct TrackerState {
    cache: RequirementCache,
    current: CapabilityRequirement,
    /// Incremented by every resolution start and every reset
    generation: u64,
    in_flight: Option<CancellationToken>,
}

/// Memoized, single-flight view of the active model's requirement.
///
/// Starting a resolution cancels the one in flight. A resolution whose
/// generation was superseded never updates the cache or the current value.
pub struct RequirementTracker {
    source: Arc<dyn RequirementSource>,
    cache_path: Option<PathBuf>,
    debounce: Duration,
    debounce_ticket: AtomicU64,
    state: Mutex<TrackerState>,
}

impl RequirementTracker {
    pub fn new(source: Arc<dyn RequirementSource>) -> Self {
        Self::with_cache(source, RequirementCache::default(), None)
    }

    /// Tracker backed by a cache file, discarded if it belongs to another credential
    pub fn with_cache_file(
        source: Arc<dyn RequirementSource>,
        path: impl Into<PathBuf>,
        config: &StudioConfig,
    ) -> Self {
        let path = path.into();
        let fingerprint = credential_fingerprint(&config.providers.fal.api_key);
        let cache = RequirementCache::load(&path, &fingerprint).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Failed to read requirement cache");
            RequirementCache::new(fingerprint.clone())
        });
        debug!(entries = cache.len(), "Loaded requirement cache");
        Self::with_cache(source, cache, Some(path))
    }

    fn with_cache(
        source: Arc<dyn RequirementSource>,
        cache: RequirementCache,
        cache_path: Option<PathBuf>,
    ) -> Self {
        Self {
            source,
            cache_path,
            debounce: REQUIREMENT_DEBOUNCE,
            debounce_ticket: AtomicU64::new(0),
            state: Mutex::new(TrackerState {
                cache,
                current: CapabilityRequirement::idle(),
                generation: 0,
                in_flight: None,
            }),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Requirement of the most recent resolution target
    pub fn current(&self) -> CapabilityRequirement {
        self.state.lock().current.clone()
    }

    pub fn cached(&self, provider: ProviderKind, model_id: &str) -> Option<CapabilityRequirement> {
        self.state
            .lock()
            .cache
            .get(&requirement_cache_key(provider, model_id))
            .cloned()
    }

    /// Best known requirement for a provider/model without any network access:
    /// the current value if it matches, then the cache, then "no image".
    pub fn requirement_for(&self, provider: ProviderKind, model_id: &str) -> CapabilityRequirement {
        let state = self.state.lock();
        if state.current.is_for(provider, model_id) {
            return state.current.clone();
        }
        state
            .cache
            .get(&requirement_cache_key(provider, model_id))
            .cloned()
            .unwrap_or_else(|| CapabilityRequirement::no_image(provider, model_id))
    }

    /// Clear everything when the resolution credential changed. Returns true if it did.
    pub fn sync_credentials(&self, config: &StudioConfig) -> bool {
        let fingerprint = credential_fingerprint(&config.providers.fal.api_key);
        let mut state = self.state.lock();
        if state.cache.fingerprint() == fingerprint {
            return false;
        }
        info!(entries = state.cache.len(), "Credential changed; clearing requirement cache");
        Self::reset_locked(&mut state, fingerprint);
        self.persist(&state.cache);
        true
    }

    /// Drop cached requirements and abort any resolution in flight
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let fingerprint = state.cache.fingerprint().to_string();
        Self::reset_locked(&mut state, fingerprint);
        self.persist(&state.cache);
    }

    fn reset_locked(state: &mut TrackerState, fingerprint: String) {
        state.cache.reset(fingerprint);
        if let Some(token) = state.in_flight.take() {
            token.cancel();
        }
        state.generation += 1;
        state.current = CapabilityRequirement::idle();
    }

    /// Resolve the requirement for a provider/model, using the cache unless `force`.
    ///
    /// Returns `Err(GenerationError::Cancelled)` when this resolution was
    /// superseded by a newer one or by a reset.
    pub async fn fetch(
        &self,
        provider: ProviderKind,
        model_id: &str,
        config: &StudioConfig,
        force: bool,
    ) -> Result<CapabilityRequirement, GenerationError> {
        self.sync_credentials(config);
        let model_id = model_id.trim();

        if !needs_resolution(provider, model_id, config) {
            let none = CapabilityRequirement::no_image(provider, model_id);
            let mut state = self.state.lock();
            if let Some(previous) = state.in_flight.take() {
                debug!("Cancelling requirement resolution for previous target");
                previous.cancel();
            }
            state.generation += 1;
            state.current = none.clone();
            return Ok(none);
        }

        let key = requirement_cache_key(provider, model_id);
        let (token, generation) = {
            let mut state = self.state.lock();
            if !force {
                if let Some(cached) = state.cache.get(&key).cloned() {
                    debug!(key = %key, "Requirement cache hit");
                    state.current = cached.clone();
                    return Ok(cached);
                }
            }
            if let Some(previous) = state.in_flight.take() {
                debug!("Cancelling superseded requirement resolution");
                previous.cancel();
            }
            state.generation += 1;
            let token = CancellationToken::new();
            state.in_flight = Some(token.clone());
            state.current = CapabilityRequirement::loading(provider, model_id);
            (token, state.generation)
        };

        let outcome = self.source.resolve(provider, model_id, config, &token).await;

        let mut state = self.state.lock();
        if state.generation == generation {
            state.in_flight = None;
        }
        let resolved = match outcome {
            Ok(requirement) => requirement,
            Err(GenerationError::Cancelled) => return Err(GenerationError::Cancelled),
            Err(e) => CapabilityRequirement::failed(provider, model_id, e.to_string()),
        };
        if state.generation != generation {
            debug!(key = %key, "Discarding superseded requirement");
            return Err(GenerationError::Cancelled);
        }

        if resolved.status != RequirementStatus::Error {
            state.cache.insert(resolved.clone());
            self.persist(&state.cache);
        }
        state.current = resolved.clone();
        Ok(resolved)
    }

    /// Resolve after the debounce delay unless another refresh is scheduled first.
    pub fn schedule_refresh(
        self: &Arc<Self>,
        provider: ProviderKind,
        model_id: impl Into<String>,
        config: StudioConfig,
        force: bool,
    ) -> JoinHandle<()> {
        let ticket = self.debounce_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let tracker = Arc::clone(self);
        let model_id = model_id.into();
        tokio::spawn(async move {
            tokio::time::sleep(tracker.debounce).await;
            if tracker.debounce_ticket.load(Ordering::SeqCst) != ticket {
                return;
            }
            match tracker.fetch(provider, &model_id, &config, force).await {
                Ok(requirement) => debug!(
                    provider = %provider,
                    model = %model_id,
                    status = ?requirement.status,
                    "Debounced requirement refresh finished"
                ),
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(error = %e, "Debounced requirement refresh failed"),
            }
        })
    }

    fn persist(&self, cache: &RequirementCache) {
        if let Some(path) = &self.cache_path {
            if let Err(e) = cache.save(path) {
                warn!(path = %path.display(), error = %e, "Failed to persist requirement cache");
            }
        }
    }
}
