//! Running set and cancellation registry.
//!
//! One map holds both: a card id is present exactly while one claim guard
//! for it is alive, and the entry owns that generation's cancellation token.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct RunningEntry {
    serial: u64,
    token: CancellationToken,
}

#[derive(Default)]
pub struct RunningRegistry {
    entries: Mutex<HashMap<String, RunningEntry>>,
    next_serial: AtomicU64,
}

impl RunningRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim a card for generation. `None` if it is already running.
    pub fn claim(&self, card_id: &str) -> Option<ClaimGuard<'_>> {
        let mut entries = self.entries.lock();
        if entries.contains_key(card_id) {
            return None;
        }
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        entries.insert(
            card_id.to_string(),
            RunningEntry {
                serial,
                token: token.clone(),
            },
        );
        Some(ClaimGuard {
            registry: self,
            card_id: card_id.to_string(),
            serial,
            token,
        })
    }

    pub fn contains(&self, card_id: &str) -> bool {
        self.entries.lock().contains_key(card_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn running_ids(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Signal the card's in-flight generation. The entry itself is released
    /// by the owning guard once the task unwinds.
    pub fn cancel(&self, card_id: &str) -> bool {
        match self.entries.lock().get(card_id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let entries = self.entries.lock();
        for entry in entries.values() {
            entry.token.cancel();
        }
        entries.len()
    }

    fn release(&self, card_id: &str, serial: u64) {
        let mut entries = self.entries.lock();
        if entries.get(card_id).map(|e| e.serial) == Some(serial) {
            entries.remove(card_id);
            debug!(card_id, "Released running claim");
        }
    }
}

/// Ownership of one card's generation; dropping it releases the claim on
/// every exit path.
pub struct ClaimGuard<'a> {
    registry: &'a RunningRegistry,
    card_id: String,
    serial: u64,
    token: CancellationToken,
}

impl ClaimGuard<'_> {
    pub fn card_id(&self) -> &str {
        &self.card_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.card_id, self.serial);
    }
}
