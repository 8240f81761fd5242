//! Card Store
//!
//! Persistence collaborator for cards. The scheduler owns cards in memory and
//! writes through this interface after every state transition.

pub mod persistence;

pub use persistence::SledCardStore;

use crate::card::Card;
use crate::error::StorageError;
use parking_lot::Mutex;

/// Card Store interface
pub trait CardStore: Send + Sync {
    /// All cards in creation order
    fn load_all(&self) -> Result<Vec<Card>, StorageError>;
    fn upsert(&self, card: &Card) -> Result<(), StorageError>;
    fn delete(&self, card_id: &str) -> Result<(), StorageError>;
    fn clear_all(&self) -> Result<(), StorageError>;
}

/// In-memory store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryCardStore {
    cards: Mutex<Vec<Card>>,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cards(cards: Vec<Card>) -> Self {
        Self {
            cards: Mutex::new(cards),
        }
    }

    /// Snapshot of a stored card
    pub fn get(&self, card_id: &str) -> Option<Card> {
        self.cards.lock().iter().find(|c| c.id == card_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.cards.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.lock().is_empty()
    }
}

impl CardStore for MemoryCardStore {
    fn load_all(&self) -> Result<Vec<Card>, StorageError> {
        Ok(self.cards.lock().clone())
    }

    fn upsert(&self, card: &Card) -> Result<(), StorageError> {
        let mut cards = self.cards.lock();
        match cards.iter_mut().find(|c| c.id == card.id) {
            Some(existing) => *existing = card.clone(),
            None => cards.push(card.clone()),
        }
        Ok(())
    }

    fn delete(&self, card_id: &str) -> Result<(), StorageError> {
        self.cards.lock().retain(|c| c.id != card_id);
        Ok(())
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        self.cards.lock().clear();
        Ok(())
    }
}
