//! Persistence layer for the Card Store

use crate::card::Card;
use crate::error::StorageError;
use crate::store::CardStore;
use std::path::Path;

const CARDS_TREE: &str = "cards";
const ORDER_TREE: &str = "card_order";

/// Sled-based implementation of CardStore
///
/// Cards are stored as JSON keyed by id. A second tree maps each id to a
/// monotonically increasing sequence number so `load_all` returns cards in
/// the order they were first written.
pub struct SledCardStore {
    db: sled::Db,
    cards: sled::Tree,
    order: sled::Tree,
}

impl SledCardStore {
    /// Open (or create) a card database at the given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)
            .map_err(|e| StorageError::Database(format!("Failed to open sled database: {}", e)))?;
        let cards = db.open_tree(CARDS_TREE)?;
        let order = db.open_tree(ORDER_TREE)?;
        Ok(Self { db, cards, order })
    }

    pub fn contains(&self, card_id: &str) -> Result<bool, StorageError> {
        Ok(self.cards.contains_key(card_id.as_bytes())?)
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl CardStore for SledCardStore {
    fn load_all(&self) -> Result<Vec<Card>, StorageError> {
        let mut ordered = Vec::new();
        for item in self.cards.iter() {
            let (key, value) = item?;
            let card: Card = serde_json::from_slice(&value)?;
            let sequence = match self.order.get(&key)? {
                Some(bytes) => decode_sequence(&bytes),
                None => u64::MAX,
            };
            ordered.push((sequence, card));
        }
        ordered.sort_by(|(a_seq, a), (b_seq, b)| {
            a_seq.cmp(b_seq).then(a.created_at.cmp(&b.created_at))
        });
        Ok(ordered.into_iter().map(|(_, card)| card).collect())
    }

    fn upsert(&self, card: &Card) -> Result<(), StorageError> {
        let key = card.id.as_bytes();
        let value = serde_json::to_vec(card)?;
        if !self.order.contains_key(key)? {
            let sequence = self.db.generate_id()?;
            self.order.insert(key, sequence.to_be_bytes().to_vec())?;
        }
        self.cards.insert(key, value)?;
        Ok(())
    }

    fn delete(&self, card_id: &str) -> Result<(), StorageError> {
        self.cards.remove(card_id.as_bytes())?;
        self.order.remove(card_id.as_bytes())?;
        Ok(())
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        self.cards.clear()?;
        self.order.clear()?;
        self.flush()
    }
}

fn decode_sequence(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    if bytes.len() == 8 {
        buf.copy_from_slice(bytes);
        u64::from_be_bytes(buf)
    } else {
        u64::MAX
    }
}
