//! Flashcard, deck and association stores over a [`KeyValueStore`].
//!
//! Each collection is one JSON array under a fixed key (see [`keys`]). There is no partial
//! update in the underlying store, so every mutation reads the whole collection, changes it
//! and writes it back.
//!
//! # Failure policy
//!
//! - Read operations (`get_*`, `deck_stats`, ...) never fail. A missing key, a backend error
//!   or JSON that does not parse all read as an empty collection and are logged.
//! - Mutating operations return [`StorageError`]. A backend failure is surfaced so the caller
//!   knows the write did not happen; a corrupt collection is still treated as empty.
//!
//! # Concurrency
//!
//! All mutations on one [`Storage`] are serialized by a single async mutex. Deck deletion
//! touches three keys, so a per-key lock would not keep the cascade consistent.
//!
//! ```rust
//! use flashdeck::kv::InMemoryStore;
//! use flashdeck::storage::Storage;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), flashdeck::error::StorageError> {
//! let storage = Storage::new(InMemoryStore::new());
//! storage.initialize_storage().await?;
//!
//! let deck = storage.save_deck("Verbs", None, Some("#34C759")).await?;
//! let card = storage.save_flashcard_to_deck("comer", "to eat", &deck.id).await?;
//! assert_eq!(storage.get_flashcards_by_deck(&deck.id).await, vec![card]);
//! # Ok(())
//! # }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{StorageError, StoreError};
use crate::kv::{self, keys, KeyValueStore};

mod associations;
mod decks;
mod flashcards;
pub mod ids;
pub mod migration;
pub mod model;
mod seed;
pub mod validation;

pub use migration::{MigrationReport, CURRENT_STORAGE_VERSION};
pub use model::{Deck, DeckDeletion, DeckStats, DeckUpdate, Flashcard, FlashcardDeckAssociation};

/// Entry point for every persisted record family.
pub struct Storage<S> {
    kv: Arc<S>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl<S> std::fmt::Debug for Storage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("clock", &self.clock).finish_non_exhaustive()
    }
}

impl<S> Storage<S>
where
    S: KeyValueStore + 'static,
{
    pub fn new(kv: S) -> Self {
        Self::from_arc(Arc::new(kv))
    }

    /// Share a store handle with other components (e.g. the rate limiter).
    pub fn from_arc(kv: Arc<S>) -> Self {
        Self { kv, clock: Arc::new(SystemClock), write_lock: Mutex::new(()) }
    }

    /// Override the clock used for ids and timestamps.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The underlying key-value store.
    pub fn kv(&self) -> &Arc<S> {
        &self.kv
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Degrading read: any failure is logged and yields an empty collection.
    pub(crate) async fn read_collection<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        match kv::get_raw(self.kv.as_ref(), key).await {
            Ok(Some(raw)) => decode_or_empty(key, &raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(key, error = %e, "failed to read collection");
                Vec::new()
            }
        }
    }

    /// Read for a write path: backend failures propagate, corrupt data reads as empty.
    pub(crate) async fn load_collection<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Vec<T>, StoreError> {
        Ok(match kv::get_raw(self.kv.as_ref(), key).await? {
            Some(raw) => decode_or_empty(key, &raw),
            None => Vec::new(),
        })
    }

    pub(crate) async fn write_collection<T: Serialize>(
        &self,
        key: &str,
        items: &[T],
    ) -> Result<(), StoreError> {
        kv::put_json(self.kv.as_ref(), key, items).await
    }

    /// Remove every flashcard along with all of their deck associations. Decks are kept.
    pub async fn clear_all_flashcards(&self) -> Result<(), StorageError> {
        let _guard = self.lock().await;
        kv::remove_key(self.kv.as_ref(), keys::ASSOCIATIONS).await?;
        kv::remove_key(self.kv.as_ref(), keys::FLASHCARDS).await?;
        info!("all flashcards cleared");
        Ok(())
    }
}

fn decode_or_empty<T: DeserializeOwned>(key: &str, raw: &str) -> Vec<T> {
    match kv::decode::<Vec<T>>(key, raw) {
        Ok(items) => items,
        Err(e) => {
            warn!(key, error = %e, "discarding unreadable collection");
            Vec::new()
        }
    }
}
