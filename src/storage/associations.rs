use std::collections::HashSet;
use tracing::debug;

use super::model::{Deck, Flashcard, FlashcardDeckAssociation};
use super::Storage;
use crate::error::{StorageError, StoreError};
use crate::kv::{keys, KeyValueStore};

impl<S> Storage<S>
where
    S: KeyValueStore + 'static,
{
    /// Every association row.
    pub async fn get_flashcard_deck_associations(&self) -> Vec<FlashcardDeckAssociation> {
        self.read_collection(keys::ASSOCIATIONS).await
    }

    /// File a flashcard into a deck. Returns `false` if the pair already existed.
    ///
    /// Both records must exist; an association never points at nothing.
    pub async fn save_flashcard_deck_association(
        &self,
        flashcard_id: &str,
        deck_id: &str,
    ) -> Result<bool, StorageError> {
        let _guard = self.lock().await;

        let cards: Vec<Flashcard> = self.load_collection(keys::FLASHCARDS).await?;
        if !cards.iter().any(|c| c.id == flashcard_id) {
            return Err(StorageError::not_found("flashcard", flashcard_id));
        }
        let decks: Vec<Deck> = self.load_collection(keys::DECKS).await?;
        if !decks.iter().any(|d| d.id == deck_id) {
            return Err(StorageError::not_found("deck", deck_id));
        }

        let added = self.add_associations_locked(flashcard_id, [deck_id]).await?;
        Ok(added == 1)
    }

    /// Unfile a flashcard from one deck. Returns `false` if it was not in that deck.
    ///
    /// The flashcard itself is kept even if this was its last deck.
    pub async fn remove_flashcard_from_deck(
        &self,
        flashcard_id: &str,
        deck_id: &str,
    ) -> Result<bool, StorageError> {
        let _guard = self.lock().await;
        let removed = self.retain_associations_locked(|a| !a.matches(flashcard_id, deck_id)).await?;
        Ok(!removed.is_empty())
    }

    /// Drop every association pointing at `deck_id`.
    pub async fn remove_associations_for_deck(&self, deck_id: &str) -> Result<usize, StorageError> {
        let _guard = self.lock().await;
        let removed = self.retain_associations_locked(|a| a.deck_id != deck_id).await?;
        Ok(removed.len())
    }

    /// Drop every association pointing at `flashcard_id`.
    pub async fn remove_associations_for_flashcard(
        &self,
        flashcard_id: &str,
    ) -> Result<usize, StorageError> {
        let _guard = self.lock().await;
        let removed = self.retain_associations_locked(|a| a.flashcard_id != flashcard_id).await?;
        Ok(removed.len())
    }

    /// Insert `(flashcard_id, deck_id)` for each deck, skipping pairs that exist.
    ///
    /// Caller holds the write lock and has checked that the ids resolve.
    pub(crate) async fn add_associations_locked<'a, I>(
        &self,
        flashcard_id: &str,
        deck_ids: I,
    ) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let pairs: Vec<(&str, &str)> = deck_ids.into_iter().map(|d| (flashcard_id, d)).collect();
        self.insert_association_pairs_locked(pairs).await
    }

    /// Bulk form of [`add_associations_locked`](Self::add_associations_locked): one read and at
    /// most one write for any number of `(flashcard_id, deck_id)` pairs.
    pub(crate) async fn insert_association_pairs_locked<'a, I>(
        &self,
        pairs: I,
    ) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut rows: Vec<FlashcardDeckAssociation> =
            self.load_collection(keys::ASSOCIATIONS).await?;
        let mut existing: HashSet<(String, String)> =
            rows.iter().map(|a| (a.flashcard_id.clone(), a.deck_id.clone())).collect();

        let added_at = self.clock().now();
        let mut added = 0;
        for (flashcard_id, deck_id) in pairs {
            if existing.insert((flashcard_id.to_string(), deck_id.to_string())) {
                rows.push(FlashcardDeckAssociation {
                    flashcard_id: flashcard_id.to_string(),
                    deck_id: deck_id.to_string(),
                    added_at,
                });
                added += 1;
            }
        }

        if added > 0 {
            self.write_collection(keys::ASSOCIATIONS, &rows).await?;
            debug!(added, "associations added");
        }
        Ok(added)
    }

    /// Keep rows matching `keep`, returning the ones dropped. Writes only when something changed.
    pub(crate) async fn retain_associations_locked<F>(
        &self,
        keep: F,
    ) -> Result<Vec<FlashcardDeckAssociation>, StoreError>
    where
        F: Fn(&FlashcardDeckAssociation) -> bool,
    {
        let rows: Vec<FlashcardDeckAssociation> = self.load_collection(keys::ASSOCIATIONS).await?;
        let (kept, removed): (Vec<_>, Vec<_>) = rows.into_iter().partition(|a| keep(a));
        if !removed.is_empty() {
            self.write_collection(keys::ASSOCIATIONS, &kept).await?;
            debug!(removed = removed.len(), "associations removed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::InMemoryStore;

    async fn fixture() -> (Storage<InMemoryStore>, Flashcard, Deck) {
        let storage = Storage::new(InMemoryStore::new()).with_clock(ManualClock::new(1_000));
        let deck = storage.save_deck("Food", None, None).await.unwrap();
        let card = storage.save_flashcard("pan", "bread").await.unwrap();
        (storage, card, deck)
    }

    #[tokio::test]
    async fn association_insert_is_idempotent() {
        let (storage, card, deck) = fixture().await;
        assert!(storage.save_flashcard_deck_association(&card.id, &deck.id).await.unwrap());
        assert!(!storage.save_flashcard_deck_association(&card.id, &deck.id).await.unwrap());

        let rows = storage.get_flashcard_deck_associations().await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0].matches(&card.id, &deck.id));
    }

    #[tokio::test]
    async fn association_requires_both_records() {
        let (storage, card, deck) = fixture().await;
        let err = storage.save_flashcard_deck_association("nope", &deck.id).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { kind: "flashcard", .. }));
        let err = storage.save_flashcard_deck_association(&card.id, "nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { kind: "deck", .. }));
        assert!(storage.get_flashcard_deck_associations().await.is_empty());
    }

    #[tokio::test]
    async fn remove_exact_pair_only() {
        let (storage, card, deck) = fixture().await;
        let other = storage.save_deck("Drinks", None, None).await.unwrap();
        storage.save_flashcard_deck_association(&card.id, &deck.id).await.unwrap();
        storage.save_flashcard_deck_association(&card.id, &other.id).await.unwrap();

        assert!(storage.remove_flashcard_from_deck(&card.id, &deck.id).await.unwrap());
        assert!(!storage.remove_flashcard_from_deck(&card.id, &deck.id).await.unwrap());

        let rows = storage.get_flashcard_deck_associations().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].deck_id, other.id);
        assert!(storage.get_flashcard(&card.id).await.is_some(), "card survives unfiling");
    }

    #[tokio::test]
    async fn bulk_removal_counts() {
        let (storage, card, deck) = fixture().await;
        let second = storage.save_flashcard("leche", "milk").await.unwrap();
        storage.save_flashcard_deck_association(&card.id, &deck.id).await.unwrap();
        storage.save_flashcard_deck_association(&second.id, &deck.id).await.unwrap();

        assert_eq!(storage.remove_associations_for_flashcard(&card.id).await.unwrap(), 1);
        assert_eq!(storage.remove_associations_for_deck(&deck.id).await.unwrap(), 1);
        assert_eq!(storage.remove_associations_for_deck(&deck.id).await.unwrap(), 0);
    }
}
