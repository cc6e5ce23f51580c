use std::collections::HashSet;
use tracing::{debug, info};

use super::model::{Deck, Flashcard, FlashcardDeckAssociation};
use super::{ids, validation, Storage};
use crate::error::{StorageError, StoreError};
use crate::kv::{keys, KeyValueStore};

impl<S> Storage<S>
where
    S: KeyValueStore + 'static,
{
    /// Every flashcard, oldest first. Empty on any read failure.
    pub async fn get_flashcards(&self) -> Vec<Flashcard> {
        self.read_collection(keys::FLASHCARDS).await
    }

    pub async fn get_flashcard(&self, id: &str) -> Option<Flashcard> {
        self.get_flashcards().await.into_iter().find(|c| c.id == id)
    }

    /// Flashcards filed into `deck_id`.
    pub async fn get_flashcards_by_deck(&self, deck_id: &str) -> Vec<Flashcard> {
        let members: HashSet<String> = self
            .get_flashcard_deck_associations()
            .await
            .into_iter()
            .filter(|a| a.deck_id == deck_id)
            .map(|a| a.flashcard_id)
            .collect();
        self.get_flashcards().await.into_iter().filter(|c| members.contains(&c.id)).collect()
    }

    /// Flashcards that belong to no deck.
    pub async fn get_unfiled_flashcards(&self) -> Vec<Flashcard> {
        let filed: HashSet<String> = self
            .get_flashcard_deck_associations()
            .await
            .into_iter()
            .map(|a| a.flashcard_id)
            .collect();
        self.get_flashcards().await.into_iter().filter(|c| !filed.contains(&c.id)).collect()
    }

    /// Decks `flashcard_id` is filed into.
    pub async fn get_decks_for_flashcard(&self, flashcard_id: &str) -> Vec<Deck> {
        let deck_ids: HashSet<String> = self
            .get_flashcard_deck_associations()
            .await
            .into_iter()
            .filter(|a| a.flashcard_id == flashcard_id)
            .map(|a| a.deck_id)
            .collect();
        self.get_decks().await.into_iter().filter(|d| deck_ids.contains(&d.id)).collect()
    }

    /// Save an unfiled flashcard.
    pub async fn save_flashcard(&self, front: &str, back: &str) -> Result<Flashcard, StorageError> {
        self.save_flashcard_to_multiple_decks(front, back, &[] as &[&str]).await
    }

    /// Save a flashcard filed into one deck. An unknown deck leaves the card unfiled.
    pub async fn save_flashcard_to_deck(
        &self,
        front: &str,
        back: &str,
        deck_id: &str,
    ) -> Result<Flashcard, StorageError> {
        self.save_flashcard_to_multiple_decks(front, back, &[deck_id]).await
    }

    /// Save one flashcard and file it into every deck in `deck_ids` that exists.
    pub async fn save_flashcard_to_multiple_decks<D: AsRef<str>>(
        &self,
        front: &str,
        back: &str,
        deck_ids: &[D],
    ) -> Result<Flashcard, StorageError> {
        let (front, back) = validation::validate_flashcard(front, back)?;
        let deck_ids: Vec<&str> = deck_ids.iter().map(AsRef::as_ref).collect();

        let _guard = self.lock().await;
        let card = self.insert_flashcard_locked(front, back, &deck_ids).await?;
        Ok(card)
    }

    /// Replace a flashcard's deck membership. Unknown deck ids are ignored.
    pub async fn set_flashcard_decks<D: AsRef<str>>(
        &self,
        flashcard_id: &str,
        deck_ids: &[D],
    ) -> Result<(), StorageError> {
        let _guard = self.lock().await;

        let cards: Vec<Flashcard> = self.load_collection(keys::FLASHCARDS).await?;
        if !cards.iter().any(|c| c.id == flashcard_id) {
            return Err(StorageError::not_found("flashcard", flashcard_id));
        }
        let wanted = self.existing_deck_ids(deck_ids.iter().map(AsRef::as_ref)).await?;

        let mut rows: Vec<FlashcardDeckAssociation> =
            self.load_collection(keys::ASSOCIATIONS).await?;
        let before = rows.len();
        rows.retain(|a| a.flashcard_id != flashcard_id || wanted.iter().any(|d| *d == a.deck_id));
        let removed = before - rows.len();
        if removed > 0 {
            self.write_collection(keys::ASSOCIATIONS, &rows).await?;
        }
        let added =
            self.add_associations_locked(flashcard_id, wanted.iter().map(String::as_str)).await?;

        debug!(flashcard_id, added, removed, "flashcard decks replaced");
        Ok(())
    }

    /// Edit a flashcard by replacing it.
    ///
    /// A new record with a fresh id is filed into the same decks, then the old record and its
    /// associations are removed. An interruption leaves both cards, never neither. Returns the
    /// new card.
    pub async fn update_flashcard(
        &self,
        id: &str,
        front: &str,
        back: &str,
    ) -> Result<Flashcard, StorageError> {
        let (front, back) = validation::validate_flashcard(front, back)?;

        let _guard = self.lock().await;
        let cards: Vec<Flashcard> = self.load_collection(keys::FLASHCARDS).await?;
        if !cards.iter().any(|c| c.id == id) {
            return Err(StorageError::not_found("flashcard", id));
        }
        let deck_ids: Vec<String> = self
            .load_collection::<FlashcardDeckAssociation>(keys::ASSOCIATIONS)
            .await?
            .into_iter()
            .filter(|a| a.flashcard_id == id)
            .map(|a| a.deck_id)
            .collect();
        let deck_ids: Vec<&str> = deck_ids.iter().map(String::as_str).collect();

        let card = self.insert_flashcard_locked(front, back, &deck_ids).await?;
        self.remove_flashcard_locked(id).await?;

        info!(old_id = id, new_id = %card.id, "flashcard replaced");
        Ok(card)
    }

    /// Delete a flashcard and its associations. Returns whether it existed.
    pub async fn delete_flashcard(&self, id: &str) -> Result<bool, StorageError> {
        let _guard = self.lock().await;
        let existed = self.remove_flashcard_locked(id).await?.is_some();
        if existed {
            debug!(id, "flashcard deleted");
        }
        Ok(existed)
    }

    /// Keep only ids naming an existing deck, deduplicated, in the given order.
    async fn existing_deck_ids<'a, I>(&self, deck_ids: I) -> Result<Vec<String>, StoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let decks: Vec<Deck> = self.load_collection(keys::DECKS).await?;
        let known: HashSet<&str> = decks.iter().map(|d| d.id.as_str()).collect();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in deck_ids {
            if !known.contains(id) {
                debug!(deck_id = id, "skipping unknown deck");
                continue;
            }
            if seen.insert(id) {
                out.push(id.to_string());
            }
        }
        Ok(out)
    }

    /// Append a validated card, then file it. Card first, so an interrupted save leaves an
    /// unfiled card rather than an association to nothing.
    pub(crate) async fn insert_flashcard_locked(
        &self,
        front: String,
        back: String,
        deck_ids: &[&str],
    ) -> Result<Flashcard, StoreError> {
        let deck_ids = self.existing_deck_ids(deck_ids.iter().copied()).await?;

        let now = self.clock().now_millis();
        let card = Flashcard {
            id: ids::generate(now),
            front,
            back,
            created_at: self.clock().now(),
        };

        let mut cards: Vec<Flashcard> = self.load_collection(keys::FLASHCARDS).await?;
        cards.push(card.clone());
        self.write_collection(keys::FLASHCARDS, &cards).await?;

        if !deck_ids.is_empty() {
            self.add_associations_locked(&card.id, deck_ids.iter().map(String::as_str)).await?;
        }
        debug!(id = %card.id, decks = deck_ids.len(), "flashcard saved");
        Ok(card)
    }

    /// Remove associations, then the card. Returns the decks it was in, or `None` if missing.
    pub(crate) async fn remove_flashcard_locked(
        &self,
        id: &str,
    ) -> Result<Option<Vec<String>>, StoreError> {
        let mut cards: Vec<Flashcard> = self.load_collection(keys::FLASHCARDS).await?;
        let Some(pos) = cards.iter().position(|c| c.id == id) else {
            return Ok(None);
        };

        let removed = self.retain_associations_locked(|a| a.flashcard_id != id).await?;
        cards.remove(pos);
        self.write_collection(keys::FLASHCARDS, &cards).await?;

        Ok(Some(removed.into_iter().map(|a| a.deck_id).collect()))
    }
}
