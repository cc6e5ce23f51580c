use std::collections::HashSet;
use tracing::{debug, info};

use super::model::{
    Deck, DeckDeletion, DeckStats, DeckUpdate, Flashcard, FlashcardDeckAssociation,
};
use super::{ids, validation, Storage};
use crate::error::{StorageError, StoreError, ValidationError};
use crate::kv::{keys, KeyValueStore};

fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

impl<S> Storage<S>
where
    S: KeyValueStore + 'static,
{
    /// Every deck, in creation order. Empty on any read failure.
    pub async fn get_decks(&self) -> Vec<Deck> {
        self.read_collection(keys::DECKS).await
    }

    pub async fn get_deck(&self, id: &str) -> Option<Deck> {
        self.get_decks().await.into_iter().find(|d| d.id == id)
    }

    /// Whether another deck already uses `name`, ignoring case and surrounding whitespace.
    pub async fn deck_name_exists(&self, name: &str, exclude_id: Option<&str>) -> bool {
        let name = name.trim();
        self.get_decks()
            .await
            .iter()
            .any(|d| same_name(&d.name, name) && Some(d.id.as_str()) != exclude_id)
    }

    /// Create a deck after validating every field and checking the name is unused.
    pub async fn save_deck(
        &self,
        name: &str,
        description: Option<&str>,
        color: Option<&str>,
    ) -> Result<Deck, StorageError> {
        let name = validation::validate_deck_name(name)?;
        let description = validation::validate_description(description)?;
        let color = validation::validate_color(color)?;

        let _guard = self.lock().await;
        let deck = self.insert_deck_locked(name, description, color).await?;
        Ok(deck)
    }

    /// Apply a partial update. Only supplied fields are validated; `updated_at` is bumped.
    pub async fn update_deck(&self, id: &str, update: DeckUpdate) -> Result<Deck, StorageError> {
        let name = update.name.as_deref().map(validation::validate_deck_name).transpose()?;
        let description = match update.description.as_deref() {
            Some(d) => Some(validation::validate_description(Some(d))?),
            None => None,
        };
        let color = match update.color.as_deref() {
            Some(c) => Some(validation::validate_color(Some(c))?),
            None => None,
        };

        let _guard = self.lock().await;
        let mut decks: Vec<Deck> = self.load_collection(keys::DECKS).await?;

        if let Some(name) = &name {
            if decks.iter().any(|d| d.id != id && same_name(&d.name, name)) {
                return Err(ValidationError::DuplicateDeckName { name: name.clone() }.into());
            }
        }

        let Some(deck) = decks.iter_mut().find(|d| d.id == id) else {
            return Err(StorageError::not_found("deck", id));
        };
        if let Some(name) = name {
            deck.name = name;
        }
        if let Some(description) = description {
            deck.description = description;
        }
        if let Some(color) = color {
            deck.color = color;
        }
        deck.updated_at = self.clock().now();
        let updated = deck.clone();

        self.write_collection(keys::DECKS, &decks).await?;
        debug!(id, "deck updated");
        Ok(updated)
    }

    /// Delete a deck, its associations, and the flashcards it leaves with no deck.
    ///
    /// Steps run in that order so an interruption leaves stray flashcards, never associations
    /// to a deck that is gone. Flashcards that were never in this deck are not touched, even
    /// if they are unfiled.
    pub async fn delete_deck(&self, id: &str) -> Result<DeckDeletion, StorageError> {
        let _guard = self.lock().await;

        let mut decks: Vec<Deck> = self.load_collection(keys::DECKS).await?;
        let Some(pos) = decks.iter().position(|d| d.id == id) else {
            return Err(StorageError::not_found("deck", id));
        };
        let deck = decks.remove(pos);
        self.write_collection(keys::DECKS, &decks).await?;

        let removed = self.retain_associations_locked(|a| a.deck_id != id).await?;
        let candidates: HashSet<String> = removed.iter().map(|a| a.flashcard_id.clone()).collect();
        let orphans_removed = self.remove_orphans_locked(&candidates).await?;

        info!(
            id,
            associations = removed.len(),
            orphans = orphans_removed.len(),
            "deck deleted"
        );
        Ok(DeckDeletion {
            deck: Some(deck),
            associations_removed: removed.len(),
            orphans_removed,
        })
    }

    /// Card count and last filing time, derived from the association table.
    pub async fn get_deck_stats(&self, deck_id: &str) -> DeckStats {
        let rows: Vec<_> = self
            .get_flashcard_deck_associations()
            .await
            .into_iter()
            .filter(|a| a.deck_id == deck_id)
            .collect();
        DeckStats { card_count: rows.len(), last_added: rows.iter().map(|a| a.added_at).max() }
    }

    pub(crate) async fn insert_deck_locked(
        &self,
        name: String,
        description: Option<String>,
        color: Option<String>,
    ) -> Result<Deck, StorageError> {
        let mut decks: Vec<Deck> = self.load_collection(keys::DECKS).await?;
        if decks.iter().any(|d| same_name(&d.name, &name)) {
            return Err(ValidationError::DuplicateDeckName { name }.into());
        }

        let now = self.clock().now();
        let deck = Deck {
            id: ids::generate(self.clock().now_millis()),
            name,
            description,
            color,
            created_at: now,
            updated_at: now,
        };
        decks.push(deck.clone());
        self.write_collection(keys::DECKS, &decks).await?;
        debug!(id = %deck.id, name = %deck.name, "deck created");
        Ok(deck)
    }

    /// Delete each candidate flashcard that no longer has any association.
    async fn remove_orphans_locked(
        &self,
        candidates: &HashSet<String>,
    ) -> Result<Vec<String>, StoreError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let still_filed: HashSet<String> = self
            .load_collection::<FlashcardDeckAssociation>(keys::ASSOCIATIONS)
            .await?
            .into_iter()
            .map(|a| a.flashcard_id)
            .collect();

        let cards: Vec<Flashcard> = self.load_collection(keys::FLASHCARDS).await?;
        let (orphans, kept): (Vec<_>, Vec<_>) = cards
            .into_iter()
            .partition(|c| candidates.contains(&c.id) && !still_filed.contains(&c.id));
        if !orphans.is_empty() {
            self.write_collection(keys::FLASHCARDS, &kept).await?;
        }
        Ok(orphans.into_iter().map(|c| c.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::InMemoryStore;

    fn storage() -> (Storage<InMemoryStore>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        (Storage::new(InMemoryStore::new()).with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn save_normalizes_fields() {
        let (storage, _) = storage();
        let deck = storage.save_deck("  Travel ", Some("   "), Some("#ABC")).await.unwrap();
        assert_eq!(deck.name, "Travel");
        assert_eq!(deck.description, None);
        assert_eq!(deck.color.as_deref(), Some("#ABC"));
        assert_eq!(deck.created_at, deck.updated_at);
        assert_eq!(storage.get_deck(&deck.id).await, Some(deck));
    }

    #[tokio::test]
    async fn duplicate_names_ignore_case() {
        let (storage, _) = storage();
        storage.save_deck("Spanish", None, None).await.unwrap();
        let err = storage.save_deck("spanish", None, None).await.unwrap_err();
        assert_eq!(
            err.as_validation(),
            Some(&ValidationError::DuplicateDeckName { name: "spanish".into() })
        );
        assert_eq!(err.user_message(), "A deck with this name already exists");
        assert_eq!(storage.get_decks().await.len(), 1);
        assert!(storage.deck_name_exists(" SPANISH ", None).await);
    }

    #[tokio::test]
    async fn update_checks_name_excluding_self() {
        let (storage, clock) = storage();
        let verbs = storage.save_deck("Verbs", None, None).await.unwrap();
        storage.save_deck("Nouns", None, None).await.unwrap();
        clock.advance(5_000);

        let renamed = storage.update_deck(&verbs.id, DeckUpdate::default().name("VERBS")).await.unwrap();
        assert_eq!(renamed.name, "VERBS");
        assert!(renamed.updated_at > verbs.updated_at);
        assert_eq!(renamed.created_at, verbs.created_at);

        let err = storage
            .update_deck(&verbs.id, DeckUpdate::default().name("nouns"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn update_validates_only_supplied_fields() {
        let (storage, _) = storage();
        let deck = storage.save_deck("Colors", Some("basic"), Some("#fff")).await.unwrap();

        let err = storage
            .update_deck(&deck.id, DeckUpdate::default().color("teal"))
            .await
            .unwrap_err();
        assert!(matches!(err.as_validation(), Some(ValidationError::InvalidColor { .. })));

        let cleared = storage
            .update_deck(&deck.id, DeckUpdate::default().description(""))
            .await
            .unwrap();
        assert_eq!(cleared.description, None);
        assert_eq!(cleared.color.as_deref(), Some("#fff"));

        let missing = storage.update_deck("ghost", DeckUpdate::default()).await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn delete_cascades_and_removes_orphans_only() {
        let (storage, _) = storage();
        let d = storage.save_deck("D", None, None).await.unwrap();
        let e = storage.save_deck("E", None, None).await.unwrap();
        let shared = storage
            .save_flashcard_to_multiple_decks("compartir", "share", &[d.id.as_str(), e.id.as_str()])
            .await
            .unwrap();
        let only_d = storage.save_flashcard_to_deck("solo", "alone", &d.id).await.unwrap();
        let unfiled = storage.save_flashcard("suelto", "loose").await.unwrap();

        let deletion = storage.delete_deck(&d.id).await.unwrap();
        assert_eq!(deletion.associations_removed, 2);
        assert_eq!(deletion.orphans_removed, vec![only_d.id.clone()]);

        let remaining: Vec<String> =
            storage.get_flashcards().await.into_iter().map(|c| c.id).collect();
        assert_eq!(remaining, vec![shared.id.clone(), unfiled.id.clone()]);
        assert_eq!(storage.get_decks_for_flashcard(&shared.id).await, vec![e]);
        assert!(storage.get_deck(&d.id).await.is_none());
        assert!(storage.delete_deck(&d.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn stats_count_associations() {
        let (storage, clock) = storage();
        let deck = storage.save_deck("Numbers", None, None).await.unwrap();
        assert_eq!(storage.get_deck_stats(&deck.id).await, DeckStats::default());

        storage.save_flashcard_to_deck("uno", "one", &deck.id).await.unwrap();
        clock.advance(1_000);
        storage.save_flashcard_to_deck("dos", "two", &deck.id).await.unwrap();

        let stats = storage.get_deck_stats(&deck.id).await;
        assert_eq!(stats.card_count, 2);
        assert_eq!(stats.last_added.map(|t| t.timestamp_millis()), Some(1_700_000_001_000));
    }
}
