use tracing::{debug, info};

use super::model::{Deck, Flashcard};
use super::Storage;
use crate::error::StorageError;
use crate::kv::{self, keys, KeyValueStore};

const ALL_DECK: (&str, &str, &str) = ("All Flashcards", "Every card you save", "#007AFF");
const SPANISH_DECK: (&str, &str, &str) = ("Spanish Basics", "Everyday words to start with", "#34C759");

const SAMPLE_CARDS: &[(&str, &str)] = &[
    ("Hola", "Hello"),
    ("Gracias", "Thank you"),
    ("¿Dónde está la biblioteca?", "Where is the library?"),
];

impl<S> Storage<S>
where
    S: KeyValueStore + 'static,
{
    /// Write the first-run decks and cards once, on an empty install.
    ///
    /// The flag is set even when existing data means nothing is written, so a user who deletes
    /// every sample never gets them back. Caller holds the write lock.
    pub(crate) async fn seed_sample_data_locked(&self) -> Result<bool, StorageError> {
        if kv::get_raw(self.kv().as_ref(), keys::SEEDED).await?.is_some() {
            return Ok(false);
        }

        let decks: Vec<Deck> = self.load_collection(keys::DECKS).await?;
        let cards: Vec<Flashcard> = self.load_collection(keys::FLASHCARDS).await?;
        let seeded = if decks.is_empty() && cards.is_empty() {
            let mut deck_ids = Vec::with_capacity(2);
            for (name, description, color) in [ALL_DECK, SPANISH_DECK] {
                let deck = self
                    .insert_deck_locked(
                        name.to_string(),
                        Some(description.to_string()),
                        Some(color.to_string()),
                    )
                    .await?;
                deck_ids.push(deck.id);
            }
            let deck_refs: Vec<&str> = deck_ids.iter().map(String::as_str).collect();
            for (front, back) in SAMPLE_CARDS {
                self.insert_flashcard_locked(front.to_string(), back.to_string(), &deck_refs).await?;
            }
            info!(decks = deck_ids.len(), cards = SAMPLE_CARDS.len(), "sample data seeded");
            true
        } else {
            debug!("existing data found; skipping sample data");
            false
        };

        kv::set_raw(self.kv().as_ref(), keys::SEEDED, "true").await?;
        Ok(seeded)
    }
}
