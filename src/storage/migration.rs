//! Versioned schema upgrades.
//!
//! | Version | Shape |
//! |---|---|
//! | 1 | flashcards only |
//! | 2 | decks; each flashcard carries a `deckId` |
//! | 3 | association table introduced |
//! | 4 | associations are the only membership record; `deckId` stripped |
//!
//! [`Storage::initialize_storage`] is safe to call on every launch. It upgrades whatever it
//! finds to [`CURRENT_STORAGE_VERSION`], then runs the one-time first-run seed, which is gated
//! by its own flag rather than by the version.
//!
//! Rollback is partial: only the flashcards collection is restored from the backup. A default
//! deck or association rows written before a failing step stay in place; a retry converges
//! because the deck is found again by name and association inserts skip existing pairs.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{error, info, warn};

use super::model::{timestamp, Deck, Flashcard, FlashcardDeckAssociation};
use super::Storage;
use crate::error::{StorageError, StoreError};
use crate::kv::{self, keys, KeyValueStore};

/// Version written by a successful [`Storage::initialize_storage`].
pub const CURRENT_STORAGE_VERSION: u32 = 4;

/// Version assumed when no token is stored.
const INITIAL_VERSION: u32 = 1;
/// First version with an association table.
const ASSOCIATIONS_VERSION: u32 = 3;

const DEFAULT_DECK_NAME: &str = "My Flashcards";
const DEFAULT_DECK_COLOR: &str = "#007AFF";

/// What [`Storage::initialize_storage`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MigrationReport {
    /// Version found in storage.
    pub from: u32,
    /// Version in storage afterwards.
    pub to: u32,
    /// A default deck was created for flashcards that had none.
    pub default_deck_created: bool,
    /// Association rows written by the upgrade.
    pub associations_created: usize,
    /// First-run sample data was written.
    pub seeded: bool,
}

impl MigrationReport {
    /// Whether any schema step ran.
    pub fn migrated(&self) -> bool {
        self.from < self.to
    }
}

/// Flashcard as stored before version 4.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyFlashcard {
    id: String,
    front: String,
    back: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    deck_id: Option<String>,
}

impl From<LegacyFlashcard> for Flashcard {
    fn from(legacy: LegacyFlashcard) -> Self {
        Flashcard {
            id: legacy.id,
            front: legacy.front,
            back: legacy.back,
            created_at: legacy.created_at,
        }
    }
}

fn parse_version(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}

impl<S> Storage<S>
where
    S: KeyValueStore + 'static,
{
    /// Stored schema version; 1 when absent, unreadable or unparsable.
    pub async fn storage_version(&self) -> u32 {
        match kv::get_raw(self.kv().as_ref(), keys::STORAGE_VERSION).await {
            Ok(Some(raw)) => parse_version(&raw).unwrap_or_else(|| {
                warn!(raw = %raw, "unparsable storage version");
                INITIAL_VERSION
            }),
            Ok(None) => INITIAL_VERSION,
            Err(e) => {
                warn!(error = %e, "failed to read storage version");
                INITIAL_VERSION
            }
        }
    }

    /// Store `version`. Lower than the stored one is refused with a warning.
    pub async fn set_storage_version(&self, version: u32) -> Result<(), StorageError> {
        let _guard = self.lock().await;
        let current = self.read_version_locked().await?;
        if version < current {
            warn!(current, requested = version, "refusing to lower storage version");
            return Ok(());
        }
        self.write_version_locked(version).await?;
        Ok(())
    }

    /// Bring storage up to date and seed first-run data. Idempotent.
    ///
    /// Flashcards are copied to a backup key before any step runs. If a step fails the backup
    /// is written back (best effort) and [`StorageError::Migration`] is returned; the version
    /// token is left untouched so the next call retries.
    pub async fn initialize_storage(&self) -> Result<MigrationReport, StorageError> {
        let _guard = self.lock().await;

        let from = self.read_version_locked().await?;
        let mut report = MigrationReport { from, to: from.max(CURRENT_STORAGE_VERSION), ..Default::default() };

        if from < CURRENT_STORAGE_VERSION {
            info!(from, to = CURRENT_STORAGE_VERSION, "migrating storage");
            let backup = kv::get_raw(self.kv().as_ref(), keys::FLASHCARDS).await?;
            if let Some(raw) = &backup {
                kv::set_raw(self.kv().as_ref(), keys::FLASHCARDS_BACKUP, raw).await?;
            }

            match self.run_steps_locked(from, &mut report).await {
                Ok(()) => {
                    self.write_version_locked(CURRENT_STORAGE_VERSION).await?;
                    if let Err(e) = kv::remove_key(self.kv().as_ref(), keys::FLASHCARDS_BACKUP).await {
                        warn!(error = %e, "failed to remove migration backup");
                    }
                    info!(
                        from,
                        to = CURRENT_STORAGE_VERSION,
                        default_deck = report.default_deck_created,
                        associations = report.associations_created,
                        "storage migration completed"
                    );
                }
                Err(e) => {
                    self.restore_backup_locked(backup.as_deref()).await;
                    return Err(StorageError::Migration {
                        from,
                        to: CURRENT_STORAGE_VERSION,
                        source: Box::new(e),
                    });
                }
            }
        } else if from > CURRENT_STORAGE_VERSION {
            warn!(from, "storage is newer than this build understands; leaving it as is");
        }

        report.seeded = self.seed_sample_data_locked().await?;
        Ok(report)
    }

    async fn run_steps_locked(
        &self,
        from: u32,
        report: &mut MigrationReport,
    ) -> Result<(), StorageError> {
        let cards: Vec<LegacyFlashcard> = self.load_collection(keys::FLASHCARDS).await?;

        if from < ASSOCIATIONS_VERSION
            && kv::get_raw(self.kv().as_ref(), keys::ASSOCIATIONS).await?.is_none()
        {
            self.write_collection::<FlashcardDeckAssociation>(keys::ASSOCIATIONS, &[]).await?;
        }

        let decks: Vec<Deck> = self.load_collection(keys::DECKS).await?;
        let known_decks: HashSet<&str> = decks.iter().map(|d| d.id.as_str()).collect();

        // Legacy deckId -> association rows, for decks that still exist.
        let legacy_pairs: Vec<(&str, &str)> = cards
            .iter()
            .filter_map(|c| c.deck_id.as_deref().map(|d| (c.id.as_str(), d)))
            .filter(|(_, d)| known_decks.contains(d))
            .collect();
        let mut filed: HashSet<String> =
            legacy_pairs.iter().map(|(card, _)| card.to_string()).collect();
        report.associations_created += self.insert_association_pairs_locked(legacy_pairs).await?;

        if from < 2 {
            let existing: Vec<FlashcardDeckAssociation> =
                self.load_collection(keys::ASSOCIATIONS).await?;
            filed.extend(existing.into_iter().map(|a| a.flashcard_id));

            let unfiled: Vec<&str> =
                cards.iter().map(|c| c.id.as_str()).filter(|id| !filed.contains(*id)).collect();
            if !unfiled.is_empty() {
                let deck_id = self.default_deck_locked(&decks, report).await?;
                let pairs = unfiled.iter().map(|card| (*card, deck_id.as_str()));
                report.associations_created += self.insert_association_pairs_locked(pairs).await?;
            }
        }

        if cards.iter().any(|c| c.deck_id.is_some()) {
            let stripped: Vec<Flashcard> = cards.into_iter().map(Flashcard::from).collect();
            self.write_collection(keys::FLASHCARDS, &stripped).await?;
        }
        Ok(())
    }

    /// Id of the deck that collects unfiled cards, reusing one with the default name.
    async fn default_deck_locked(
        &self,
        decks: &[Deck],
        report: &mut MigrationReport,
    ) -> Result<String, StorageError> {
        if let Some(deck) =
            decks.iter().find(|d| d.name.to_lowercase() == DEFAULT_DECK_NAME.to_lowercase())
        {
            return Ok(deck.id.clone());
        }
        let deck = self
            .insert_deck_locked(
                DEFAULT_DECK_NAME.to_string(),
                None,
                Some(DEFAULT_DECK_COLOR.to_string()),
            )
            .await?;
        report.default_deck_created = true;
        Ok(deck.id)
    }

    async fn restore_backup_locked(&self, backup: Option<&str>) {
        let Some(raw) = backup else {
            return;
        };
        match kv::set_raw(self.kv().as_ref(), keys::FLASHCARDS, raw).await {
            Ok(()) => warn!("migration failed; flashcards restored from backup"),
            Err(e) => error!(error = %e, "migration failed and flashcards could not be restored"),
        }
    }

    /// Version for a write path: backend failures propagate.
    async fn read_version_locked(&self) -> Result<u32, StoreError> {
        let raw = kv::get_raw(self.kv().as_ref(), keys::STORAGE_VERSION).await?;
        Ok(raw.as_deref().and_then(parse_version).unwrap_or(INITIAL_VERSION))
    }

    async fn write_version_locked(&self, version: u32) -> Result<(), StoreError> {
        kv::set_raw(self.kv().as_ref(), keys::STORAGE_VERSION, &version.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::InMemoryStore;

    fn storage(kv: &InMemoryStore) -> Storage<InMemoryStore> {
        Storage::new(kv.clone()).with_clock(ManualClock::new(1_700_000_000_000))
    }

    #[test]
    fn version_parsing_is_numeric() {
        assert_eq!(parse_version("4"), Some(4));
        assert_eq!(parse_version(" 10 "), Some(10));
        assert_eq!(parse_version("v4"), None);
        // "10" sorts before "4" as text; as numbers it is newer
        assert!(parse_version("10") > parse_version("4"));
    }

    #[tokio::test]
    async fn version_defaults_and_never_regresses() {
        let kv = InMemoryStore::new();
        let storage = storage(&kv);
        assert_eq!(storage.storage_version().await, 1);

        kv.put_raw(keys::STORAGE_VERSION, "garbage");
        assert_eq!(storage.storage_version().await, 1);

        storage.set_storage_version(3).await.unwrap();
        storage.set_storage_version(2).await.unwrap();
        assert_eq!(storage.storage_version().await, 3);
        assert_eq!(kv.raw(keys::STORAGE_VERSION).as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn fresh_install_reaches_current_and_seeds() {
        let kv = InMemoryStore::new();
        let report = storage(&kv).initialize_storage().await.unwrap();
        assert_eq!(report.from, 1);
        assert_eq!(report.to, CURRENT_STORAGE_VERSION);
        assert!(!report.default_deck_created);
        assert!(report.seeded);
        assert_eq!(kv.raw(keys::STORAGE_VERSION).as_deref(), Some("4"));
        assert!(kv.raw(keys::FLASHCARDS_BACKUP).is_none());
    }

    #[tokio::test]
    async fn version_two_deck_ids_become_associations() {
        let kv = InMemoryStore::new();
        kv.put_raw(keys::STORAGE_VERSION, "2");
        kv.put_raw(
            keys::DECKS,
            r#"[{"id":"d1","name":"Verbs","createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-01T00:00:00Z"}]"#,
        );
        kv.put_raw(
            keys::FLASHCARDS,
            r#"[
                {"id":"c1","front":"ir","back":"to go","createdAt":"2024-01-02T00:00:00Z","deckId":"d1"},
                {"id":"c2","front":"ser","back":"to be","createdAt":1704153600000,"deckId":"gone"}
            ]"#,
        );

        let storage = storage(&kv);
        let report = storage.initialize_storage().await.unwrap();
        assert_eq!(report.from, 2);
        assert_eq!(report.associations_created, 1);
        assert!(!report.default_deck_created);
        assert!(!report.seeded);

        assert!(!kv.raw(keys::FLASHCARDS).unwrap().contains("deckId"));
        let rows = storage.get_flashcard_deck_associations().await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0].matches("c1", "d1"));
        assert_eq!(storage.get_flashcards().await.len(), 2);
    }

    #[tokio::test]
    async fn newer_version_is_left_alone() {
        let kv = InMemoryStore::new();
        kv.put_raw(keys::STORAGE_VERSION, "10");
        kv.put_raw(keys::SEEDED, "true");
        let report = storage(&kv).initialize_storage().await.unwrap();
        assert_eq!(report.from, 10);
        assert_eq!(report.to, 10);
        assert!(!report.migrated());
        assert_eq!(kv.raw(keys::STORAGE_VERSION).as_deref(), Some("10"));
    }
}
