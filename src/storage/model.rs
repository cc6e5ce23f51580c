//! Persisted record shapes.
//!
//! Timestamps are written as RFC 3339 strings. Reading is lenient: older installs and
//! hand-edited data may carry Unix-millisecond numbers or omit bookkeeping fields, and those
//! records still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: String,
    pub front: String,
    pub back: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

/// A user-defined collection of flashcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredDeck")]
pub struct Deck {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDeck {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    updated_at: Option<DateTime<Utc>>,
}

impl From<StoredDeck> for Deck {
    fn from(raw: StoredDeck) -> Self {
        Deck {
            id: raw.id,
            name: raw.name,
            description: raw.description,
            color: raw.color,
            updated_at: raw.updated_at.unwrap_or(raw.created_at),
            created_at: raw.created_at,
        }
    }
}

/// Membership of one flashcard in one deck. `(flashcard_id, deck_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardDeckAssociation {
    pub flashcard_id: String,
    pub deck_id: String,
    #[serde(default = "timestamp::epoch", deserialize_with = "timestamp::deserialize")]
    pub added_at: DateTime<Utc>,
}

impl FlashcardDeckAssociation {
    pub(crate) fn matches(&self, flashcard_id: &str, deck_id: &str) -> bool {
        self.flashcard_id == flashcard_id && self.deck_id == deck_id
    }
}

/// Partial deck update. `None` leaves a field unchanged.
///
/// An empty (after trimming) `description` or `color` clears the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl DeckUpdate {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Whether the update touches nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.color.is_none()
    }
}

/// Derived per-deck figures; nothing here is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckStats {
    pub card_count: usize,
    /// Most recent time a card was filed into the deck.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_added: Option<DateTime<Utc>>,
}

/// What a deck deletion removed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeckDeletion {
    pub deck: Option<Deck>,
    pub associations_removed: usize,
    /// Ids of flashcards deleted because this deck was their last one.
    pub orphans_removed: Vec<String>,
}

pub(crate) mod timestamp {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Fractional(f64),
        Text(String),
    }

    fn convert<E: Error>(raw: Raw) -> Result<DateTime<Utc>, E> {
        match raw {
            Raw::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| E::custom(format!("timestamp out of range: {ms}"))),
            Raw::Fractional(ms) => convert(Raw::Millis(ms as i64)),
            Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| E::custom(format!("invalid timestamp `{text}`: {e}"))),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        convert(Raw::deserialize(d)?)
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<Raw>::deserialize(d)? {
            Some(raw) => convert(raw).map(Some),
            None => Ok(None),
        }
    }

    pub fn epoch() -> DateTime<Utc> {
        DateTime::UNIX_EPOCH
    }
}
