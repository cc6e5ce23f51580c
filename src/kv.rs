//! Key-value collaborator.
//!
//! Every record family is serialized as one JSON document under a fixed logical key, so the
//! whole layer only needs `get`/`set`/`remove` from the platform. There is no partial update
//! and no transaction: callers read, modify and write back entire collections.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::error::StoreError;

pub mod memory;

pub use memory::InMemoryStore;

/// Fixed logical keys.
pub mod keys {
    /// Flashcard collection.
    pub const FLASHCARDS: &str = "flashcards";
    /// Deck collection.
    pub const DECKS: &str = "decks";
    /// Flashcard/deck join table.
    pub const ASSOCIATIONS: &str = "flashcard_deck_associations";
    /// Schema version token.
    pub const STORAGE_VERSION: &str = "storage_version";
    /// Rate limiter ledger.
    pub const RATE_LIMIT: &str = "rate_limit_data";
    /// One-time first-run seed flag.
    pub const SEEDED: &str = "sample_data_seeded";
    /// Flashcard snapshot taken before a migration mutates anything.
    pub const FLASHCARDS_BACKUP: &str = "flashcards_backup";
}

/// Abstract async key-value storage (e.g. platform preferences, a file directory, a test map).
///
/// Implementations only move strings around; serialization lives above this trait.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Delete `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), Self::Error>;
}

#[async_trait]
impl<T> KeyValueStore for Arc<T>
where
    T: KeyValueStore + ?Sized,
{
    type Error = T::Error;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), Self::Error> {
        (**self).remove(key).await
    }
}

pub(crate) async fn get_raw<S>(store: &S, key: &str) -> Result<Option<String>, StoreError>
where
    S: KeyValueStore + ?Sized,
{
    store.get(key).await.map_err(|e| StoreError::backend("get", key, e))
}

pub(crate) async fn set_raw<S>(store: &S, key: &str, value: &str) -> Result<(), StoreError>
where
    S: KeyValueStore + ?Sized,
{
    store.set(key, value).await.map_err(|e| StoreError::backend("set", key, e))
}

pub(crate) async fn remove_key<S>(store: &S, key: &str) -> Result<(), StoreError>
where
    S: KeyValueStore + ?Sized,
{
    store.remove(key).await.map_err(|e| StoreError::backend("remove", key, e))
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Serde { key: key.to_string(), source })
}

pub(crate) fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Serde { key: key.to_string(), source })
}

pub(crate) async fn put_json<S, T>(store: &S, key: &str, value: &T) -> Result<(), StoreError>
where
    S: KeyValueStore + ?Sized,
    T: Serialize + ?Sized,
{
    let raw = encode(key, value)?;
    set_raw(store, key, &raw).await
}
