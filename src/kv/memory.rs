use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::KeyValueStore;

/// Simple in-memory key-value store.
///
/// Clones share the same map, which lets a test hand one handle to the stores and keep another
/// for inspecting or corrupting raw values.
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store, e.g. with a legacy schema for migration tests.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { data: Arc::new(Mutex::new(data)) }
    }

    /// Read a raw value without going through the async interface.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.guard().get(key).cloned()
    }

    /// Overwrite a raw value without going through the async interface.
    pub fn put_raw(&self, key: &str, value: &str) {
        self.guard().insert(key.to_string(), value.to_string());
    }

    /// Sorted list of keys currently present.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.guard().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    type Error = std::convert::Infallible;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.guard().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.guard().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.guard().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        // removing twice is fine
        store.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = InMemoryStore::with_entries([("a", "1")]);
        let other = store.clone();
        other.set("b", "2").await.unwrap();
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.raw("b").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn arc_store_delegates() {
        let store = Arc::new(InMemoryStore::new());
        store.set("k", "v").await.unwrap();
        assert_eq!(KeyValueStore::get(&store, "k").await.unwrap().as_deref(), Some("v"));
    }
}
