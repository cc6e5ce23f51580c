#![allow(dead_code)]

use async_trait::async_trait;
use flashdeck::kv::{InMemoryStore, KeyValueStore};
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// `InMemoryStore` that fails chosen operations on chosen keys.
#[derive(Clone, Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    failing: Arc<Mutex<HashSet<(Op, String)>>>,
    sets: Arc<AtomicUsize>,
    fail_set_at: Arc<Mutex<Option<usize>>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Set,
    Remove,
}

impl FlakyStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self { inner, ..Self::default() }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    pub fn fail(&self, op: Op, key: &str) {
        self.failing.lock().unwrap().insert((op, key.to_string()));
    }

    /// Fail the `n`th `set` from now (1-based), whatever its key.
    pub fn fail_nth_set(&self, n: usize) {
        *self.fail_set_at.lock().unwrap() = Some(self.sets.load(Ordering::SeqCst) + n);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
        *self.fail_set_at.lock().unwrap() = None;
    }

    fn check(&self, op: Op, key: &str) -> io::Result<()> {
        if self.failing.lock().unwrap().contains(&(op, key.to_string())) {
            return Err(io::Error::new(io::ErrorKind::Other, format!("injected {op:?} failure on {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    type Error = io::Error;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        self.check(Op::Get, key)?;
        Ok(self.inner.raw(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        let nth = self.sets.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_set_at.lock().unwrap() == Some(nth) {
            return Err(io::Error::new(io::ErrorKind::Other, format!("injected failure on set #{nth} ({key})")));
        }
        self.check(Op::Set, key)?;
        self.inner.put_raw(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.check(Op::Remove, key)?;
        self.inner.remove(key).await.map_err(|never| match never {})
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
