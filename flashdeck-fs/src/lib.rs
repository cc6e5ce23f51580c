//! Directory-backed [`KeyValueStore`] for `flashdeck`. One file per key.
//! Writes go to a temporary sibling first and are renamed into place.

use async_trait::async_trait;
use flashdeck::kv::KeyValueStore;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const TMP_SUFFIX: &str = ".tmp";

#[derive(Clone, Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Store rooted at `root`. The directory is created on first write.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("key {key:?} is not a valid file name"),
            ));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl KeyValueStore for FsStore {
    type Error = io::Error;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        match tokio::fs::read_to_string(self.path_for(key)?).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(TMP_SUFFIX);
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, bytes = value.len(), "value written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Self::Error> {
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
