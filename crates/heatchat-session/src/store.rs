//! Durable key-value storage for the signed-in session.
//!
//! The session manager persists exactly two entries (user and token).
//! They must never get out of step, so besides single-key `get`/`set`
//! the [`SessionStore`] trait has multi-key `set_entries` and
//! `remove_entries` that apply all keys or none.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use heatchat_protocol::{Codec, JsonCodec};

use crate::StoreError;

/// A string key-value store that survives restarts.
pub trait SessionStore: Send + Sync + 'static {
    /// Returns the value stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Stores every `(key, value)` pair, or none of them.
    fn set_entries(
        &self,
        entries: &[(&str, String)],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes every key, or none of them. Missing keys are not an error.
    fn remove_entries(&self, keys: &[&str]) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Stores a single value.
    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move { self.set_entries(&[(key, value)]).await }
    }

    /// Removes a single key.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move { self.remove_entries(&[key]).await }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// An in-process [`SessionStore`].
///
/// Nothing survives a restart. Useful in tests, and for embedders that
/// copy [`entries`](Self::entries) into their own persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-filled with `entries`.
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Returns a copy of everything currently stored.
    pub fn entries(&self) -> HashMap<String, String> {
        self.lock().clone()
    }

    // The map is always left consistent, so a poisoned lock is still usable.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set_entries(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut map = self.lock();
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    async fn remove_entries(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut map = self.lock();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// A [`SessionStore`] backed by a single JSON file.
///
/// The file holds one JSON object of string values:
///
/// ```json
/// { "@heatchat:token": "\"tok\"", "@heatchat:user": "{\"id\":\"1\",...}" }
/// ```
///
/// Every change rewrites the whole file: the new contents go to a sibling
/// `.tmp` file which is then renamed over the old one, so readers see the
/// old map or the new map and never a mix. On Unix the file is created
/// with `0600` permissions since it holds a bearer token.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    codec: JsonCodec,
    // Serializes read-modify-write cycles within this process.
    lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Uses `path` as the backing file. Nothing is touched until the
    /// first write; a missing file reads as empty.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            codec: JsonCodec,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        self.codec
            .decode(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display())))
    }

    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let contents = self.codec.encode(map)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_private(&path, &contents))
            .await
            .map_err(io::Error::other)??;
        tracing::debug!(path = %self.path.display(), keys = map.len(), "session file written");
        Ok(())
    }

    /// Applies `change` to the stored map under the store lock.
    async fn update(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        change(&mut map);
        self.write_map(&map).await
    }
}

impl SessionStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.remove(key))
    }

    async fn set_entries(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert((*key).to_string(), value.clone());
            }
        })
        .await
    }

    async fn remove_entries(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.update(|map| {
            for key in keys {
                map.remove(*key);
            }
        })
        .await
    }
}

/// Writes `contents` to `path` via a temp file + rename, owner-only on Unix.
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp_path, path)
}
