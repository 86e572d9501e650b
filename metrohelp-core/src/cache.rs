//! Last-known-good storage for normalized provider data and settings.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of data stored under a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    /// Daily menus, one entry per site.
    Menus,
    /// Transit departures, one entry per site.
    Routes,
    /// Weather, one entry per site.
    Weather,
    /// Announcement feed, shared by all sites.
    Announcements,
    /// Persisted [`Selection`](crate::model::Selection).
    Settings,
}

impl Domain {
    fn slug(self) -> &'static str {
        match self {
            Domain::Menus => "menus",
            Domain::Routes => "routes",
            Domain::Weather => "weather",
            Domain::Announcements => "announcements",
            Domain::Settings => "settings",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Stored payload together with the key it was written under.
pub struct CacheEntry {
    /// Data domain.
    pub domain: Domain,
    /// Site the payload belongs to, if the domain is per site.
    pub site_key: Option<String>,
    /// Serialized payload.
    pub payload: Value,
    /// Write time as Unix milliseconds.
    pub written_at_epoch_millis: i64,
}

#[derive(thiserror::Error, Debug)]
/// Errors raised by cache storage.
pub enum CacheError {
    /// Backend could not read or write.
    #[error("Cache I/O error: {0}")]
    Io(#[from] io::Error),
    /// Payload could not be serialized.
    #[error("Cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Stored data does not match the expected shape.
    #[error("Cache integrity fault: {0}")]
    Integrity(String),
}

/// Raw byte storage behind [`PersistentCache`].
///
/// `store` must replace the value atomically: a concurrent `load` sees either
/// the previous bytes or the new ones.
pub trait CacheBackend: Send + Sync {
    /// Read the bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] when the backend cannot be read.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Replace the bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] when the backend cannot be written.
    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError>;

    /// Delete `key`; deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] when the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process backend, lost on restart.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory.
pub struct FileBackend {
    dir: PathBuf,
    write_seq: AtomicU64,
}

impl FileBackend {
    /// Use `dir` for storage, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError::Io`] when the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_seq: AtomicU64::new(0),
        })
    }

    /// Storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Percent-encoded so distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl CacheBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let target = self.path_for(key);
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let staging = target.with_extension(format!("json.{}.{seq}.tmp", process::id()));
        fs::write(&staging, bytes)?;
        if let Err(err) = fs::rename(&staging, &target) {
            let _cleanup: io::Result<()> = fs::remove_file(&staging);
            return Err(err.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// Typed cache keyed by `(domain, site)`.
///
/// Every write replaces the whole entry. Entries that fail validation on read
/// are logged as integrity faults and reported as absent.
#[derive(Clone)]
pub struct PersistentCache {
    backend: Arc<dyn CacheBackend>,
}

impl PersistentCache {
    /// Wrap a storage backend.
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Cache backed by [`MemoryBackend`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Read the entry stored for `(domain, site_key)`.
    #[must_use]
    pub fn get(&self, domain: Domain, site_key: Option<&str>) -> Option<CacheEntry> {
        match self.read_entry(domain, site_key) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(%domain, site = ?site_key, error = %err, "Ignoring cache entry");
                None
            }
        }
    }

    /// Read and decode the payload stored for `(domain, site_key)`.
    #[must_use]
    pub fn get_payload<T: DeserializeOwned>(
        &self,
        domain: Domain,
        site_key: Option<&str>,
    ) -> Option<T> {
        let entry = self.get(domain, site_key)?;
        match serde_json::from_value(entry.payload) {
            Ok(payload) => Some(payload),
            Err(err) => {
                let fault = CacheError::Integrity(err.to_string());
                tracing::warn!(%domain, site = ?site_key, error = %fault, "Ignoring cache entry");
                None
            }
        }
    }

    /// Replace the entry for `(domain, site_key)` with `payload`.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] when serialization or the backend write fails.
    pub fn put<T: Serialize>(
        &self,
        domain: Domain,
        site_key: Option<&str>,
        payload: &T,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            domain,
            site_key: site_key.map(str::to_owned),
            payload: serde_json::to_value(payload)?,
            written_at_epoch_millis: Utc::now().timestamp_millis(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.backend.store(&storage_key(domain, site_key), &bytes)
    }

    /// Remove the entry for `(domain, site_key)`.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] when the backend write fails.
    pub fn clear(&self, domain: Domain, site_key: Option<&str>) -> Result<(), CacheError> {
        self.backend.remove(&storage_key(domain, site_key))
    }

    fn read_entry(
        &self,
        domain: Domain,
        site_key: Option<&str>,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let Some(bytes) = self.backend.load(&storage_key(domain, site_key))? else {
            return Ok(None);
        };
        let entry: CacheEntry = serde_json::from_slice(&bytes)
            .map_err(|err| CacheError::Integrity(err.to_string()))?;
        if entry.domain != domain || entry.site_key.as_deref() != site_key {
            return Err(CacheError::Integrity(format!(
                "entry belongs to {}/{:?}",
                entry.domain, entry.site_key
            )));
        }
        Ok(Some(entry))
    }
}

fn storage_key(domain: Domain, site_key: Option<&str>) -> String {
    match site_key {
        Some(site) => format!("{domain}.{site}"),
        None => domain.to_string(),
    }
}
