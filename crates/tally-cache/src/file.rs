//! Cache backend persisted to a JSON file.
//!
//! Used by short-lived processes (the CLI) so attributes cached forever,
//! such as the receive address, survive between runs. Expiry is recorded as
//! wall-clock time. The whole file is rewritten through a temporary file on
//! every change; concurrent processes sharing one file overwrite each
//! other's changes (last writer wins).

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_core::error::{CacheError, WalletError};
use tally_core::traits::CacheBackend;
use tally_core::types::CacheKey;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: Value,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// [`CacheBackend`] backed by a JSON file on disk.
pub struct FileCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl FileCache {
    /// Open the cache at `path`. A missing file is an empty cache; an
    /// unreadable one is discarded with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WalletError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), "discarding unreadable cache file: {e}");
                HashMap::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(CacheError::Backend(format!(
                    "cannot read cache file {}: {e}",
                    path.display()
                ))
                .into());
            }
        };
        debug!(path = %path.display(), entries = entries.len(), "file cache opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the live entries to disk.
    fn flush(&self, entries: &mut HashMap<String, StoredEntry>) -> Result<(), WalletError> {
        let now = Utc::now();
        entries.retain(|_, e| e.is_live(now));

        let io_err = |e: std::io::Error| {
            CacheError::Backend(format!("cannot write cache file {}: {e}", self.path.display()))
        };
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&*entries)?).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl CacheBackend for FileCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, WalletError> {
        let now = Utc::now();
        Ok(self
            .entries
            .lock()
            .get(key.as_str())
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    fn put(&self, key: &CacheKey, value: Value, ttl: Option<Duration>) -> Result<(), WalletError> {
        // A TTL past chrono's range never expires.
        let expires_at = ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d))
        });
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), StoredEntry { value, expires_at });
        self.flush(&mut entries)
    }

    fn forget(&self, key: &CacheKey) -> Result<(), WalletError> {
        let mut entries = self.entries.lock();
        if entries.remove(key.as_str()).is_some() {
            self.flush(&mut entries)?;
        }
        Ok(())
    }
}
