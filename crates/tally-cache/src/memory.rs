//! In-process cache backend.
//!
//! Entries live in a [`DashMap`] keyed by the cache key string. Each entry
//! carries an optional expiry instant taken from the injected [`Clock`].
//! Expired entries are invisible to readers and are dropped lazily on the
//! next `get`, or eagerly by [`MemoryCache::purge_expired`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tally_core::error::WalletError;
use tally_core::traits::{CacheBackend, Clock, SystemClock};
use tally_core::types::CacheKey;
use tracing::trace;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Thread-safe [`CacheBackend`] held in process memory.
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    /// Create an empty cache on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before - self.entries.len()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, WalletError> {
        let now = self.clock.now();
        match self.entries.get(key.as_str()) {
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        // Only drop the entry if it is still the expired one.
        self.entries.remove_if(key.as_str(), |_, e| !e.is_live(now));
        trace!(%key, "memory cache: expired entry dropped");
        Ok(None)
    }

    fn put(&self, key: &CacheKey, value: Value, ttl: Option<Duration>) -> Result<(), WalletError> {
        // A TTL past the clock's range never expires.
        let expires_at = ttl.and_then(|ttl| self.clock.now().checked_add(ttl));
        self.entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    fn forget(&self, key: &CacheKey) -> Result<(), WalletError> {
        self.entries.remove(key.as_str());
        Ok(())
    }
}
