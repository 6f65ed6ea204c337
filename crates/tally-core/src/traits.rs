//! Trait interfaces for the collaborators of the wallet facade.
//!
//! - [`WalletService`]: remote wallet HTTP API (tally-client implements)
//! - [`CacheBackend`]: key/value store with expiry (tally-cache implements)
//! - [`Clock`]: time source for expiry decisions

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::WalletError;
use crate::types::{CacheKey, Coin, ReceiveAddress, RemoteTransaction, WalletSummary};

/// Read and write access to wallets held by a remote wallet service.
///
/// Every call is scoped by the wallet id and blocks until the service
/// answers. Implementations own timeouts and transport concerns; failures
/// are reported as [`WalletError::Remote`].
pub trait WalletService: Send + Sync {
    /// Wallet summary. Opaque to the facade.
    fn wallet(&self, id: &str) -> Result<WalletSummary, WalletError>;

    /// A single wallet transaction by hash.
    fn transaction(&self, id: &str, hash: &str) -> Result<RemoteTransaction, WalletError>;

    /// Transaction history, in service order.
    fn history(&self, id: &str) -> Result<Vec<RemoteTransaction>, WalletError>;

    /// Unconfirmed transactions, in service order.
    fn pending(&self, id: &str) -> Result<Vec<RemoteTransaction>, WalletError>;

    /// Unspent coins, in service order.
    fn coins(&self, id: &str) -> Result<Vec<Coin>, WalletError>;

    /// Derive the current nested receive address for `account`.
    fn nested_address(&self, id: &str, account: &str) -> Result<ReceiveAddress, WalletError>;

    /// Submit an outgoing transaction payload. Returns the raw transaction record.
    fn send(&self, id: &str, payload: &Value) -> Result<Value, WalletError>;
}

/// Producer invoked by a cache backend on a miss.
pub type Producer<'a> = &'a mut dyn FnMut() -> Result<Value, WalletError>;

/// Shared key/value store for derived wallet attributes.
///
/// Backends must be safe to call concurrently. They are not required to
/// deduplicate producers: two callers missing the same key at the same time
/// may both run their producer, and the later `put` wins.
pub trait CacheBackend: Send + Sync {
    /// Look up a live entry. Expired entries are reported as absent.
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, WalletError>;

    /// Store `value`, expiring after `ttl` or never when `ttl` is `None`.
    fn put(&self, key: &CacheKey, value: Value, ttl: Option<Duration>) -> Result<(), WalletError>;

    /// Remove an entry. Removing an absent key is not an error.
    fn forget(&self, key: &CacheKey) -> Result<(), WalletError>;

    /// Return the live entry for `key`, or run `producer`, store its result
    /// for `ttl` and return it. Producer errors are returned unchanged and
    /// nothing is stored.
    fn remember_for(
        &self,
        key: &CacheKey,
        ttl: Duration,
        producer: Producer<'_>,
    ) -> Result<Value, WalletError> {
        if let Some(hit) = self.get(key)? {
            return Ok(hit);
        }
        let value = producer()?;
        self.put(key, value.clone(), Some(ttl))?;
        Ok(value)
    }

    /// Like [`remember_for`](Self::remember_for) without expiry.
    fn remember_forever(
        &self,
        key: &CacheKey,
        producer: Producer<'_>,
    ) -> Result<Value, WalletError> {
        if let Some(hit) = self.get(key)? {
            return Ok(hit);
        }
        let value = producer()?;
        self.put(key, value.clone(), None)?;
        Ok(value)
    }
}

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
