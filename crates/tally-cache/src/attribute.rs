//! Cached reads of derived wallet attributes.
//!
//! [`AttributeCache`] never talks to the wallet service itself. Each read
//! takes a producer closure that performs the remote fetch; the cache only
//! decides whether that producer runs, using the attribute's
//! [`CachePolicy`].
//!
//! # Concurrent misses
//!
//! By default two callers that miss the same key at the same moment both run
//! their producer and both store the result. Producers for derived
//! attributes are pure reads of remote state, so both store equivalent
//! values. [`AttributeCache::with_single_flight`] adds a per-key mutex around
//! the miss-then-populate step so only the first caller produces and the
//! rest read its stored value.
//!
//! The per-key mutexes live in a process-wide registry keyed by backend and
//! cache key, so every single-flight cache over the same backend contends on
//! the same lock however it was constructed. An entry is dropped from the
//! registry as soon as no caller holds it.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tally_core::constants::DEFAULT_CACHE_NAMESPACE;
use tally_core::error::{CacheError, WalletError};
use tally_core::traits::CacheBackend;
use tally_core::types::{CacheKey, CachePolicy, DerivedAttribute, WalletId};
use tracing::debug;

/// Identity of a backend: the address of its shared allocation.
type BackendId = usize;

/// Locks held by callers currently populating a key.
static IN_FLIGHT: LazyLock<DashMap<(BackendId, CacheKey), Arc<Mutex<()>>>> =
    LazyLock::new(DashMap::new);

/// Policy-driven cache for derived wallet attributes.
///
/// Holds no wallet state: the wallet id is passed on every call. Clones
/// share the backend.
#[derive(Clone)]
pub struct AttributeCache {
    backend: Arc<dyn CacheBackend>,
    namespace: String,
    single_flight: bool,
}

impl AttributeCache {
    /// Create a cache over `backend` with the default namespace.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            single_flight: false,
        }
    }

    /// Override the key namespace (default: [`DEFAULT_CACHE_NAMESPACE`]).
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Serialise concurrent misses on the same key with every other
    /// single-flight cache over the same backend.
    pub fn with_single_flight(mut self) -> Self {
        self.single_flight = true;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_single_flight(&self) -> bool {
        self.single_flight
    }

    fn backend_id(&self) -> BackendId {
        Arc::as_ptr(&self.backend) as *const () as BackendId
    }

    /// Cache key for `attribute` of `wallet_id`.
    pub fn key_for(
        &self,
        wallet_id: &WalletId,
        attribute: DerivedAttribute,
    ) -> Result<CacheKey, WalletError> {
        CacheKey::derive(&self.namespace, wallet_id, attribute)
    }

    /// Read `attribute` according to its own policy.
    pub fn read<T, F>(
        &self,
        wallet_id: &WalletId,
        attribute: DerivedAttribute,
        producer: F,
    ) -> Result<T, WalletError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, WalletError>,
    {
        match attribute.policy() {
            CachePolicy::Forever => self.read_forever(wallet_id, attribute, producer),
            CachePolicy::Ttl(ttl) => self.read_with_ttl(wallet_id, attribute, ttl, producer),
            CachePolicy::Live => {
                // Live reads still require a usable id.
                self.key_for(wallet_id, attribute)?;
                producer()
            }
        }
    }

    /// Return the stored value, or produce and store it until invalidated.
    pub fn read_forever<T, F>(
        &self,
        wallet_id: &WalletId,
        attribute: DerivedAttribute,
        producer: F,
    ) -> Result<T, WalletError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, WalletError>,
    {
        self.remember(wallet_id, attribute, None, producer)
    }

    /// Return the stored value, or produce and store it for `ttl`.
    pub fn read_with_ttl<T, F>(
        &self,
        wallet_id: &WalletId,
        attribute: DerivedAttribute,
        ttl: Duration,
        producer: F,
    ) -> Result<T, WalletError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, WalletError>,
    {
        self.remember(wallet_id, attribute, Some(ttl), producer)
    }

    /// Forget the stored value of `attribute`. No effect when nothing is stored.
    pub fn invalidate(
        &self,
        wallet_id: &WalletId,
        attribute: DerivedAttribute,
    ) -> Result<(), WalletError> {
        let key = self.key_for(wallet_id, attribute)?;
        self.backend.forget(&key)?;
        debug!(%key, "attribute cache: invalidated");
        Ok(())
    }

    fn remember<T, F>(
        &self,
        wallet_id: &WalletId,
        attribute: DerivedAttribute,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<T, WalletError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, WalletError>,
    {
        let key = self.key_for(wallet_id, attribute)?;
        if !self.single_flight {
            return self.populate(&key, ttl, producer);
        }

        let slot = (self.backend_id(), key);
        let lock = IN_FLIGHT.entry(slot.clone()).or_default().value().clone();
        let result = {
            let _guard = lock.lock();
            self.populate(&slot.1, ttl, producer)
        };
        drop(lock);
        // The map's own reference is the last one: nobody is waiting.
        IN_FLIGHT.remove_if(&slot, |_, l| Arc::strong_count(l) == 1);
        result
    }

    fn populate<T, F>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<T, WalletError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, WalletError>,
    {
        let mut producer = Some(producer);
        let mut missed = false;
        let mut produce = || -> Result<Value, WalletError> {
            let f = producer.take().ok_or_else(|| {
                CacheError::Backend("producer invoked more than once".into())
            })?;
            missed = true;
            Ok(serde_json::to_value(f()?)?)
        };

        let raw = match ttl {
            Some(ttl) => self.backend.remember_for(key, ttl, &mut produce)?,
            None => self.backend.remember_forever(key, &mut produce)?,
        };
        debug!(%key, hit = !missed, "attribute cache: read");

        serde_json::from_value(raw).map_err(|e| {
            WalletError::Serialization(format!("cached value at {key} has unexpected shape: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryCache;
    use serde_json::json;
    use std::cell::Cell;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tally_core::error::RemoteError;

    fn cache() -> (AttributeCache, Arc<MemoryCache>, ManualClock) {
        let clock = ManualClock::new();
        let backend = Arc::new(MemoryCache::with_clock(Arc::new(clock.clone())));
        (AttributeCache::new(backend.clone()), backend, clock)
    }

    fn wallet() -> WalletId {
        WalletId::new("hot-1")
    }

    #[test]
    fn key_for_uses_namespace() {
        let (cache, _, _) = cache();
        let key = cache.key_for(&wallet(), DerivedAttribute::Address).unwrap();
        assert_eq!(key.as_str(), "tally:hot-1:address");

        let cache = cache.with_namespace("shop");
        let key = cache
            .key_for(&wallet(), DerivedAttribute::ConfirmedSatoshi)
            .unwrap();
        assert_eq!(key.as_str(), "shop:hot-1:confirmed_satoshi");
    }

    #[test]
    fn empty_id_rejected_before_producer() {
        let (cache, backend, _) = cache();
        let called = Cell::new(false);
        let err = cache
            .read_forever(&WalletId::new(""), DerivedAttribute::Address, || {
                called.set(true);
                Ok("addr".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidWalletState(_)));
        assert!(!called.get());
        assert!(backend.is_empty());
    }

    #[test]
    fn read_forever_is_idempotent() {
        let (cache, _, clock) = cache();
        let calls = Cell::new(0);
        let produce = || {
            calls.set(calls.get() + 1);
            Ok(format!("addr-{}", calls.get()))
        };

        let a: String = cache.read_forever(&wallet(), DerivedAttribute::Address, produce).unwrap();
        clock.advance(Duration::from_secs(86_400));
        let b: String = cache.read_forever(&wallet(), DerivedAttribute::Address, produce).unwrap();
        assert_eq!(a, "addr-1");
        assert_eq!(b, "addr-1");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn invalidate_forces_fresh_read() {
        let (cache, _, _) = cache();
        let calls = Cell::new(0);
        let produce = || {
            calls.set(calls.get() + 1);
            Ok(format!("addr-{}", calls.get()))
        };

        let _: String = cache.read_forever(&wallet(), DerivedAttribute::Address, produce).unwrap();
        cache.invalidate(&wallet(), DerivedAttribute::Address).unwrap();
        let again: String =
            cache.read_forever(&wallet(), DerivedAttribute::Address, produce).unwrap();
        assert_eq!(again, "addr-2");
        assert_eq!(calls.get(), 2);

        // Invalidating twice is harmless.
        cache.invalidate(&wallet(), DerivedAttribute::Address).unwrap();
        cache.invalidate(&wallet(), DerivedAttribute::Address).unwrap();
    }

    #[test]
    fn ttl_read_expires() {
        let (cache, _, clock) = cache();
        let calls = Cell::new(0u64);
        let produce = || {
            calls.set(calls.get() + 1);
            Ok(calls.get() * 1000)
        };
        let ttl = Duration::from_secs(120);
        let attr = DerivedAttribute::ConfirmedSatoshi;

        assert_eq!(cache.read_with_ttl(&wallet(), attr, ttl, produce).unwrap(), 1000);
        clock.advance(Duration::from_secs(119));
        assert_eq!(cache.read_with_ttl(&wallet(), attr, ttl, produce).unwrap(), 1000);
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.read_with_ttl(&wallet(), attr, ttl, produce).unwrap(), 2000);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn live_policy_bypasses_backend() {
        let (cache, backend, _) = cache();
        let calls = Cell::new(0);
        for _ in 0..3 {
            let coins: Vec<u64> = cache
                .read(&wallet(), DerivedAttribute::Coins, || {
                    calls.set(calls.get() + 1);
                    Ok(vec![1, 2])
                })
                .unwrap();
            assert_eq!(coins, vec![1, 2]);
        }
        assert_eq!(calls.get(), 3);
        assert!(backend.is_empty());
    }

    #[test]
    fn read_dispatches_on_policy() {
        let (cache, backend, _) = cache();
        let _: String = cache
            .read(&wallet(), DerivedAttribute::Address, || Ok("a".to_string()))
            .unwrap();
        let _: u64 = cache
            .read(&wallet(), DerivedAttribute::ConfirmedSatoshi, || Ok(7))
            .unwrap();
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn producer_error_is_not_cached() {
        let (cache, backend, _) = cache();
        let err = cache
            .read_forever::<String, _>(&wallet(), DerivedAttribute::Address, || {
                Err(RemoteError::Transport("connection refused".into()).into())
            })
            .unwrap_err();
        assert_eq!(
            err,
            WalletError::Remote(RemoteError::Transport("connection refused".into()))
        );
        assert!(backend.is_empty());
    }

    #[test]
    fn mismatched_cached_shape_is_an_error() {
        let (cache, backend, _) = cache();
        let key = cache.key_for(&wallet(), DerivedAttribute::ConfirmedSatoshi).unwrap();
        backend.put(&key, json!("not a number"), None).unwrap();
        let err = cache
            .read_with_ttl::<u64, _>(
                &wallet(),
                DerivedAttribute::ConfirmedSatoshi,
                Duration::from_secs(1),
                || Ok(1),
            )
            .unwrap_err();
        assert!(matches!(err, WalletError::Serialization(_)));
    }

    #[test]
    fn single_flight_is_kept_by_clones() {
        let (cache, _, _) = cache();
        assert!(!cache.is_single_flight());
        let cache = cache.with_single_flight();
        assert!(cache.clone().is_single_flight());
    }

    #[test]
    fn separately_built_caches_share_locks_per_backend() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
        let a = AttributeCache::new(backend.clone()).with_single_flight();
        let b = AttributeCache::new(backend).with_single_flight();
        let other = AttributeCache::new(Arc::new(MemoryCache::new())).with_single_flight();
        assert_eq!(a.backend_id(), b.backend_id());
        assert_ne!(a.backend_id(), other.backend_id());
    }

    #[test]
    fn concurrent_misses_across_caches_produce_once() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                // A fresh cache per thread, as separate facades would build.
                let cache = AttributeCache::new(backend.clone()).with_single_flight();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .read_forever(&WalletId::new("race"), DerivedAttribute::Address, || {
                            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                            thread::sleep(Duration::from_millis(20));
                            Ok(format!("addr-{n}"))
                        })
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|r| r == "addr-1"), "{results:?}");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lock_entries_released_after_populate() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
        let cache = AttributeCache::new(backend).with_single_flight();
        let id = WalletId::new("released");
        let _: String = cache
            .read_forever(&id, DerivedAttribute::Address, || Ok("a".to_string()))
            .unwrap();
        let _ = cache.read_forever::<String, _>(&id, DerivedAttribute::Address, || {
            Err(WalletError::ValueOverflow)
        });
        let key = cache.key_for(&id, DerivedAttribute::Address).unwrap();
        assert!(!IN_FLIGHT.contains_key(&(cache.backend_id(), key)));
    }
}
