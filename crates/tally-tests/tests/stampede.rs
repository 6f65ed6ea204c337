//! Concurrent cold reads of the same attribute.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tally_core::traits::CacheBackend;
use tally_tests::helpers::*;
use tally_wallet::{Wallet, WalletConfig};

const THREADS: usize = 8;

/// Run `read` on `THREADS` threads released together, collecting results.
fn race<T, F>(read: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    let read = Arc::new(read);
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let read = read.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                read()
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

fn slow_service() -> FakeService {
    FakeService::new()
        .with_latency(Duration::from_millis(20))
        .with_coins(vec![coin("h1", 1000), coin("h2", 2000)])
        .with_confirmations("h1", 6)
        .with_confirmations("h2", 1)
}

#[test]
fn unguarded_balance_reads_agree() {
    let h = Arc::new(Harness::new(slow_service()));
    let reader = h.clone();
    let results = race(move || reader.wallet("w1").confirmed_satoshi().unwrap());

    assert!(results.iter().all(|v| *v == 1000));
    // Without single-flight several threads may compute, but at least one did
    // and no more than one per thread.
    let coins_calls = h.service.calls("coins");
    assert!((1..=THREADS).contains(&coins_calls), "{coins_calls}");

    // Once populated, later reads are served from the cache.
    h.wallet("w1").confirmed_satoshi().unwrap();
    assert_eq!(h.service.calls("coins"), coins_calls);
}

#[test]
fn single_flight_derives_one_address() {
    let h = Harness::new(slow_service());
    let cache = h.cache().with_single_flight();
    let service = h.service.clone();
    let results = race(move || {
        Wallet::new("w1", service.clone(), cache.clone())
            .address()
            .unwrap()
    });

    assert!(results.iter().all(|a| a == &results[0]), "{results:?}");
    assert_eq!(h.service.calls("nested_address"), 1);
}

#[test]
fn single_flight_balance_computed_once() {
    let h = Harness::new(slow_service());
    let cache = h.cache().with_single_flight();
    let service = h.service.clone();
    let results = race(move || {
        Wallet::new("w1", service.clone(), cache.clone())
            .confirmed_satoshi()
            .unwrap()
    });

    assert!(results.iter().all(|v| *v == 1000));
    assert_eq!(h.service.calls("coins"), 1);
    // One lookup per distinct transaction.
    assert_eq!(h.service.calls("transaction"), 2);
}

#[test]
fn facades_from_config_share_single_flight() {
    let h = Harness::new(slow_service());
    let backend: Arc<dyn CacheBackend> = h.backend.clone();
    let service = h.service.clone();
    let results = race(move || {
        // Each thread wires its own facade, as independent callers would.
        Wallet::from_config("w1", &WalletConfig::default(), service.clone(), backend.clone())
            .address()
            .unwrap()
    });

    assert!(results.iter().all(|a| a == &results[0]), "{results:?}");
    assert_eq!(h.service.calls("nested_address"), 1);
}

#[test]
fn unguarded_address_reads_may_diverge() {
    let h = Arc::new(Harness::new(slow_service()));
    let reader = h.clone();
    let results = race(move || reader.wallet("w1").address().unwrap());

    // Every racing caller that missed derived its own address.
    let derived = h.service.calls("nested_address");
    assert!((1..=THREADS).contains(&derived), "{derived}");
    // The last store wins and is served from then on.
    let settled = h.wallet("w1").address().unwrap();
    assert!(results.contains(&settled), "{settled} not in {results:?}");
    assert_eq!(h.service.calls("nested_address"), derived);
}

#[test]
fn single_flight_does_not_serialise_other_wallets() {
    let h = Harness::new(slow_service());
    let cache = h.cache().with_single_flight();
    let service = h.service.clone();
    let next = Arc::new(AtomicUsize::new(0));
    let results = race(move || {
        let id = if next.fetch_add(1, Ordering::SeqCst) % 2 == 0 { "w1" } else { "w2" };
        let address = Wallet::new(id, service.clone(), cache.clone()).address().unwrap();
        (id, address)
    });

    for id in ["w1", "w2"] {
        let addresses: Vec<&String> =
            results.iter().filter(|(w, _)| *w == id).map(|(_, a)| a).collect();
        assert_eq!(addresses.len(), THREADS / 2);
        assert!(addresses.iter().all(|a| *a == addresses[0]), "{id}: {addresses:?}");
    }
    let w1 = &results.iter().find(|(w, _)| *w == "w1").unwrap().1;
    let w2 = &results.iter().find(|(w, _)| *w == "w2").unwrap().1;
    assert_ne!(w1, w2);
    // One derivation per wallet.
    assert_eq!(h.service.calls("nested_address"), 2);
}
