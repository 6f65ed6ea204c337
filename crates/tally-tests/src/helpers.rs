//! Shared test helpers: an in-memory wallet service and wallet constructors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tally_cache::{AttributeCache, ManualClock, MemoryCache};
use tally_core::error::{RemoteError, WalletError};
use tally_core::traits::WalletService;
use tally_core::types::{Coin, ReceiveAddress, RemoteTransaction, WalletSummary};
use tally_wallet::Wallet;

/// A coin with only the required fields set.
pub fn coin(hash: &str, value: u64) -> Coin {
    serde_json::from_value(json!({ "hash": hash, "value": value })).unwrap()
}

/// A transaction with only the required fields set.
pub fn tx(hash: &str, confirmations: u64) -> RemoteTransaction {
    serde_json::from_value(json!({ "hash": hash, "confirmations": confirmations })).unwrap()
}

#[derive(Default)]
struct State {
    coins: Vec<Coin>,
    confirmations: HashMap<String, u64>,
    history: Vec<RemoteTransaction>,
    pending: Vec<RemoteTransaction>,
    addresses_derived: u64,
    sent: Vec<Value>,
    failure: Option<RemoteError>,
}

/// In-memory [`WalletService`] that counts calls per method.
///
/// Every call to `nested_address` derives a new address (`addr-1`,
/// `addr-2`, ...), like a real service handing out fresh receive addresses.
#[derive(Default)]
pub struct FakeService {
    state: Mutex<State>,
    calls: Mutex<HashMap<&'static str, usize>>,
    latency: Option<Duration>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_coins(self, coins: Vec<Coin>) -> Self {
        self.set_coins(coins);
        self
    }

    pub fn with_confirmations(self, hash: &str, confirmations: u64) -> Self {
        self.set_confirmations(hash, confirmations);
        self
    }

    pub fn with_history(self, history: Vec<RemoteTransaction>) -> Self {
        self.state.lock().history = history;
        self
    }

    pub fn with_pending(self, pending: Vec<RemoteTransaction>) -> Self {
        self.state.lock().pending = pending;
        self
    }

    pub fn set_coins(&self, coins: Vec<Coin>) {
        self.state.lock().coins = coins;
    }

    pub fn set_confirmations(&self, hash: &str, confirmations: u64) {
        self.state.lock().confirmations.insert(hash.to_string(), confirmations);
    }

    /// Make every subsequent call fail with `error`.
    pub fn fail_with(&self, error: RemoteError) {
        self.state.lock().failure = Some(error);
    }

    /// Number of calls made to `method`.
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Payloads received by `send`, oldest first.
    pub fn sent_payloads(&self) -> Vec<Value> {
        self.state.lock().sent.clone()
    }

    fn enter(&self, method: &'static str) -> Result<(), WalletError> {
        *self.calls.lock().entry(method).or_default() += 1;
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        match &self.state.lock().failure {
            Some(err) => Err(err.clone().into()),
            None => Ok(()),
        }
    }
}

impl WalletService for FakeService {
    fn wallet(&self, id: &str) -> Result<WalletSummary, WalletError> {
        self.enter("wallet")?;
        Ok(WalletSummary {
            id: id.to_string(),
            extra: Map::new(),
        })
    }

    fn transaction(&self, _id: &str, hash: &str) -> Result<RemoteTransaction, WalletError> {
        self.enter("transaction")?;
        match self.state.lock().confirmations.get(hash) {
            Some(c) => Ok(tx(hash, *c)),
            None => Err(RemoteError::Status {
                status: 404,
                body: format!("transaction {hash} not found"),
            }
            .into()),
        }
    }

    fn history(&self, _id: &str) -> Result<Vec<RemoteTransaction>, WalletError> {
        self.enter("history")?;
        Ok(self.state.lock().history.clone())
    }

    fn pending(&self, _id: &str) -> Result<Vec<RemoteTransaction>, WalletError> {
        self.enter("pending")?;
        Ok(self.state.lock().pending.clone())
    }

    fn coins(&self, _id: &str) -> Result<Vec<Coin>, WalletError> {
        self.enter("coins")?;
        Ok(self.state.lock().coins.clone())
    }

    fn nested_address(&self, _id: &str, _account: &str) -> Result<ReceiveAddress, WalletError> {
        self.enter("nested_address")?;
        let mut state = self.state.lock();
        state.addresses_derived += 1;
        Ok(ReceiveAddress {
            address: format!("addr-{}", state.addresses_derived),
            extra: Map::new(),
        })
    }

    fn send(&self, _id: &str, payload: &Value) -> Result<Value, WalletError> {
        self.enter("send")?;
        let mut state = self.state.lock();
        state.sent.push(payload.clone());
        Ok(json!({
            "hash": format!("{:064x}", state.sent.len()),
            "confirmations": 0,
            "outputs": payload["outputs"].clone()
        }))
    }
}

/// Everything a test needs to drive one wallet.
pub struct Harness {
    pub service: Arc<FakeService>,
    pub backend: Arc<MemoryCache>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new(service: FakeService) -> Self {
        let clock = ManualClock::new();
        Self {
            service: Arc::new(service),
            backend: Arc::new(MemoryCache::with_clock(Arc::new(clock.clone()))),
            clock,
        }
    }

    pub fn cache(&self) -> AttributeCache {
        AttributeCache::new(self.backend.clone())
    }

    /// A new facade for `id` sharing this harness's service and cache.
    pub fn wallet(&self, id: &str) -> Wallet {
        Wallet::new(id, self.service.clone(), self.cache())
    }
}
