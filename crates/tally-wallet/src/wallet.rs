//! Wallet composition: remote service, attribute cache, transfer builder.
//!
//! A [`Wallet`] owns only its id. Derived attributes are read through the
//! [`AttributeCache`], which decides per attribute whether the remote
//! service is asked; transfers go through the [`TransactionBuilder`] before
//! reaching the service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tally_cache::AttributeCache;
use tally_core::constants::{CONFIRMED_BALANCE_TTL, DEFAULT_ACCOUNT, DEFAULT_CONFIRMATIONS};
use tally_core::error::WalletError;
use tally_core::traits::{CacheBackend, WalletService};
use tally_core::types::{
    Coin, DerivedAttribute, RemoteTransaction, SubmittedTransaction, WalletId, WalletSummary,
};
use tracing::{debug, info};

use crate::builder::{TransactionBuilder, TransferDefaults, TransferOptions};
use crate::config::WalletConfig;

/// A wallet held by the remote wallet service.
pub struct Wallet {
    id: WalletId,
    service: Arc<dyn WalletService>,
    cache: AttributeCache,
    builder: TransactionBuilder,
    /// Minimum confirmations for a coin to count towards the confirmed balance.
    confirmations: u64,
    balance_ttl: Duration,
}

impl Wallet {
    /// Create a wallet with default fee, confirmation and expiry settings.
    pub fn new(
        id: impl Into<WalletId>,
        service: Arc<dyn WalletService>,
        cache: AttributeCache,
    ) -> Self {
        Self {
            id: id.into(),
            service,
            cache,
            builder: TransactionBuilder::new(TransferDefaults::default()),
            confirmations: u64::from(DEFAULT_CONFIRMATIONS),
            balance_ttl: CONFIRMED_BALANCE_TTL,
        }
    }

    /// Create a wallet wired from `config`, caching in `backend`.
    pub fn from_config(
        id: impl Into<WalletId>,
        config: &WalletConfig,
        service: Arc<dyn WalletService>,
        backend: Arc<dyn CacheBackend>,
    ) -> Self {
        let mut cache = AttributeCache::new(backend).with_namespace(config.cache_namespace.clone());
        if config.cache_single_flight {
            cache = cache.with_single_flight();
        }
        Self::new(id, service, cache)
            .with_builder(TransactionBuilder::new(config.transfer_defaults()))
            .with_confirmation_threshold(config.confirmation_threshold)
            .with_balance_ttl(config.confirmed_balance_ttl())
    }

    pub fn with_builder(mut self, builder: TransactionBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_confirmation_threshold(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn with_balance_ttl(mut self, ttl: Duration) -> Self {
        self.balance_ttl = ttl;
        self
    }

    pub fn id(&self) -> &WalletId {
        &self.id
    }

    /// Wallet summary, always fetched live.
    pub fn summary(&self) -> Result<WalletSummary, WalletError> {
        self.ensure_id()?;
        self.service.wallet(self.id.as_str())
    }

    /// Current receive address. Derived once, then served from cache until
    /// [`forget_address`](Self::forget_address) is called.
    pub fn address(&self) -> Result<String, WalletError> {
        self.cache
            .read_forever(&self.id, DerivedAttribute::Address, || {
                debug!(wallet = %self.id, "deriving receive address");
                let derived = self.service.nested_address(self.id.as_str(), DEFAULT_ACCOUNT)?;
                Ok(derived.address)
            })
    }

    /// Drop the cached receive address so the next read derives a new one.
    pub fn forget_address(&self) -> Result<(), WalletError> {
        self.cache.invalidate(&self.id, DerivedAttribute::Address)
    }

    /// Sum of coin values whose transactions reached the confirmation
    /// threshold. Cached for the balance TTL (two minutes by default).
    pub fn confirmed_satoshi(&self) -> Result<u64, WalletError> {
        self.cache.read_with_ttl(
            &self.id,
            DerivedAttribute::ConfirmedSatoshi,
            self.balance_ttl,
            || self.compute_confirmed_satoshi(),
        )
    }

    /// Drop the cached confirmed balance.
    pub fn forget_confirmed_satoshi(&self) -> Result<(), WalletError> {
        self.cache
            .invalidate(&self.id, DerivedAttribute::ConfirmedSatoshi)
    }

    /// Transaction history in service order. Never cached.
    pub fn transactions(&self) -> Result<Vec<RemoteTransaction>, WalletError> {
        self.cache.read(&self.id, DerivedAttribute::Transactions, || {
            self.service.history(self.id.as_str())
        })
    }

    /// Unconfirmed transactions in service order. Never cached.
    pub fn pending_transactions(&self) -> Result<Vec<RemoteTransaction>, WalletError> {
        self.cache
            .read(&self.id, DerivedAttribute::PendingTransactions, || {
                self.service.pending(self.id.as_str())
            })
    }

    /// Unspent coins in service order. Never cached.
    pub fn coins(&self) -> Result<Vec<Coin>, WalletError> {
        self.cache.read(&self.id, DerivedAttribute::Coins, || {
            self.service.coins(self.id.as_str())
        })
    }

    /// Send `amount` satoshis to `destination`.
    ///
    /// Invalid amounts fail before anything is sent to the service. Options
    /// not given fall back to the configured defaults.
    pub fn send(
        &self,
        destination: &str,
        amount: i64,
        options: &TransferOptions,
    ) -> Result<SubmittedTransaction, WalletError> {
        self.ensure_id()?;
        let amount = self.builder.validate(destination, amount)?;
        let payload = self.builder.build_payload(destination, amount, options);

        let raw = self.service.send(self.id.as_str(), &payload.to_json())?;
        let submitted = SubmittedTransaction::from_raw(raw);
        info!(
            wallet = %self.id,
            destination,
            amount,
            hash = submitted.hash.as_deref().unwrap_or("?"),
            "transaction submitted"
        );
        Ok(submitted)
    }

    fn compute_confirmed_satoshi(&self) -> Result<u64, WalletError> {
        let coins = self.service.coins(self.id.as_str())?;
        let total = confirmed_total(&coins, self.confirmations, |hash| {
            Ok(self.service.transaction(self.id.as_str(), hash)?.confirmations)
        })?;
        debug!(wallet = %self.id, coins = coins.len(), total, "computed confirmed balance");
        Ok(total)
    }

    fn ensure_id(&self) -> Result<(), WalletError> {
        if self.id.is_valid() {
            Ok(())
        } else {
            Err(WalletError::InvalidWalletState("wallet id is empty".into()))
        }
    }
}

/// Sum the values of `coins` whose owning transaction has at least
/// `threshold` confirmations.
///
/// `confirmations_of` is asked once per distinct transaction hash.
pub fn confirmed_total<F>(
    coins: &[Coin],
    threshold: u64,
    mut confirmations_of: F,
) -> Result<u64, WalletError>
where
    F: FnMut(&str) -> Result<u64, WalletError>,
{
    let mut seen: HashMap<&str, u64> = HashMap::new();
    let mut total: u64 = 0;
    for coin in coins {
        let confirmations = match seen.get(coin.hash.as_str()) {
            Some(c) => *c,
            None => {
                let c = confirmations_of(&coin.hash)?;
                seen.insert(&coin.hash, c);
                c
            }
        };
        if confirmations >= threshold {
            total = total
                .checked_add(coin.value)
                .ok_or(WalletError::ValueOverflow)?;
        }
    }
    Ok(total)
}
