//! Wallet data model: identifiers, cache keys and records returned by the
//! remote wallet service.
//!
//! Remote records keep every field the service sends. The fields the facade
//! relies on are typed; anything else lands in `extra` so a record can be
//! handed back to a host without loss.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::CONFIRMED_BALANCE_TTL;
use crate::error::WalletError;

/// Opaque identifier of a wallet at the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(String);

impl WalletId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id can scope cache keys and remote calls.
    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WalletId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for WalletId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How long a derived attribute may be served from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Cached until explicitly invalidated.
    Forever,
    /// Cached for a fixed duration.
    Ttl(Duration),
    /// Never cached.
    Live,
}

/// A value about a wallet that is computed remotely rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedAttribute {
    Address,
    ConfirmedSatoshi,
    Transactions,
    PendingTransactions,
    Coins,
}

impl DerivedAttribute {
    pub const ALL: [DerivedAttribute; 5] = [
        Self::Address,
        Self::ConfirmedSatoshi,
        Self::Transactions,
        Self::PendingTransactions,
        Self::Coins,
    ];

    /// Attribute name used as the last segment of its cache key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::ConfirmedSatoshi => "confirmed_satoshi",
            Self::Transactions => "transactions",
            Self::PendingTransactions => "pending_transactions",
            Self::Coins => "coins",
        }
    }

    pub fn policy(&self) -> CachePolicy {
        match self {
            Self::Address => CachePolicy::Forever,
            Self::ConfirmedSatoshi => CachePolicy::Ttl(CONFIRMED_BALANCE_TTL),
            Self::Transactions | Self::PendingTransactions | Self::Coins => CachePolicy::Live,
        }
    }
}

impl fmt::Display for DerivedAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cache key of the form `<namespace>:<wallet-id>:<attribute-name>`.
///
/// Keys depend only on their three inputs, so every facade for the same
/// wallet shares the same cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `attribute` of `wallet_id`.
    ///
    /// Fails with [`WalletError::InvalidWalletState`] if the id is empty.
    pub fn derive(
        namespace: &str,
        wallet_id: &WalletId,
        attribute: DerivedAttribute,
    ) -> Result<Self, WalletError> {
        if !wallet_id.is_valid() {
            return Err(WalletError::InvalidWalletState(format!(
                "cannot derive a cache key for {attribute} without a wallet id"
            )));
        }
        Ok(Self(format!("{namespace}:{wallet_id}:{}", attribute.name())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An unspent output owned by the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    /// Hash of the transaction that created this output.
    pub hash: String,
    #[serde(default)]
    pub index: u32,
    /// Value in satoshis.
    pub value: u64,
    /// Block height, -1 while unconfirmed.
    #[serde(default = "unconfirmed_height")]
    pub height: i64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coinbase: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A transaction as reported by the wallet service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTransaction {
    pub hash: String,
    pub confirmations: u64,
    #[serde(default = "unconfirmed_height")]
    pub height: i64,
    #[serde(default)]
    pub fee: Option<u64>,
    /// Block time, absent while unconfirmed.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteTransaction {
    pub fn is_confirmed(&self) -> bool {
        self.confirmations > 0
    }
}

/// Wallet summary from `GET /wallet/{id}`. Only the id is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSummary {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of the nested-address derivation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveAddress {
    pub address: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of a successful submission: the service's transaction record.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedTransaction {
    /// Transaction hash, when the service reported one.
    pub hash: Option<String>,
    /// Raw record exactly as returned.
    pub raw: Value,
}

impl SubmittedTransaction {
    pub fn from_raw(raw: Value) -> Self {
        let hash = raw.get("hash").and_then(Value::as_str).map(str::to_owned);
        Self { hash, raw }
    }

    /// Interpret the raw record as a [`RemoteTransaction`].
    pub fn transaction(&self) -> Result<RemoteTransaction, WalletError> {
        Ok(serde_json::from_value(self.raw.clone())?)
    }
}

fn unconfirmed_height() -> i64 {
    -1
}
