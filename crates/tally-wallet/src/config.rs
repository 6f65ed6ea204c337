//! Process-wide wallet configuration.
//!
//! Provides [`WalletConfig`] with defaults for the wallet service endpoint,
//! cache namespace, fee defaults and confirmation policy. Values are layered
//! with the `config` crate: built-in defaults, then an optional TOML file,
//! then `TALLY_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tally_core::constants::{
    CONFIRMED_BALANCE_TTL, DEFAULT_CACHE_NAMESPACE, DEFAULT_CONFIRMATIONS, DEFAULT_MAX_FEE,
    DEFAULT_RATE, DEFAULT_SUBTRACT_FEE,
};

use crate::builder::TransferDefaults;

/// Environment variable prefix, e.g. `TALLY_SERVICE_URL`.
pub const ENV_PREFIX: &str = "TALLY";

/// Default wallet service endpoint.
pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:48334";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Base URL of the wallet service HTTP API.
    pub service_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// First segment of every cache key.
    pub cache_namespace: String,
    /// Serialise concurrent cache misses per key.
    pub cache_single_flight: bool,
    /// File the CLI keeps cached attributes in between runs. When unset the
    /// CLI uses `<cache dir>/tally/cache.json`.
    pub cache_file: Option<PathBuf>,
    /// Maximum fee in satoshis when the caller sets none.
    pub default_max_fee: u64,
    /// Fee rate in satoshis per kilobyte when the caller sets none.
    pub default_rate: u64,
    /// Whether fees come out of the sent amount when the caller does not say.
    pub default_subtract_fee: bool,
    /// Minimum confirmations for a coin to count as confirmed.
    pub confirmation_threshold: u64,
    /// Lifetime of a cached confirmed balance, in seconds.
    pub confirmed_balance_ttl_secs: u64,
    /// Log level filter string (e.g. "info", "tally_wallet=debug").
    pub log_level: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            timeout_secs: 10,
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            cache_single_flight: true,
            cache_file: None,
            default_max_fee: DEFAULT_MAX_FEE,
            default_rate: DEFAULT_RATE,
            default_subtract_fee: DEFAULT_SUBTRACT_FEE,
            confirmation_threshold: u64::from(DEFAULT_CONFIRMATIONS),
            confirmed_balance_ttl_secs: CONFIRMED_BALANCE_TTL.as_secs(),
            log_level: "info".to_string(),
        }
    }
}

impl WalletConfig {
    /// Load defaults, then `file` (if given), then `TALLY_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self, ::config::ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn transfer_defaults(&self) -> TransferDefaults {
        TransferDefaults {
            max_fee: self.default_max_fee,
            rate: self.default_rate,
            subtract_fee: self.default_subtract_fee,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn confirmed_balance_ttl(&self) -> Duration {
        Duration::from_secs(self.confirmed_balance_ttl_secs)
    }
}
