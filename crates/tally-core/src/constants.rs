//! Process-wide constants. All monetary values in satoshis (1 BTC = 10^8 satoshis).

use std::time::Duration;

pub const COIN: u64 = 100_000_000;

/// Default ceiling on the fee the wallet service may deduct for one send.
pub const DEFAULT_MAX_FEE: u64 = 50_000;

/// Default fee rate in satoshis per kilobyte.
pub const DEFAULT_RATE: u64 = 10_000;

/// Fees are taken out of the sent amount unless the caller says otherwise.
pub const DEFAULT_SUBTRACT_FEE: bool = true;

/// Minimum confirmations for a coin to count towards the confirmed balance.
pub const DEFAULT_CONFIRMATIONS: u32 = 6;

/// How long a computed confirmed balance stays cached.
pub const CONFIRMED_BALANCE_TTL: Duration = Duration::from_secs(120);

/// Prefix of every cache key.
pub const DEFAULT_CACHE_NAMESPACE: &str = "tally";

/// Wallet account used when deriving receive addresses.
pub const DEFAULT_ACCOUNT: &str = "default";

/// Wire names of the recognised transfer options.
pub const OPT_MAX_FEE: &str = "maxFee";
pub const OPT_RATE: &str = "rate";
pub const OPT_SUBTRACT_FEE: &str = "subtractFee";
