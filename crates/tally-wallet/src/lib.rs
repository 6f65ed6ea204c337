//! # tally-wallet: wallet facade over a remote wallet service.
//!
//! Exposes a wallet's derived attributes (receive address, confirmed
//! balance, history, pending transactions, coins) with per-attribute
//! caching, and validates and builds outgoing transfers.
//!
//! # Modules
//!
//! - [`builder`]: `TransactionBuilder`, transfer options and payloads
//! - [`config`]: `WalletConfig` loaded from file and environment
//! - [`wallet`]: `Wallet`, the composed facade

pub mod builder;
pub mod config;
pub mod wallet;

// Re-exports for convenient access
pub use builder::{Payload, TransactionBuilder, TransferDefaults, TransferOptions, TransferRequest};
pub use config::WalletConfig;
pub use wallet::{Wallet, confirmed_total};
