//! Error types for the Tally wallet facade.
use thiserror::Error;

/// Failures reported by the remote wallet service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("wallet service returned {status}: {body}")] Status { status: u16, body: String },
    #[error("transport: {0}")] Transport(String),
    #[error("malformed response: {0}")] Decode(String),
}

/// Failures reported by a cache backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend: {0}")] Backend(String),
}

/// Errors surfaced by wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// An operation needing a cache key was attempted without a usable wallet id.
    #[error("invalid wallet state: {0}")]
    InvalidWalletState(String),

    /// Transfer amount is not a positive integer.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Summing coin values overflowed.
    #[error("value overflow")]
    ValueOverflow,

    /// A cached or remote value could not be (de)serialized.
    #[error("serialization: {0}")]
    Serialization(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::Serialization(e.to_string())
    }
}
