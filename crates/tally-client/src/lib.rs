//! # tally-client: blocking HTTP access to the remote wallet service.
//!
//! [`HttpWalletService`] implements
//! [`WalletService`](tally_core::traits::WalletService) over the service's
//! JSON API.

pub mod http;

pub use http::HttpWalletService;
