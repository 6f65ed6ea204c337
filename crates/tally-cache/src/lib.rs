//! # tally-cache: cached derived wallet attributes.
//!
//! Derives stable cache keys from wallet ids and routes attribute reads
//! through a [`CacheBackend`](tally_core::traits::CacheBackend) using each
//! attribute's expiry policy.
//!
//! # Modules
//!
//! - [`attribute`]: `AttributeCache`: key derivation and policy dispatch
//! - [`memory`]: `MemoryCache`: in-process backend with expiry
//! - [`file`]: `FileCache`: JSON file backend that outlives the process
//! - [`clock`]: `ManualClock` for driving expiry in tests and simulations

pub mod attribute;
pub mod clock;
pub mod file;
pub mod memory;

pub use attribute::AttributeCache;
pub use clock::ManualClock;
pub use file::FileCache;
pub use memory::MemoryCache;
