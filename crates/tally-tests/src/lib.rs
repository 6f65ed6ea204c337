//! Integration test suite for Tally.
//!
//! Drives the wallet facade end to end against an in-memory wallet service
//! and the in-process cache backend, covering caching policy, expiry,
//! concurrent cold reads and transfer construction.

pub mod helpers;
