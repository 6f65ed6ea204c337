//! # tally-core
//! Foundation types and traits for the Tally wallet facade.

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
