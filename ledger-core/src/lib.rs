//! FX Ledger Core
//!
//! Shared vocabulary of the ledger simulator: currencies, entry kinds,
//! coverage modes and policies, the per-currency balance ledger and the
//! account configuration.
//!
//! # Invariants
//!
//! - Absent currency reads as zero balance
//! - Balances change only through an account's own transaction methods
//! - Every mode string is parsed at the boundary; unknown modes are errors

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod depot;
pub mod error;
pub mod types;

// Re-exports
pub use config::{AccountConfig, QueueSpec, RateConfig, RawEntry};
pub use depot::Depot;
pub use error::{Error, Result};
pub use types::{
    CoverageMode, CoveragePolicy, Currency, EntryKind, PendingEntry, Tick,
};
