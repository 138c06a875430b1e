//! Coverage Engine
//!
//! Decides whether an obligation (principal + fee, now or at a future due
//! time) can be funded from the current ledger and the already-queued
//! entries, under the account's coverage policy.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod checker;
pub mod plan;
pub mod projection;

// Re-exports
pub use checker::{CoverageChecker, Shortfall};
pub use ledger_core::{Error, Result};
pub use plan::Leg;
pub use projection::{projection_for, MaxForward, MinBackward, Projection, Snapshot};
