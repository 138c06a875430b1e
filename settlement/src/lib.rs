//! Settlement Engine
//!
//! Deferred settlement for the ledger simulator: an execution queue of
//! pending entries, the simulated clock that drains it, and the engine that
//! applies due entries to a ledger.
//!
//! # Ordering
//!
//! Entries settle by due time; at equal due time deposits settle before
//! withdrawals; remaining ties keep insertion order.
//!
//! # Example
//!
//! ```
//! use ledger_core::{Currency, Depot, PendingEntry};
//! use settlement::{ExecutionQueue, SettlementEngine};
//!
//! let mut depot = Depot::new();
//! depot.apply(&Currency::new("EUR").unwrap(), 100.into()).unwrap();
//!
//! let mut queue = ExecutionQueue::new();
//! queue.insert(PendingEntry::parse(2, "withdraw", 30.into(), "EUR", None).unwrap());
//!
//! let outcome = SettlementEngine::default().run(&mut queue, &mut depot, 2);
//! assert!(outcome.is_complete());
//! assert_eq!(depot["EUR"], rust_decimal::Decimal::from(70));
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod clock;
pub mod engine;
pub mod queue;

// Re-exports
pub use clock::Clock;
pub use engine::{DrainOutcome, SettlementEngine};
pub use ledger_core::{Error, Result};
pub use queue::ExecutionQueue;
