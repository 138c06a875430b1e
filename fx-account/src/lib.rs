//! FX Account
//!
//! Single-account multi-currency ledger simulator: deposits, withdrawals,
//! trades and transfers with pluggable fees, deferred settlement through an
//! execution queue drained by an explicit clock, coverage checks that see
//! already-queued obligations, and valuation over a conversion graph.
//!
//! # Invariants
//!
//! - The ledger changes only through account methods; reads are via `&Depot`
//! - A rejected request leaves ledger and queue untouched
//! - `ignore` coverage never raises for lack of funds and never mutates
//! - Transfers validate both legs before committing either
//!
//! # Example
//!
//! ```
//! use fx_account::{CoverageMode, FxAccount, TxOptions};
//! use rust_decimal::Decimal;
//!
//! # fn main() -> fx_account::Result<()> {
//! let mut account = FxAccount::builder("EUR")
//!     .position("EUR", Decimal::from(100))
//!     .position("BTC", Decimal::from(100))
//!     .build()?;
//!
//! let ignore = TxOptions::new().with_coverage(CoverageMode::Ignore);
//! let receipt = account.sell(Decimal::from(1000), Decimal::ONE, "EUR", "BTC", &ignore)?;
//! assert_eq!(receipt.code(), -1);
//! assert_eq!(account.position("EUR"), Decimal::from(100));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod account;
pub mod fee;
pub mod fx_account;
pub mod metrics;
pub mod orders;
pub mod rates;

// Re-exports
pub use account::{Account, Confirmation, Receipt, TransactionPlan, TransferOptions, TxOptions};
pub use fee::{fee_fn, FeeAction, FeeFn, FeeModel, FeeResult, FeeSpec, FeeTable};
pub use fx_account::{FxAccount, FxAccountBuilder};
pub use ledger_core::{
    AccountConfig, CoverageMode, CoveragePolicy, Currency, Depot, EntryKind, Error, PendingEntry,
    Result, Tick,
};
pub use metrics::Metrics;
pub use orders::{Order, OrderId, OrderKind, OrderManager, Placement, Quotes, TickReport, Trail};
pub use rates::{ConversionGraph, ExchangeRateTable};
