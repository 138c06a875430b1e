//! Account capability set
//!
//! The `Account` trait is what a counterparty must offer for two-leg
//! transfers: read access to its ledger and the ability to validate a leg
//! without side effects, then commit it once the other side has validated
//! too. Plans are opaque: only the crate builds them, and an account
//! re-checks a plan against its own state before booking it.

use crate::fee::FeeSpec;
use coverage_engine::Leg;
use ledger_core::{CoverageMode, Currency, Depot, EntryKind, Result, Tick};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settlement::ExecutionQueue;
use std::fmt;
use uuid::Uuid;

/// Outcome of a transaction request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confirmation {
    /// Every leg applied immediately
    Settled,
    /// At least one leg waits in the queue
    Queued,
    /// Not coverable in `ignore` mode; nothing changed
    Ignored,
}

impl Confirmation {
    /// Numeric code: 1 settled, 0 queued, -1 ignored
    pub fn code(&self) -> i8 {
        match self {
            Confirmation::Settled => 1,
            Confirmation::Queued => 0,
            Confirmation::Ignored => -1,
        }
    }

    /// Whether the transaction took effect (now or scheduled)
    pub fn is_filled(&self) -> bool {
        !matches!(self, Confirmation::Ignored)
    }
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Confirmation::Settled => "settled",
            Confirmation::Queued => "queued",
            Confirmation::Ignored => "ignored",
        };
        f.write_str(name)
    }
}

/// Receipt of an accepted or ignored request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Outcome
    pub confirmation: Confirmation,

    /// Principal actually booked (reduced in `partial` mode)
    pub principal: Decimal,
}

impl Receipt {
    /// Receipt for a booked principal
    pub fn new(confirmation: Confirmation, principal: Decimal) -> Self {
        Self {
            confirmation,
            principal,
        }
    }

    /// Receipt for an ignored request
    pub fn ignored() -> Self {
        Self::new(Confirmation::Ignored, Decimal::ZERO)
    }

    /// Numeric confirmation code
    pub fn code(&self) -> i8 {
        self.confirmation.code()
    }
}

/// Options of a single-account transaction
#[derive(Debug, Clone, Default)]
pub struct TxOptions {
    /// Delay of the principal legs
    pub processing_duration: Tick,

    /// Fee selection
    pub fee: FeeSpec,

    /// What to do when the request is not covered
    pub coverage: CoverageMode,

    /// Apply the debit leg of a trade immediately
    pub instant_withdrawal: bool,

    /// Bill a fixed fee immediately
    pub instant_float_fee: bool,

    /// Billing currency of a fixed fee
    pub float_fee_currency: Option<String>,
}

impl TxOptions {
    /// Instant, default fee, `except` coverage
    pub fn new() -> Self {
        Self::default()
    }

    /// Set principal delay
    pub fn with_processing_duration(mut self, ticks: Tick) -> Self {
        self.processing_duration = ticks;
        self
    }

    /// Set fee
    pub fn with_fee(mut self, fee: FeeSpec) -> Self {
        self.fee = fee;
        self
    }

    /// Set coverage mode
    pub fn with_coverage(mut self, coverage: CoverageMode) -> Self {
        self.coverage = coverage;
        self
    }

    /// Force the debit leg to apply now
    pub fn with_instant_withdrawal(mut self, instant: bool) -> Self {
        self.instant_withdrawal = instant;
        self
    }

    /// Force a fixed fee to apply now
    pub fn with_instant_float_fee(mut self, instant: bool) -> Self {
        self.instant_float_fee = instant;
        self
    }

    /// Bill a fixed fee in another currency
    pub fn with_float_fee_currency(mut self, currency: impl Into<String>) -> Self {
        self.float_fee_currency = Some(currency.into());
        self
    }
}

/// Options of a two-account transfer
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Fee charged to the paying account
    pub payer_fee: FeeSpec,

    /// Fee charged to the receiving account
    pub payee_fee: FeeSpec,

    /// Delay of the debit
    pub payer_processing_duration: Tick,

    /// Delay of the credit
    pub payee_processing_duration: Tick,
}

impl TransferOptions {
    /// Instant transfer with default fees on both sides
    pub fn new() -> Self {
        Self::default()
    }

    /// Set payer fee
    pub fn with_payer_fee(mut self, fee: FeeSpec) -> Self {
        self.payer_fee = fee;
        self
    }

    /// Set payee fee
    pub fn with_payee_fee(mut self, fee: FeeSpec) -> Self {
        self.payee_fee = fee;
        self
    }

    /// Set debit delay
    pub fn with_payer_processing_duration(mut self, ticks: Tick) -> Self {
        self.payer_processing_duration = ticks;
        self
    }

    /// Set credit delay
    pub fn with_payee_processing_duration(mut self, ticks: Tick) -> Self {
        self.payee_processing_duration = ticks;
        self
    }
}

/// Validated legs waiting to be committed to one account.
///
/// Only [`Account::prepare_transfer`] hands these out:
///
/// ```compile_fail
/// use fx_account::{CoverageMode, TransactionPlan};
///
/// let plan = TransactionPlan {
///     account: uuid::Uuid::nil(),
///     legs: Vec::new(),
///     coverage: CoverageMode::Except,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPlan {
    account: Uuid,
    legs: Vec<Leg>,
    coverage: CoverageMode,
}

impl TransactionPlan {
    pub(crate) fn new(account: Uuid, legs: Vec<Leg>, coverage: CoverageMode) -> Self {
        Self {
            account,
            legs,
            coverage,
        }
    }

    /// Account the plan was prepared by
    pub fn account(&self) -> Uuid {
        self.account
    }

    /// Legs (principal and fee)
    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    /// Coverage mode carried by queued legs
    pub fn coverage(&self) -> CoverageMode {
        self.coverage
    }

    pub(crate) fn into_legs(self) -> Vec<Leg> {
        self.legs
    }
}

/// Capability set shared by every account type
pub trait Account: fmt::Debug {
    /// Identity; clones share it
    fn id(&self) -> Uuid;

    /// Currency used for valuation by default
    fn reference_currency(&self) -> &Currency;

    /// Current simulated time
    fn clock(&self) -> Tick;

    /// Read-only ledger
    fn depot(&self) -> &Depot;

    /// Read-only pending entries
    fn queue(&self) -> &ExecutionQueue;

    /// Balance of `currency` now, ignoring the queue
    fn position(&self, currency: &str) -> Decimal {
        self.depot().get(currency)
    }

    /// Credit `amount` of `currency`
    fn deposit(&mut self, amount: Decimal, currency: &str, options: &TxOptions) -> Result<Receipt>;

    /// Debit `amount` of `currency`
    fn withdraw(&mut self, amount: Decimal, currency: &str, options: &TxOptions) -> Result<Receipt>;

    /// Advance the clock and settle due entries; returns the number applied
    fn tick(&mut self, step: Option<Tick>) -> Result<usize>;

    /// Validate one side of a transfer without touching state.
    ///
    /// `kind` is `Withdraw` for the paying side and `Deposit` for the
    /// receiving side; the fee is resolved against the matching table entry.
    fn prepare_transfer(
        &self,
        kind: EntryKind,
        amount: Decimal,
        currency: &Currency,
        fee: &FeeSpec,
        processing_duration: Tick,
    ) -> Result<TransactionPlan>;

    /// Apply a plan produced by this account's `prepare_transfer`.
    ///
    /// Fails without side effects if the plan belongs to another account or
    /// is no longer covered.
    fn commit(&mut self, plan: TransactionPlan) -> Result<Confirmation>;
}
