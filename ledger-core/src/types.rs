//! Core types for the ledger
//!
//! All types are designed for:
//! - Exact arithmetic (Decimal for money)
//! - A single canonical key per currency (its code string)
//! - Explicit parsing of every mode string at the boundary

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Simulated time step. The clock only moves forward.
pub type Tick = u64;

/// Currency code (ISO 4217 or any ticker such as `BTC`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Create a currency from its code
    pub fn new(code: impl Into<String>) -> Result<Self> {
        let code = code.into();
        if code.is_empty() || code.chars().any(char::is_whitespace) {
            return Err(Error::InvalidValue(format!(
                "Currency code must be a non-empty token, got '{}'",
                code
            )));
        }
        Ok(Self(code))
    }

    /// Currency code
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Currency {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a ledger effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Credit
    #[serde(rename = "c_deposit", alias = "deposit")]
    Deposit,
    /// Debit
    #[serde(rename = "c_withdraw", alias = "withdraw")]
    Withdraw,
}

impl EntryKind {
    /// Canonical name used in queue listings
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "c_deposit",
            EntryKind::Withdraw => "c_withdraw",
        }
    }

    /// Apply the direction to an unsigned amount
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            EntryKind::Deposit => amount,
            EntryKind::Withdraw => -amount,
        }
    }

    /// Rank within one due time: deposits settle before withdrawals
    pub fn drain_rank(&self) -> u8 {
        match self {
            EntryKind::Deposit => 0,
            EntryKind::Withdraw => 1,
        }
    }
}

impl FromStr for EntryKind {
    type Err = Error;

    /// Accepts both the short (`withdraw`) and the canonical (`c_withdraw`) names
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deposit" | "c_deposit" => Ok(EntryKind::Deposit),
            "withdraw" | "c_withdraw" => Ok(EntryKind::Withdraw),
            other => Err(Error::InvalidValue(format!(
                "Unknown entry kind '{}', expected 'withdraw' or 'deposit'",
                other
            ))),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call coverage mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageMode {
    /// Reject the whole request if it cannot be funded
    #[default]
    Except,
    /// Reduce the principal to what can be funded
    Partial,
    /// Apply in full, allowing overdraft
    Debit,
    /// Do nothing if it cannot be funded
    Ignore,
}

impl CoverageMode {
    /// Mode name
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageMode::Except => "except",
            CoverageMode::Partial => "partial",
            CoverageMode::Debit => "debit",
            CoverageMode::Ignore => "ignore",
        }
    }
}

impl FromStr for CoverageMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "except" => Ok(CoverageMode::Except),
            "partial" => Ok(CoverageMode::Partial),
            "debit" => Ok(CoverageMode::Debit),
            "ignore" => Ok(CoverageMode::Ignore),
            other => Err(Error::NotImplemented(format!(
                "Coverage mode '{}' (use except, partial, debit or ignore)",
                other
            ))),
        }
    }
}

impl fmt::Display for CoverageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account-level policy for validating delayed obligations against the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoveragePolicy {
    /// Non-negative at every queued point up to the due time
    #[default]
    MinBackward,
    /// Non-negative once the whole pending horizon has settled
    MaxForward,
    /// Only the current balance counts
    #[serde(alias = "none")]
    Disabled,
}

impl CoveragePolicy {
    /// Policy name
    pub fn as_str(&self) -> &'static str {
        match self {
            CoveragePolicy::MinBackward => "min_backward",
            CoveragePolicy::MaxForward => "max_forward",
            CoveragePolicy::Disabled => "disabled",
        }
    }
}

impl FromStr for CoveragePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "min_backward" => Ok(CoveragePolicy::MinBackward),
            "max_forward" => Ok(CoveragePolicy::MaxForward),
            "disabled" | "none" => Ok(CoveragePolicy::Disabled),
            other => Err(Error::NotImplemented(format!(
                "Coverage policy '{}' (use min_backward, max_forward or disabled)",
                other
            ))),
        }
    }
}

impl fmt::Display for CoveragePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduled future effect on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    /// Clock value at which the entry settles
    pub due: Tick,

    /// Credit or debit
    pub kind: EntryKind,

    /// Unsigned amount
    pub amount: Decimal,

    /// Affected currency
    pub currency: Currency,

    /// Coverage mode re-checked at settlement
    pub coverage: CoverageMode,
}

impl PendingEntry {
    /// Create a pending entry, rejecting negative amounts
    pub fn new(
        due: Tick,
        kind: EntryKind,
        amount: Decimal,
        currency: Currency,
        coverage: CoverageMode,
    ) -> Result<Self> {
        if amount < Decimal::ZERO {
            return Err(Error::InvalidValue(format!(
                "Pending entry amount must not be negative, got {}",
                amount
            )));
        }
        Ok(Self {
            due,
            kind,
            amount,
            currency,
            coverage,
        })
    }

    /// Build an entry from loosely typed parts, as found in initial queues.
    ///
    /// `kind` accepts short names (`withdraw`) and is normalized; a missing
    /// coverage mode means `except`.
    pub fn parse(
        due: Tick,
        kind: &str,
        amount: Decimal,
        currency: &str,
        coverage: Option<&str>,
    ) -> Result<Self> {
        let kind = kind.parse()?;
        let currency = currency.parse()?;
        let coverage = match coverage {
            Some(mode) => mode.parse()?,
            None => CoverageMode::Except,
        };
        Self::new(due, kind, amount, currency, coverage)
    }

    /// Effect on the balance (negative for withdrawals)
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }
}

impl fmt::Display for PendingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}, {}]",
            self.due, self.kind, self.amount, self.currency, self.coverage
        )
    }
}
