//! Legs of a requested transaction

use ledger_core::{Currency, EntryKind, Tick};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One ledger effect of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    /// Credit or debit
    pub kind: EntryKind,

    /// Unsigned amount
    pub amount: Decimal,

    /// Affected currency
    pub currency: Currency,

    /// Absolute due time; `None` applies immediately
    pub due: Option<Tick>,
}

impl Leg {
    /// Leg applied now
    pub fn instant(kind: EntryKind, amount: Decimal, currency: Currency) -> Self {
        Self {
            kind,
            amount,
            currency,
            due: None,
        }
    }

    /// Leg settling at `due`
    pub fn at(kind: EntryKind, amount: Decimal, currency: Currency, due: Tick) -> Self {
        Self {
            kind,
            amount,
            currency,
            due: Some(due),
        }
    }

    /// Leg applied now for a zero delay, else at `clock + delay`
    pub fn scheduled(kind: EntryKind, amount: Decimal, currency: Currency, delay: Tick, clock: Tick) -> Self {
        if delay == 0 {
            Self::instant(kind, amount, currency)
        } else {
            Self::at(kind, amount, currency, clock.saturating_add(delay))
        }
    }

    /// Signed effect on the balance
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }

    /// Debit leg
    pub fn is_debit(&self) -> bool {
        self.kind == EntryKind::Withdraw
    }

    /// Applied now
    pub fn is_instant(&self) -> bool {
        self.due.is_none()
    }
}
