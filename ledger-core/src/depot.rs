//! Per-currency balance ledger
//!
//! The account hands out `&Depot` only, so outside code can read balances
//! but never write them. Absent currencies read as zero.

use crate::error::{Error, Result};
use crate::types::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Index;

/// Currency → signed balance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Depot {
    balances: BTreeMap<Currency, Decimal>,
}

impl Depot {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `currency`, zero if never held
    pub fn get(&self, currency: &str) -> Decimal {
        self.balances.get(currency).copied().unwrap_or(Decimal::ZERO)
    }

    /// Whether `currency` is a position (held at some point, even at zero)
    pub fn contains(&self, currency: &str) -> bool {
        self.balances.contains_key(currency)
    }

    /// Number of positions
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// No positions at all
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Positions in currency order
    pub fn iter(&self) -> impl Iterator<Item = (&Currency, &Decimal)> {
        self.balances.iter()
    }

    /// Held currencies
    pub fn currencies(&self) -> impl Iterator<Item = &Currency> {
        self.balances.keys()
    }

    /// Balance of `currency` after adding `signed_amount`, `None` on overflow
    pub fn after(&self, currency: &str, signed_amount: Decimal) -> Option<Decimal> {
        self.get(currency).checked_add(signed_amount)
    }

    /// Add a signed amount to `currency`, opening the position if needed.
    ///
    /// On overflow the ledger is left as it was.
    pub fn apply(&mut self, currency: &Currency, signed_amount: Decimal) -> Result<()> {
        let balance = self.after(currency.code(), signed_amount).ok_or_else(|| {
            Error::InvalidValue(format!(
                "{} {} overflows the balance of {}",
                signed_amount,
                currency,
                self.get(currency.code())
            ))
        })?;
        self.balances.insert(currency.clone(), balance);
        Ok(())
    }

    /// Overwrite a balance
    pub fn set(&mut self, currency: Currency, amount: Decimal) {
        self.balances.insert(currency, amount);
    }

    /// Drop every position
    pub fn clear(&mut self) {
        self.balances.clear();
    }
}

impl Index<&str> for Depot {
    type Output = Decimal;

    fn index(&self, currency: &str) -> &Decimal {
        self.balances.get(currency).unwrap_or(&Decimal::ZERO)
    }
}

impl FromIterator<(Currency, Decimal)> for Depot {
    fn from_iter<I: IntoIterator<Item = (Currency, Decimal)>>(iter: I) -> Self {
        Self {
            balances: iter.into_iter().collect(),
        }
    }
}
