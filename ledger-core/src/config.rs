//! Configuration for an account
//!
//! Construction parameters can be loaded from TOML:
//!
//! ```toml
//! reference_currency = "EUR"
//! coverage_policy = "max_forward"
//! clock = 3
//! queue = [[10, "withdraw", 10, "EUR"], [12, "c_deposit", "2.5", "BTC", "debit"]]
//!
//! [depot]
//! EUR = 100
//! BTC = "0.5"
//!
//! [[exchange_rates]]
//! from = "BTC"
//! to = "EUR"
//! rate = 30000
//! ```

use crate::depot::Depot;
use crate::types::{Currency, CoveragePolicy, PendingEntry, Tick};
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Account configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Currency totals are expressed in
    pub reference_currency: String,

    /// Initial balances
    pub depot: BTreeMap<String, Decimal>,

    /// Initial pending entries
    pub queue: QueueSpec,

    /// Initial clock
    pub clock: Tick,

    /// Initial exchange rates
    pub exchange_rates: Vec<RateConfig>,

    /// Policy for delayed obligations
    pub coverage_policy: CoveragePolicy,

    /// Degrade `debit` coverage to `except`
    pub prohibit_debiting: bool,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            reference_currency: "EUR".to_string(),
            depot: BTreeMap::new(),
            queue: QueueSpec::default(),
            clock: 0,
            exchange_rates: Vec::new(),
            coverage_policy: CoveragePolicy::default(),
            prohibit_debiting: false,
        }
    }
}

impl AccountConfig {
    /// Configuration for `reference_currency` with everything else empty
    pub fn new(reference_currency: impl Into<String>) -> Self {
        Self {
            reference_currency: reference_currency.into(),
            ..Self::default()
        }
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading account config from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parse from a TOML document and validate
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field that serde alone cannot
    pub fn validate(&self) -> Result<()> {
        Currency::new(self.reference_currency.as_str())?;
        self.initial_depot()?;
        self.initial_queue()?;
        self.initial_rates()?;
        Ok(())
    }

    /// Reference currency
    pub fn reference(&self) -> Result<Currency> {
        Currency::new(self.reference_currency.as_str())
    }

    /// Initial ledger
    pub fn initial_depot(&self) -> Result<Depot> {
        self.depot
            .iter()
            .map(|(code, amount)| Ok((Currency::new(code.as_str())?, *amount)))
            .collect()
    }

    /// Initial queue with kinds normalized
    pub fn initial_queue(&self) -> Result<Vec<PendingEntry>> {
        self.queue.entries()?.iter().map(RawEntry::to_entry).collect()
    }

    /// Initial rates as `(from, to, rate)`
    pub fn initial_rates(&self) -> Result<Vec<(Currency, Currency, Decimal)>> {
        self.exchange_rates
            .iter()
            .map(|r| {
                if r.rate <= Decimal::ZERO {
                    return Err(Error::InvalidValue(format!(
                        "Exchange rate {}/{} must be positive, got {}",
                        r.from, r.to, r.rate
                    )));
                }
                Ok((Currency::new(r.from.as_str())?, Currency::new(r.to.as_str())?, r.rate))
            })
            .collect()
    }
}

/// One exchange rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    /// Base currency
    pub from: String,

    /// Quote currency
    pub to: String,

    /// Units of `to` per unit of `from`
    pub rate: Decimal,
}

/// Initial queue: a single entry or a list of entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueueSpec {
    /// `queue = [10, "withdraw", 10, "EUR"]`
    One(RawEntry),
    /// `queue = [[10, "withdraw", 10, "EUR"], ...]`
    Many(Vec<RawEntry>),
    /// Anything else; rejected on validation
    Malformed(toml::Value),
}

impl Default for QueueSpec {
    fn default() -> Self {
        QueueSpec::Many(Vec::new())
    }
}

impl QueueSpec {
    /// Entries as a slice regardless of form
    pub fn entries(&self) -> Result<&[RawEntry]> {
        match self {
            QueueSpec::One(entry) => Ok(std::slice::from_ref(entry)),
            QueueSpec::Many(entries) => Ok(entries),
            QueueSpec::Malformed(value) => Err(Error::InvalidType(format!(
                "Queue must be [due, kind, amount, currency, coverage?] or a list of those, got {}",
                value
            ))),
        }
    }
}

/// Queue entry as written by hand: `[due, kind, amount, currency, coverage?]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
    /// With explicit coverage mode
    Full(Tick, String, Decimal, String, String),
    /// Coverage defaults to `except`
    Short(Tick, String, Decimal, String),
}

impl RawEntry {
    /// Normalize into a pending entry
    pub fn to_entry(&self) -> Result<PendingEntry> {
        match self {
            RawEntry::Full(due, kind, amount, currency, coverage) => {
                PendingEntry::parse(*due, kind, *amount, currency, Some(coverage))
            }
            RawEntry::Short(due, kind, amount, currency) => {
                PendingEntry::parse(*due, kind, *amount, currency, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoverageMode, EntryKind};
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AccountConfig::default();
        assert_eq!(config.reference_currency, "EUR");
        assert_eq!(config.coverage_policy, CoveragePolicy::MinBackward);
        assert!(config.initial_queue().unwrap().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_document() {
        let raw = r#"
            reference_currency = "USD"
            coverage_policy = "max_forward"
            clock = 3
            prohibit_debiting = true
            queue = [[10, "withdraw", 10, "EUR"], [12, "c_deposit", "2.5", "BTC", "debit"]]

            [depot]
            EUR = 100
            BTC = "0.5"

            [[exchange_rates]]
            from = "BTC"
            to = "EUR"
            rate = 30000
        "#;
        let config = AccountConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.reference().unwrap().code(), "USD");
        assert_eq!(config.clock, 3);
        assert!(config.prohibit_debiting);

        let depot = config.initial_depot().unwrap();
        assert_eq!(depot["EUR"], dec!(100));
        assert_eq!(depot["BTC"], dec!(0.5));

        let queue = config.initial_queue().unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].kind, EntryKind::Withdraw);
        assert_eq!(queue[0].coverage, CoverageMode::Except);
        assert_eq!(queue[1].kind, EntryKind::Deposit);
        assert_eq!(queue[1].coverage, CoverageMode::Debit);
        assert_eq!(queue[1].amount, dec!(2.5));

        let rates = config.initial_rates().unwrap();
        assert_eq!(rates[0].2, dec!(30000));
    }

    #[test]
    fn test_single_entry_queue() {
        let config =
            AccountConfig::from_toml_str(r#"queue = [14, "deposit", 14, "EUR", "except"]"#).unwrap();
        let queue = config.initial_queue().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].due, 14);
        assert_eq!(queue[0].kind, EntryKind::Deposit);
    }

    #[test]
    fn test_rejects_malformed_entries() {
        assert!(AccountConfig::from_toml_str(r#"queue = [[10, "something", 10, "EUR"]]"#).is_err());
        assert!(AccountConfig::from_toml_str(r#"queue = [[10, "withdraw", 10, "EUR", "often"]]"#).is_err());
        assert!(matches!(
            AccountConfig::from_toml_str(r#"queue = [["test", 2]]"#),
            Err(Error::InvalidType(_))
        ));
        assert!(matches!(
            AccountConfig::from_toml_str(r#"queue = [[-1, "withdraw", 10, "EUR"]]"#),
            Err(Error::InvalidType(_))
        ));
        assert!(matches!(
            AccountConfig::from_toml_str("queue = 5"),
            Err(Error::InvalidType(_))
        ));
        assert!(AccountConfig::from_toml_str(r#"reference_currency = """#).is_err());
        assert!(AccountConfig::from_toml_str(r#"coverage_policy = "sideways""#).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "reference_currency = \"BTC\"\n[depot]\nBTC = 2").unwrap();
        let config = AccountConfig::from_file(file.path()).unwrap();
        assert_eq!(config.reference_currency, "BTC");
        assert_eq!(config.initial_depot().unwrap()["BTC"], dec!(2));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AccountConfig::from_file("/nonexistent/account.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
