//! Error types for the ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Obligation cannot be funded under the active coverage mode/policy
    #[error("Coverage error: {0}")]
    Coverage(String),

    /// Currency is not a resolvable position for the operation
    #[error("Position not applicable: {0}")]
    PositionNotApplicable(String),

    /// Invalid counterparty for transfer/collect
    #[error("Account error: {0}")]
    Account(String),

    /// Account state does not permit the requested read
    #[error("Operating error: {0}")]
    Operating(String),

    /// Parameter of the wrong shape
    #[error("Invalid type: {0}")]
    InvalidType(String),

    /// Parameter with an out-of-range value
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Unrecognized mode string
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Conflicting exchange rates (direct vs inverse)
    #[error("Inconsistent exchange rates: {0}")]
    Consistency(String),

    /// Currency cannot be reached in the conversion graph
    #[error("Currency unknown: {0}")]
    CurrencyUnknown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
