//! Fee evaluation
//!
//! Every fee spec is reduced to one contract:
//! `(amount, price, base, quote, delay) -> (fee amount, fee currency, fee delay)`.
//! Deposits and withdrawals call it with `price = 1` and `base = quote`.

use ledger_core::{Currency, Error, Result, Tick};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Evaluated fee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeResult {
    /// Fee amount (never negative)
    pub amount: Decimal,

    /// Currency the fee is billed in
    pub currency: Currency,

    /// Delay relative to the clock; 0 bills immediately
    pub delay: Tick,
}

impl FeeResult {
    /// Create a fee result from a currency code
    pub fn new(amount: Decimal, currency: &str, delay: Tick) -> Result<Self> {
        Ok(Self {
            amount,
            currency: currency.parse()?,
            delay,
        })
    }

    /// No fee, billed in `currency`
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
            delay: 0,
        }
    }
}

/// User-supplied fee model
pub trait FeeModel: Send + Sync {
    /// Fee for a transaction of `amount` base units at `price`
    fn evaluate(
        &self,
        amount: Decimal,
        price: Decimal,
        base: &str,
        quote: &str,
        delay: Tick,
    ) -> Result<FeeResult>;
}

impl<F> FeeModel for F
where
    F: Fn(Decimal, Decimal, &str, &str, Tick) -> Result<FeeResult> + Send + Sync,
{
    fn evaluate(
        &self,
        amount: Decimal,
        price: Decimal,
        base: &str,
        quote: &str,
        delay: Tick,
    ) -> Result<FeeResult> {
        self(amount, price, base, quote, delay)
    }
}

/// Shared fee model handle
pub type FeeFn = Arc<dyn FeeModel>;

/// Wrap a closure as a fee model
pub fn fee_fn<F>(f: F) -> FeeFn
where
    F: Fn(Decimal, Decimal, &str, &str, Tick) -> Result<FeeResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-call fee selection
#[derive(Clone, Default)]
pub enum FeeSpec {
    /// No fee
    Disabled,

    /// The account's configured model for the action
    #[default]
    Default,

    /// Fixed amount
    Fixed(Decimal),

    /// Call-specific model
    Custom(FeeFn),
}

impl FeeSpec {
    /// Call-specific model from a closure
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(Decimal, Decimal, &str, &str, Tick) -> Result<FeeResult> + Send + Sync + 'static,
    {
        FeeSpec::Custom(fee_fn(f))
    }
}

impl fmt::Debug for FeeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeSpec::Disabled => f.write_str("Disabled"),
            FeeSpec::Default => f.write_str("Default"),
            FeeSpec::Fixed(amount) => f.debug_tuple("Fixed").field(amount).finish(),
            FeeSpec::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Transaction kinds with their own fee model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeAction {
    /// Sell base for quote
    Sell,
    /// Buy base with quote
    Buy,
    /// Credit
    Deposit,
    /// Debit
    Withdraw,
}

impl fmt::Display for FeeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeeAction::Sell => "sell",
            FeeAction::Buy => "buy",
            FeeAction::Deposit => "deposit",
            FeeAction::Withdraw => "withdraw",
        };
        f.write_str(name)
    }
}

/// Account-level fee models; `None` charges nothing
#[derive(Clone, Default)]
pub struct FeeTable {
    sell: Option<FeeFn>,
    buy: Option<FeeFn>,
    deposit: Option<FeeFn>,
    withdraw: Option<FeeFn>,
}

impl FeeTable {
    /// Table without fees
    pub fn new() -> Self {
        Self::default()
    }

    /// Model for an action
    pub fn get(&self, action: FeeAction) -> Option<&FeeFn> {
        match action {
            FeeAction::Sell => self.sell.as_ref(),
            FeeAction::Buy => self.buy.as_ref(),
            FeeAction::Deposit => self.deposit.as_ref(),
            FeeAction::Withdraw => self.withdraw.as_ref(),
        }
    }

    /// Replace the model for an action
    pub fn set(&mut self, action: FeeAction, model: Option<FeeFn>) {
        let slot = match action {
            FeeAction::Sell => &mut self.sell,
            FeeAction::Buy => &mut self.buy,
            FeeAction::Deposit => &mut self.deposit,
            FeeAction::Withdraw => &mut self.withdraw,
        };
        *slot = model;
    }

    /// Builder-style `set`
    pub fn with(mut self, action: FeeAction, model: FeeFn) -> Self {
        self.set(action, Some(model));
        self
    }

    /// Whether an action carries a model
    pub fn is_set(&self, action: FeeAction) -> bool {
        self.get(action).is_some()
    }
}

impl fmt::Debug for FeeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeeTable")
            .field("sell", &self.sell.is_some())
            .field("buy", &self.buy.is_some())
            .field("deposit", &self.deposit.is_some())
            .field("withdraw", &self.withdraw.is_some())
            .finish()
    }
}

/// Everything a fee depends on
#[derive(Debug, Clone)]
pub struct FeeRequest<'a> {
    /// Action whose table entry backs `FeeSpec::Default`
    pub action: FeeAction,

    /// Principal in base units
    pub amount: Decimal,

    /// Price of one base unit in quote
    pub price: Decimal,

    /// Base currency (the moved currency for deposit/withdraw)
    pub base: &'a Currency,

    /// Quote currency (equal to base for deposit/withdraw)
    pub quote: &'a Currency,

    /// Principal delay
    pub delay: Tick,

    /// Billing currency for fixed fees
    pub float_fee_currency: Option<&'a Currency>,

    /// Bill fixed fees immediately
    pub instant_float_fee: bool,
}

/// Resolve a fee spec against the account table
pub fn evaluate(spec: &FeeSpec, table: &FeeTable, request: &FeeRequest<'_>) -> Result<FeeResult> {
    let fee = match spec {
        FeeSpec::Disabled => FeeResult::zero(request.base.clone()),
        FeeSpec::Default => match table.get(request.action) {
            Some(model) => call(model.as_ref(), request)?,
            None => FeeResult::zero(request.base.clone()),
        },
        FeeSpec::Fixed(amount) => FeeResult {
            amount: *amount,
            currency: request
                .float_fee_currency
                .unwrap_or(request.base)
                .clone(),
            delay: if request.instant_float_fee { 0 } else { request.delay },
        },
        FeeSpec::Custom(model) => call(model.as_ref(), request)?,
    };

    if fee.amount < Decimal::ZERO {
        return Err(Error::InvalidValue(format!(
            "{} fee must not be negative, got {}",
            request.action, fee.amount
        )));
    }
    Ok(fee)
}

fn call(model: &dyn FeeModel, request: &FeeRequest<'_>) -> Result<FeeResult> {
    model.evaluate(
        request.amount,
        request.price,
        request.base.code(),
        request.quote.code(),
        request.delay,
    )
}
