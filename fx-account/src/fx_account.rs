//! Multi-currency account
//!
//! Every transaction runs the same pipeline: fee evaluation, coverage check,
//! immediate legs applied to the ledger, delayed legs pushed onto the
//! execution queue. `tick` advances the clock and settles what is due.
//!
//! # Example
//!
//! ```
//! use fx_account::{FxAccount, TxOptions};
//! use rust_decimal::Decimal;
//!
//! # fn main() -> fx_account::Result<()> {
//! let mut account = FxAccount::new("EUR")?;
//! account.deposit(Decimal::from(100), "EUR", &TxOptions::new())?;
//!
//! let delayed = TxOptions::new().with_processing_duration(2);
//! account.withdraw(Decimal::ONE, "EUR", &delayed)?;
//! assert_eq!(account.position("EUR"), Decimal::from(100));
//!
//! account.tick(None)?;
//! account.tick(None)?;
//! assert_eq!(account.position("EUR"), Decimal::from(99));
//! # Ok(())
//! # }
//! ```

use crate::account::{Account, Confirmation, Receipt, TransactionPlan, TransferOptions, TxOptions};
use crate::fee::{self, FeeAction, FeeFn, FeeRequest, FeeSpec, FeeTable};
use crate::metrics::Metrics;
use crate::rates::{self, ExchangeRateTable};
use coverage_engine::{CoverageChecker, Leg};
use ledger_core::{
    AccountConfig, CoverageMode, CoveragePolicy, Currency, Depot, EntryKind, Error, PendingEntry,
    Result, Tick,
};
use rust_decimal::Decimal;
use settlement::{Clock, ExecutionQueue, SettlementEngine};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// One request as seen by the leg planner
#[derive(Debug)]
struct Request<'a> {
    action: FeeAction,
    price: Decimal,
    base: &'a Currency,
    quote: &'a Currency,
    options: &'a TxOptions,
    float_fee_currency: Option<&'a Currency>,
}

fn check_amount(amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(Error::InvalidValue(format!(
            "Amount must not be negative, got {}",
            amount
        )));
    }
    Ok(())
}

fn check_pair(price: Decimal, base: &Currency, quote: &Currency) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(Error::InvalidValue(format!(
            "Price of {}/{} must be positive, got {}",
            base, quote, price
        )));
    }
    if base == quote {
        return Err(Error::InvalidValue(format!(
            "Trade needs two distinct currencies, got {}/{}",
            base, quote
        )));
    }
    Ok(())
}

/// Account holding any number of currencies
#[derive(Debug, Clone)]
pub struct FxAccount {
    id: Uuid,
    reference: Currency,
    depot: Depot,
    queue: ExecutionQueue,
    clock: Clock,
    fees: FeeTable,
    rates: ExchangeRateTable,
    policy: CoveragePolicy,
    prohibit_debiting: bool,
    metrics: Metrics,
}

impl FxAccount {
    /// Empty account valued in `reference_currency`
    pub fn new(reference_currency: &str) -> Result<Self> {
        Self::builder(reference_currency).build()
    }

    /// Start configuring an account
    pub fn builder(reference_currency: impl Into<String>) -> FxAccountBuilder {
        FxAccountBuilder::new(reference_currency)
    }

    /// Account from a validated configuration, without fee models
    pub fn from_config(config: &AccountConfig) -> Result<Self> {
        FxAccountBuilder::from_config(config)?.build()
    }

    /// Identity; clones share it
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Default valuation currency
    pub fn reference_currency(&self) -> &Currency {
        &self.reference
    }

    /// Current simulated time
    pub fn clock(&self) -> Tick {
        self.clock.now()
    }

    /// Read-only ledger
    pub fn depot(&self) -> &Depot {
        &self.depot
    }

    /// Read-only pending entries
    pub fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }

    /// Read-only fee models
    pub fn fees(&self) -> &FeeTable {
        &self.fees
    }

    /// Read-only ambient exchange rates
    pub fn exchange_rates(&self) -> &ExchangeRateTable {
        &self.rates
    }

    /// Policy for delayed obligations
    pub fn coverage_policy(&self) -> CoveragePolicy {
        self.policy
    }

    /// Whether `debit` coverage is degraded to `except`
    pub fn prohibit_debiting(&self) -> bool {
        self.prohibit_debiting
    }

    /// Allow or forbid overdrafts at runtime
    pub fn set_prohibit_debiting(&mut self, prohibit: bool) {
        self.prohibit_debiting = prohibit;
        debug!(account = %self.id, prohibit, "Debit prohibition changed");
    }

    /// Account metrics, shared with every clone of this account
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Balance of `currency` now, ignoring the queue
    pub fn position(&self, currency: &str) -> Decimal {
        self.depot.get(currency)
    }

    /// Credit `amount` of `currency`; a fee may debit another currency
    #[instrument(skip(self, options), fields(account = %self.id))]
    pub fn deposit(&mut self, amount: Decimal, currency: &str, options: &TxOptions) -> Result<Receipt> {
        check_amount(amount)?;
        let currency: Currency = currency.parse()?;
        let float_fee_currency = self.float_fee_currency(options)?;
        let request = Request {
            action: FeeAction::Deposit,
            price: Decimal::ONE,
            base: &currency,
            quote: &currency,
            options,
            float_fee_currency: float_fee_currency.as_ref(),
        };
        self.transact(&request, amount)
    }

    /// Debit `amount` of `currency`
    #[instrument(skip(self, options), fields(account = %self.id))]
    pub fn withdraw(&mut self, amount: Decimal, currency: &str, options: &TxOptions) -> Result<Receipt> {
        check_amount(amount)?;
        let currency: Currency = currency.parse()?;
        let float_fee_currency = self.float_fee_currency(options)?;
        let request = Request {
            action: FeeAction::Withdraw,
            price: Decimal::ONE,
            base: &currency,
            quote: &currency,
            options,
            float_fee_currency: float_fee_currency.as_ref(),
        };
        self.transact(&request, amount)
    }

    /// Sell `amount` of `base` for `amount * price` of `quote`
    #[instrument(skip(self, options), fields(account = %self.id))]
    pub fn sell(
        &mut self,
        amount: Decimal,
        price: Decimal,
        base: &str,
        quote: &str,
        options: &TxOptions,
    ) -> Result<Receipt> {
        self.trade(FeeAction::Sell, amount, price, base, quote, options)
    }

    /// Buy `amount` of `base` for `amount * price` of `quote`
    #[instrument(skip(self, options), fields(account = %self.id))]
    pub fn buy(
        &mut self,
        amount: Decimal,
        price: Decimal,
        base: &str,
        quote: &str,
        options: &TxOptions,
    ) -> Result<Receipt> {
        self.trade(FeeAction::Buy, amount, price, base, quote, options)
    }

    fn trade(
        &mut self,
        action: FeeAction,
        amount: Decimal,
        price: Decimal,
        base: &str,
        quote: &str,
        options: &TxOptions,
    ) -> Result<Receipt> {
        check_amount(amount)?;
        let base: Currency = base.parse()?;
        let quote: Currency = quote.parse()?;
        check_pair(price, &base, &quote)?;
        let float_fee_currency = self.float_fee_currency(options)?;
        let request = Request {
            action,
            price,
            base: &base,
            quote: &quote,
            options,
            float_fee_currency: float_fee_currency.as_ref(),
        };
        self.transact(&request, amount)
    }

    /// Move `amount` of `currency` from this account to `payee`.
    ///
    /// Both legs are validated before either account changes.
    #[instrument(skip(self, payee, options), fields(account = %self.id, counterparty = %payee.id()))]
    pub fn transfer(
        &mut self,
        payee: &mut dyn Account,
        amount: Decimal,
        currency: &str,
        options: &TransferOptions,
    ) -> Result<Receipt> {
        if payee.id() == self.id {
            return Err(Error::Account(format!(
                "Account {} cannot transfer to itself",
                self.id
            )));
        }
        check_amount(amount)?;
        let currency: Currency = currency.parse()?;

        let outgoing = self.prepare_transfer(
            EntryKind::Withdraw,
            amount,
            &currency,
            &options.payer_fee,
            options.payer_processing_duration,
        )?;
        let incoming = payee.prepare_transfer(
            EntryKind::Deposit,
            amount,
            &currency,
            &options.payee_fee,
            options.payee_processing_duration,
        )?;

        let sent = self.commit(outgoing)?;
        let received = payee.commit(incoming)?;
        info!(amount = %amount, currency = %currency, "Transferred to {}", payee.id());
        Ok(Receipt::new(combined(sent, received), amount))
    }

    /// Pull `amount` of `currency` from `payer` into this account.
    ///
    /// Both legs are validated before either account changes.
    #[instrument(skip(self, payer, options), fields(account = %self.id, counterparty = %payer.id()))]
    pub fn collect(
        &mut self,
        payer: &mut dyn Account,
        amount: Decimal,
        currency: &str,
        options: &TransferOptions,
    ) -> Result<Receipt> {
        if payer.id() == self.id {
            return Err(Error::Account(format!(
                "Account {} cannot collect from itself",
                self.id
            )));
        }
        check_amount(amount)?;
        let currency: Currency = currency.parse()?;

        let outgoing = payer.prepare_transfer(
            EntryKind::Withdraw,
            amount,
            &currency,
            &options.payer_fee,
            options.payer_processing_duration,
        )?;
        let incoming = self.prepare_transfer(
            EntryKind::Deposit,
            amount,
            &currency,
            &options.payee_fee,
            options.payee_processing_duration,
        )?;

        let sent = payer.commit(outgoing)?;
        let received = self.commit(incoming)?;
        info!(amount = %amount, currency = %currency, "Collected from {}", payer.id());
        Ok(Receipt::new(combined(sent, received), amount))
    }

    /// Advance the clock and settle due entries.
    ///
    /// `None` steps by one; `Some(t)` jumps to `t`, which may equal the
    /// current clock to retry a blocked drain. Entries settled before an
    /// uncovered one stay settled; the clock then stops at the uncovered
    /// entry and a coverage error is returned. An entry that would overflow
    /// its balance stops the clock the same way with `InvalidValue`.
    #[instrument(skip(self), fields(account = %self.id))]
    pub fn tick(&mut self, step: Option<Tick>) -> Result<usize> {
        let target = self.clock.target(step)?;
        let outcome = SettlementEngine::new(self.prohibit_debiting).run(
            &mut self.queue,
            &mut self.depot,
            target,
        );
        self.metrics.record_drain(outcome.applied.len());
        self.metrics.update_queue_depth(self.queue.len());

        match outcome.blocked {
            Some(entry) if self.depot.after(entry.currency.code(), entry.signed_amount()).is_none() => {
                self.clock.advance_to(entry.due);
                Err(Error::InvalidValue(format!(
                    "Queued entry {} overflows the balance {}",
                    entry,
                    self.depot.get(entry.currency.code())
                )))
            }
            Some(entry) => {
                self.clock.advance_to(entry.due);
                Err(Error::Coverage(format!(
                    "Queued entry {} is not covered (balance {})",
                    entry,
                    self.depot.get(entry.currency.code())
                )))
            }
            None => {
                self.clock.advance_to(target);
                debug!(clock = target, applied = outcome.applied.len(), "Clock advanced");
                Ok(outcome.applied.len())
            }
        }
    }

    /// Value of the whole ledger in `reference_currency` (default: the
    /// account's reference currency).
    ///
    /// Without an explicit table (or with an empty one) the ambient rates
    /// are used, which must have been updated since the last such call.
    #[instrument(skip(self, exchange_rates), fields(account = %self.id))]
    pub fn total_balance(
        &mut self,
        exchange_rates: Option<&ExchangeRateTable>,
        reference_currency: Option<&str>,
    ) -> Result<Decimal> {
        let reference: Currency = match reference_currency {
            Some(code) => code.parse()?,
            None => self.reference.clone(),
        };

        match exchange_rates.filter(|table| !table.is_empty()) {
            Some(table) => rates::valuate(&self.depot, table, &reference),
            None => {
                if !self.rates.take_fresh() {
                    return Err(Error::Operating(
                        "Exchange rates must be updated before valuing with the stored table".to_string(),
                    ));
                }
                rates::valuate(&self.depot, &self.rates, &reference)
            }
        }
    }

    /// Set one ambient rate: one `from` is worth `rate` units of `to`
    #[instrument(skip(self), fields(account = %self.id))]
    pub fn update_exchange_rate(&mut self, rate: Decimal, from: &str, to: &str) -> Result<()> {
        let from: Currency = from.parse()?;
        let to: Currency = to.parse()?;
        self.rates.update(rate, from, to)?;
        debug!("Exchange rate updated");
        Ok(())
    }

    /// Set many ambient rates; the batch is rejected as a whole on any bad entry
    #[instrument(skip(self, rates, pairs), fields(account = %self.id, size = rates.len()))]
    pub fn batch_update_exchange_rates(&mut self, rates: &[Decimal], pairs: &[(&str, &str)]) -> Result<()> {
        let pairs = pairs
            .iter()
            .map(|(from, to)| Ok((Currency::new(*from)?, Currency::new(*to)?)))
            .collect::<Result<Vec<_>>>()?;
        self.rates.update_batch(rates, &pairs)?;
        debug!("Exchange rates updated");
        Ok(())
    }

    /// Return to the state of `FxAccount::new(reference)`, keeping the id
    pub fn reset(&mut self) {
        self.reset_ledger();
        self.fees = FeeTable::new();
        self.policy = CoveragePolicy::default();
        self.prohibit_debiting = false;
        info!(account = %self.id, "Account reset");
    }

    /// Clear ledger, queue, rates and clock; keep fees, policy and reference
    pub fn reset_ledger(&mut self) {
        self.depot.clear();
        self.queue.clear();
        self.rates.clear();
        self.clock = Clock::default();
        self.metrics.update_queue_depth(0);
        info!(account = %self.id, "Ledger reset");
    }

    fn float_fee_currency(&self, options: &TxOptions) -> Result<Option<Currency>> {
        options
            .float_fee_currency
            .as_deref()
            .map(|code| Currency::new(code))
            .transpose()
    }

    /// Legs of `request` for a principal of `amount`, fee included
    fn legs_for(&self, request: &Request<'_>, amount: Decimal) -> Result<Vec<Leg>> {
        let now = self.clock.now();
        let delay = request.options.processing_duration;
        self.clock.due_in(delay)?;
        let debit_delay = if request.options.instant_withdrawal { 0 } else { delay };
        let (base, quote) = (request.base.clone(), request.quote.clone());

        let mut legs = match request.action {
            FeeAction::Deposit => vec![Leg::scheduled(EntryKind::Deposit, amount, base, delay, now)],
            FeeAction::Withdraw => vec![Leg::scheduled(EntryKind::Withdraw, amount, base, delay, now)],
            FeeAction::Sell => {
                let proceeds = counter_value(amount, request.price)?;
                vec![
                    Leg::scheduled(EntryKind::Withdraw, amount, base, debit_delay, now),
                    Leg::scheduled(EntryKind::Deposit, proceeds, quote, delay, now),
                ]
            }
            FeeAction::Buy => {
                let cost = counter_value(amount, request.price)?;
                vec![
                    Leg::scheduled(EntryKind::Deposit, amount, base, delay, now),
                    Leg::scheduled(EntryKind::Withdraw, cost, quote, debit_delay, now),
                ]
            }
        };

        for leg in legs.iter().filter(|leg| leg.is_debit()) {
            if !self.depot.contains(leg.currency.code()) {
                return Err(Error::PositionNotApplicable(format!(
                    "{} is not held and cannot be debited",
                    leg.currency
                )));
            }
        }

        let fee = fee::evaluate(
            &request.options.fee,
            &self.fees,
            &FeeRequest {
                action: request.action,
                amount,
                price: request.price,
                base: request.base,
                quote: request.quote,
                delay,
                float_fee_currency: request.float_fee_currency,
                instant_float_fee: request.options.instant_float_fee,
            },
        )?;
        if !fee.amount.is_zero() {
            let credited = legs
                .iter()
                .any(|leg| !leg.is_debit() && leg.currency == fee.currency);
            if !credited && !self.depot.contains(fee.currency.code()) {
                return Err(Error::PositionNotApplicable(format!(
                    "Fee currency {} is neither held nor credited by the {}",
                    fee.currency, request.action
                )));
            }
            legs.push(Leg::scheduled(
                EntryKind::Withdraw,
                fee.amount,
                fee.currency,
                fee.delay,
                now,
            ));
        }
        self.check_headroom(&legs)?;
        Ok(legs)
    }

    /// Reject legs that could push a running balance of their currencies out of range
    fn check_headroom(&self, legs: &[Leg]) -> Result<()> {
        let currencies: BTreeSet<&Currency> = legs.iter().map(|leg| &leg.currency).collect();
        for currency in currencies {
            let code = currency.code();
            let mut balance = Some(self.depot.get(code));
            let mut pending = self.queue.gross(code);
            for leg in legs.iter().filter(|leg| &leg.currency == currency) {
                if leg.is_instant() {
                    balance = balance.and_then(|b| b.checked_add(leg.signed_amount()));
                } else {
                    pending = pending.and_then(|p| p.checked_add(leg.amount));
                }
            }
            let bound = balance.zip(pending).and_then(|(b, p)| b.abs().checked_add(p));
            if bound.is_none() {
                return Err(Error::InvalidValue(format!(
                    "Transaction would overflow the {} balance",
                    currency
                )));
            }
        }
        Ok(())
    }

    fn transact(&mut self, request: &Request<'_>, amount: Decimal) -> Result<Receipt> {
        let legs = self.legs_for(request, amount)?;
        let checker = CoverageChecker::new(self.policy);
        let now = self.clock.now();
        let mode = request.options.coverage;

        let (legs, principal) = match mode {
            CoverageMode::Debit if !self.prohibit_debiting => (legs, amount),
            CoverageMode::Ignore => {
                if let Some(shortfall) = checker.shortfall(&legs, &self.depot, &self.queue, now) {
                    info!(
                        currency = %shortfall.currency,
                        lowest = %shortfall.lowest,
                        "Ignored uncovered {} of {}",
                        request.action,
                        amount
                    );
                    self.metrics.record_confirmation(Confirmation::Ignored);
                    return Ok(Receipt::ignored());
                }
                (legs, amount)
            }
            CoverageMode::Partial => match checker.shortfall(&legs, &self.depot, &self.queue, now) {
                None => (legs, amount),
                Some(shortfall) => {
                    let covered = checker.largest_covered(
                        amount,
                        |x| self.legs_for(request, x),
                        &self.depot,
                        &self.queue,
                        now,
                    )?;
                    match covered {
                        Some(reduced) => (self.legs_for(request, reduced)?, reduced),
                        None => {
                            warn!("Rejected {} of {}: fee not coverable", request.action, amount);
                            self.metrics.record_rejection();
                            return Err(shortfall.into_error(self.policy));
                        }
                    }
                }
            },
            _ => {
                if let Some(shortfall) = checker.shortfall(&legs, &self.depot, &self.queue, now) {
                    warn!("Rejected {} of {}: {} short", request.action, amount, shortfall.currency);
                    self.metrics.record_rejection();
                    return Err(shortfall.into_error(self.policy));
                }
                (legs, amount)
            }
        };

        let confirmation = self.apply(TransactionPlan::new(self.id, legs, mode))?;
        debug!(principal = %principal, "{} {}", request.action, confirmation);
        Ok(Receipt::new(confirmation, principal))
    }

    /// Book the legs of a plan that passed `check_headroom`
    fn apply(&mut self, plan: TransactionPlan) -> Result<Confirmation> {
        let mut queued = false;
        let coverage = plan.coverage();
        for leg in plan.into_legs() {
            if leg.amount.is_zero() {
                continue;
            }
            match leg.due {
                None => self.depot.apply(&leg.currency, leg.signed_amount())?,
                Some(due) => {
                    self.queue.insert(PendingEntry {
                        due,
                        kind: leg.kind,
                        amount: leg.amount,
                        currency: leg.currency,
                        coverage,
                    });
                    queued = true;
                }
            }
        }

        let confirmation = if queued {
            Confirmation::Queued
        } else {
            Confirmation::Settled
        };
        self.metrics.record_confirmation(confirmation);
        self.metrics.update_queue_depth(self.queue.len());
        Ok(confirmation)
    }
}

fn counter_value(amount: Decimal, price: Decimal) -> Result<Decimal> {
    amount.checked_mul(price).ok_or_else(|| {
        Error::InvalidValue(format!("{} at price {} overflows", amount, price))
    })
}

fn combined(a: Confirmation, b: Confirmation) -> Confirmation {
    if a == Confirmation::Queued || b == Confirmation::Queued {
        Confirmation::Queued
    } else {
        Confirmation::Settled
    }
}

impl Account for FxAccount {
    fn id(&self) -> Uuid {
        self.id
    }

    fn reference_currency(&self) -> &Currency {
        &self.reference
    }

    fn clock(&self) -> Tick {
        self.clock.now()
    }

    fn depot(&self) -> &Depot {
        &self.depot
    }

    fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }

    fn deposit(&mut self, amount: Decimal, currency: &str, options: &TxOptions) -> Result<Receipt> {
        FxAccount::deposit(self, amount, currency, options)
    }

    fn withdraw(&mut self, amount: Decimal, currency: &str, options: &TxOptions) -> Result<Receipt> {
        FxAccount::withdraw(self, amount, currency, options)
    }

    fn tick(&mut self, step: Option<Tick>) -> Result<usize> {
        FxAccount::tick(self, step)
    }

    fn prepare_transfer(
        &self,
        kind: EntryKind,
        amount: Decimal,
        currency: &Currency,
        fee: &FeeSpec,
        processing_duration: Tick,
    ) -> Result<TransactionPlan> {
        check_amount(amount)?;
        let options = TxOptions {
            processing_duration,
            fee: fee.clone(),
            ..TxOptions::default()
        };
        let action = match kind {
            EntryKind::Deposit => FeeAction::Deposit,
            EntryKind::Withdraw => FeeAction::Withdraw,
        };
        let request = Request {
            action,
            price: Decimal::ONE,
            base: currency,
            quote: currency,
            options: &options,
            float_fee_currency: None,
        };

        let legs = self.legs_for(&request, amount)?;
        let checker = CoverageChecker::new(self.policy);
        if let Some(shortfall) = checker.shortfall(&legs, &self.depot, &self.queue, self.clock.now()) {
            warn!(account = %self.id, "Rejected transfer {} of {} {}", kind, amount, currency);
            self.metrics.record_rejection();
            return Err(shortfall.into_error(self.policy));
        }
        Ok(TransactionPlan::new(self.id, legs, CoverageMode::Except))
    }

    fn commit(&mut self, plan: TransactionPlan) -> Result<Confirmation> {
        if plan.account() != self.id {
            return Err(Error::Account(format!(
                "Plan prepared for {} cannot be committed to {}",
                plan.account(),
                self.id
            )));
        }
        self.check_headroom(plan.legs())?;
        let checker = CoverageChecker::new(self.policy);
        if let Some(shortfall) = checker.shortfall(plan.legs(), &self.depot, &self.queue, self.clock.now()) {
            warn!(account = %self.id, "Rejected stale transfer plan: {} short", shortfall.currency);
            self.metrics.record_rejection();
            return Err(shortfall.into_error(self.policy));
        }
        self.apply(plan)
    }
}

/// Builder for [`FxAccount`]
#[derive(Debug, Clone)]
pub struct FxAccountBuilder {
    reference: String,
    depot: Vec<(String, Decimal)>,
    queue: Vec<PendingEntry>,
    clock: Tick,
    rates: Vec<(String, String, Decimal)>,
    fees: FeeTable,
    policy: CoveragePolicy,
    prohibit_debiting: bool,
}

impl FxAccountBuilder {
    /// Builder for an empty account valued in `reference_currency`
    pub fn new(reference_currency: impl Into<String>) -> Self {
        Self {
            reference: reference_currency.into(),
            depot: Vec::new(),
            queue: Vec::new(),
            clock: 0,
            rates: Vec::new(),
            fees: FeeTable::new(),
            policy: CoveragePolicy::default(),
            prohibit_debiting: false,
        }
    }

    /// Builder pre-filled from a configuration
    pub fn from_config(config: &AccountConfig) -> Result<Self> {
        config.validate()?;
        let mut builder = Self::new(config.reference_currency.clone())
            .clock(config.clock)
            .coverage_policy(config.coverage_policy)
            .prohibit_debiting(config.prohibit_debiting);
        builder.depot = config
            .depot
            .iter()
            .map(|(code, amount)| (code.clone(), *amount))
            .collect();
        builder.queue = config.initial_queue()?;
        builder.rates = config
            .exchange_rates
            .iter()
            .map(|r| (r.from.clone(), r.to.clone(), r.rate))
            .collect();
        Ok(builder)
    }

    /// Opening balance
    pub fn position(mut self, currency: impl Into<String>, amount: Decimal) -> Self {
        self.depot.push((currency.into(), amount));
        self
    }

    /// Pending entry present from the start
    pub fn pending(mut self, entry: PendingEntry) -> Self {
        self.queue.push(entry);
        self
    }

    /// Starting clock
    pub fn clock(mut self, clock: Tick) -> Self {
        self.clock = clock;
        self
    }

    /// Stored exchange rate (stale until the first update)
    pub fn exchange_rate(mut self, from: impl Into<String>, to: impl Into<String>, rate: Decimal) -> Self {
        self.rates.push((from.into(), to.into(), rate));
        self
    }

    /// Fee model for an action
    pub fn fee(mut self, action: FeeAction, model: FeeFn) -> Self {
        self.fees.set(action, Some(model));
        self
    }

    /// Whole fee table
    pub fn fees(mut self, fees: FeeTable) -> Self {
        self.fees = fees;
        self
    }

    /// Policy for delayed obligations
    pub fn coverage_policy(mut self, policy: CoveragePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Degrade `debit` coverage to `except`
    pub fn prohibit_debiting(mut self, prohibit: bool) -> Self {
        self.prohibit_debiting = prohibit;
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<FxAccount> {
        let reference = Currency::new(self.reference)?;
        let depot = self
            .depot
            .into_iter()
            .map(|(code, amount)| Ok((Currency::new(code)?, amount)))
            .collect::<Result<Depot>>()?;
        let rates = ExchangeRateTable::with_rates(
            self.rates
                .into_iter()
                .map(|(from, to, rate)| Ok((Currency::new(from)?, Currency::new(to)?, rate)))
                .collect::<Result<Vec<_>>>()?,
        )?;
        let metrics = Metrics::new().map_err(|e| Error::Other(format!("Metrics registry: {}", e)))?;

        let queue: ExecutionQueue = self.queue.into_iter().collect();
        metrics.update_queue_depth(queue.len());

        let account = FxAccount {
            id: Uuid::now_v7(),
            reference,
            depot,
            queue,
            clock: Clock::new(self.clock),
            fees: self.fees,
            rates,
            policy: self.policy,
            prohibit_debiting: self.prohibit_debiting,
            metrics,
        };
        info!(
            account = %account.id,
            reference = %account.reference,
            policy = %account.policy,
            "Account created"
        );
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee::FeeResult;
    use rust_decimal_macros::dec;

    fn account(balances: &[(&str, Decimal)]) -> FxAccount {
        balances
            .iter()
            .fold(FxAccount::builder("EUR"), |b, (c, a)| b.position(*c, *a))
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_account_is_empty() {
        let account = FxAccount::new("EUR").unwrap();
        assert!(account.depot().is_empty());
        assert!(account.queue().is_empty());
        assert_eq!(account.clock(), 0);
        assert_eq!(account.coverage_policy(), CoveragePolicy::MinBackward);
        assert!(!account.prohibit_debiting());
        assert!(FxAccount::new("").is_err());
    }

    #[test]
    fn test_negative_amount_rejected_before_mutation() {
        let mut account = account(&[("EUR", dec!(100))]);
        let err = account.withdraw(dec!(-1), "EUR", &TxOptions::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
        assert_eq!(account.position("EUR"), dec!(100));
    }

    #[test]
    fn test_withdraw_unknown_currency() {
        let mut account = account(&[("EUR", dec!(100))]);
        let err = account.withdraw(dec!(1), "USD", &TxOptions::new()).unwrap_err();
        assert!(matches!(err, Error::PositionNotApplicable(_)));
    }

    #[test]
    fn test_deposit_opens_position() {
        let mut account = FxAccount::new("EUR").unwrap();
        let receipt = account.deposit(dec!(5), "BTC", &TxOptions::new()).unwrap();
        assert_eq!(receipt.confirmation, Confirmation::Settled);
        assert_eq!(account.position("BTC"), dec!(5));
    }

    #[test]
    fn test_overflowing_deposit_rejected_before_mutation() {
        let mut account = FxAccount::new("EUR").unwrap();
        account.deposit(Decimal::MAX, "EUR", &TxOptions::new()).unwrap();

        let err = account.deposit(Decimal::MAX, "EUR", &TxOptions::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
        assert_eq!(account.position("EUR"), Decimal::MAX);

        let delayed = TxOptions::new().with_processing_duration(2);
        assert!(account.deposit(dec!(1), "EUR", &delayed).is_err());
        assert!(account.queue().is_empty());

        account.withdraw(Decimal::MAX, "EUR", &TxOptions::new()).unwrap();
        assert_eq!(account.position("EUR"), Decimal::ZERO);
    }

    #[test]
    fn test_overflowing_queued_entry_stops_clock() {
        let mut account = FxAccount::builder("EUR")
            .position("EUR", Decimal::MAX)
            .pending(PendingEntry::parse(1, "deposit", dec!(1), "EUR", None).unwrap())
            .build()
            .unwrap();

        let err = account.tick(Some(3)).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
        assert_eq!(account.clock(), 1);
        assert_eq!(account.position("EUR"), Decimal::MAX);
        assert_eq!(account.queue().len(), 1);
    }

    #[test]
    fn test_fee_in_unheld_currency() {
        let mut account = account(&[("EUR", dec!(100))]);
        let options = TxOptions::new()
            .with_fee(FeeSpec::Fixed(dec!(10)))
            .with_float_fee_currency("BTC");
        let err = account.deposit(dec!(100), "EUR", &options).unwrap_err();
        assert!(matches!(err, Error::PositionNotApplicable(_)));
        assert_eq!(account.position("EUR"), dec!(100));
    }

    #[test]
    fn test_trade_validation() {
        let mut account = account(&[("EUR", dec!(100))]);
        let options = TxOptions::new();
        assert!(matches!(
            account.sell(dec!(1), dec!(0), "EUR", "BTC", &options),
            Err(Error::InvalidValue(_))
        ));
        assert!(matches!(
            account.sell(dec!(1), dec!(1), "EUR", "EUR", &options),
            Err(Error::InvalidValue(_))
        ));
    }

    #[test]
    fn test_zero_delay_custom_fee_is_instant() {
        let mut account = account(&[("BTC", dec!(100))]);
        let options = TxOptions::new()
            .with_processing_duration(5)
            .with_fee(FeeSpec::custom(|amount, _, base, _, _| {
                FeeResult::new(amount / dec!(10), base, 0)
            }));
        let receipt = account.sell(dec!(10), dec!(2), "BTC", "EUR", &options).unwrap();
        assert_eq!(receipt.confirmation, Confirmation::Queued);
        assert_eq!(account.position("BTC"), dec!(99));
        assert_eq!(account.queue().len(), 2);
    }

    #[test]
    fn test_metrics_follow_outcomes() {
        let mut account = account(&[("EUR", dec!(10))]);
        account.withdraw(dec!(1), "EUR", &TxOptions::new()).unwrap();
        account
            .withdraw(dec!(100), "EUR", &TxOptions::new().with_coverage(CoverageMode::Ignore))
            .unwrap();
        assert!(account.withdraw(dec!(100), "EUR", &TxOptions::new()).is_err());
        account
            .withdraw(dec!(1), "EUR", &TxOptions::new().with_processing_duration(1))
            .unwrap();

        let metrics = account.metrics().clone();
        assert_eq!(metrics.settled(), 1);
        assert_eq!(metrics.ignored(), 1);
        assert_eq!(metrics.rejected(), 1);
        assert_eq!(metrics.queued(), 1);
        assert_eq!(metrics.queue_depth(), 1);

        account.tick(None).unwrap();
        assert_eq!(metrics.drained(), 1);
        assert_eq!(metrics.queue_depth(), 0);

        let mut twin = account.clone();
        twin.withdraw(dec!(1), "EUR", &TxOptions::new()).unwrap();
        assert_eq!(account.metrics().settled(), 2);
    }

    #[test]
    fn test_reset_variants() {
        let mut account = FxAccount::builder("EUR")
            .position("EUR", dec!(100))
            .fee(FeeAction::Withdraw, fee::fee_fn(|_, _, c, _, _| FeeResult::new(dec!(1), c, 0)))
            .coverage_policy(CoveragePolicy::MaxForward)
            .prohibit_debiting(true)
            .build()
            .unwrap();
        account.update_exchange_rate(dec!(2), "BTC", "EUR").unwrap();
        account
            .withdraw(dec!(1), "EUR", &TxOptions::new().with_processing_duration(3))
            .unwrap();
        account.tick(None).unwrap();
        let id = account.id();

        account.reset_ledger();
        assert!(account.depot().is_empty());
        assert!(account.queue().is_empty());
        assert!(account.exchange_rates().is_empty());
        assert_eq!(account.clock(), 0);
        assert!(account.fees().is_set(FeeAction::Withdraw));
        assert_eq!(account.coverage_policy(), CoveragePolicy::MaxForward);
        assert!(account.prohibit_debiting());

        account.reset();
        assert!(!account.fees().is_set(FeeAction::Withdraw));
        assert_eq!(account.coverage_policy(), CoveragePolicy::MinBackward);
        assert!(!account.prohibit_debiting());
        assert_eq!(account.id(), id);
        assert_eq!(account.reference_currency().code(), "EUR");
    }

    #[test]
    fn test_clone_keeps_identity() {
        let mut account = account(&[("EUR", dec!(100))]);
        let mut twin = account.clone();
        assert_eq!(account.id(), twin.id());
        let err = account
            .transfer(&mut twin, dec!(1), "EUR", &TransferOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::Account(_)));
    }
}
