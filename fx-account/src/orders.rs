//! Standing conditional orders
//!
//! An order book layered on an [`FxAccount`]. Orders are keyed by their
//! `(base, quote)` pair and evaluated against quoted rates on every tick:
//!
//! - stop loss: sell when the rate falls to the stop
//! - trailing stop loss: like a stop loss, the stop follows rising rates
//! - start buy: buy when the rate rises to the start
//! - buy limit: buy when the rate falls to the limit
//! - sell limit: sell when the rate rises to the limit
//!
//! Fills trade at the quoted rate. An order leaves the book once it fills
//! (settled or queued) or once the clock passes its expiry. An order whose
//! trade fails stays booked and is listed in the tick report.

use crate::account::{Receipt, TxOptions};
use crate::fx_account::FxAccount;
use crate::rates::inverse_consistent;
use ledger_core::{Currency, Error, Result, Tick};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Identifier of a resting order
pub type OrderId = u64;

/// How a trailing stop follows the rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trail {
    /// Keep the relative distance to the rate
    Percent,
    /// Keep the absolute distance to the rate
    Absolute,
}

/// Trigger condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    /// Sell when `rate <= stop`
    StopLoss {
        /// Stop rate
        stop: Decimal,
    },
    /// Sell when `rate <= stop`; the stop moves up with the rate
    TrailingStopLoss {
        /// Current stop rate
        stop: Decimal,
        /// How the stop follows
        trail: Trail,
    },
    /// Buy when `rate >= start`
    StartBuy {
        /// Start rate
        start: Decimal,
    },
    /// Buy when `rate <= limit`
    BuyLimit {
        /// Limit rate
        limit: Decimal,
    },
    /// Sell when `rate >= limit`
    SellLimit {
        /// Limit rate
        limit: Decimal,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Buy,
    Sell,
}

impl OrderKind {
    fn side(&self) -> Side {
        match self {
            OrderKind::StartBuy { .. } | OrderKind::BuyLimit { .. } => Side::Buy,
            _ => Side::Sell,
        }
    }

    fn triggered(&self, rate: Decimal) -> bool {
        match *self {
            OrderKind::StopLoss { stop } => rate <= stop,
            OrderKind::TrailingStopLoss { stop, .. } => rate <= stop,
            OrderKind::StartBuy { start } => rate >= start,
            OrderKind::BuyLimit { limit } => rate <= limit,
            OrderKind::SellLimit { limit } => rate >= limit,
        }
    }

    /// Move a trailing stop up when the rate rose since `last`
    fn follow(&mut self, last: Decimal, rate: Decimal) {
        if let OrderKind::TrailingStopLoss { stop, trail } = self {
            if rate <= last {
                return;
            }
            let moved = match trail {
                Trail::Percent => rate
                    .checked_div(last)
                    .and_then(|ratio| stop.checked_mul(ratio)),
                Trail::Absolute => stop.checked_add(rate - last),
            };
            if let Some(moved) = moved {
                debug!("Trailing stop moved from {} to {}", stop, moved);
                *stop = moved;
            }
        }
    }
}

/// Conditional trade on one currency pair
#[derive(Debug, Clone)]
pub struct Order {
    /// Trigger condition
    pub kind: OrderKind,

    /// Volume in base units
    pub volume: Decimal,

    /// Traded currency
    pub base: Currency,

    /// Pricing currency
    pub quote: Currency,

    /// Ticks the order stays valid after placement
    pub lifetime: Tick,

    /// Options forwarded to `sell`/`buy`
    pub options: TxOptions,
}

impl Order {
    /// Order on `base/quote` with default trade options
    pub fn new(kind: OrderKind, volume: Decimal, base: &str, quote: &str, lifetime: Tick) -> Result<Self> {
        if volume < Decimal::ZERO {
            return Err(Error::InvalidValue(format!(
                "Order volume must not be negative, got {}",
                volume
            )));
        }
        Ok(Self {
            kind,
            volume,
            base: base.parse()?,
            quote: quote.parse()?,
            lifetime,
            options: TxOptions::default(),
        })
    }

    /// Replace the trade options
    pub fn with_options(mut self, options: TxOptions) -> Self {
        self.options = options;
        self
    }

    fn pair(&self) -> (Currency, Currency) {
        (self.base.clone(), self.quote.clone())
    }

    fn execute(&self, account: &mut FxAccount, rate: Decimal) -> Result<Receipt> {
        match self.kind.side() {
            Side::Sell => account.sell(self.volume, rate, self.base.code(), self.quote.code(), &self.options),
            Side::Buy => account.buy(self.volume, rate, self.base.code(), self.quote.code(), &self.options),
        }
    }
}

#[derive(Debug, Clone)]
struct RestingOrder {
    id: OrderId,
    order: Order,
    expires_at: Tick,
    last_rate: Decimal,
}

/// Result of placing an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Triggered and traded immediately
    Filled(Receipt),
    /// Waiting in the book
    Resting(OrderId),
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Queue entries settled by the account
    pub settled: usize,

    /// Orders that traded
    pub filled: Vec<(OrderId, Receipt)>,

    /// Orders dropped past their expiry
    pub expired: Vec<OrderId>,

    /// Triggered orders whose trade failed, with the reason; still booked
    pub failed: Vec<(OrderId, String)>,
}

/// Quoted rates, one `base` worth `rate` units of `quote`
pub type Quotes = BTreeMap<(Currency, Currency), Decimal>;

/// Book of standing orders
#[derive(Debug, Clone, Default)]
pub struct OrderManager {
    book: BTreeMap<(Currency, Currency), Vec<RestingOrder>>,
    next_id: OrderId,
}

impl OrderManager {
    /// Empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resting orders
    pub fn len(&self) -> usize {
        self.book.values().map(Vec::len).sum()
    }

    /// Whether the book is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resting orders with their ids
    pub fn orders(&self) -> impl Iterator<Item = (OrderId, &Order)> {
        self.book
            .values()
            .flatten()
            .map(|resting| (resting.id, &resting.order))
    }

    /// Remove a resting order
    pub fn cancel(&mut self, id: OrderId) -> Option<Order> {
        for orders in self.book.values_mut() {
            if let Some(index) = orders.iter().position(|resting| resting.id == id) {
                return Some(orders.remove(index).order);
            }
        }
        None
    }

    /// Drop every order
    pub fn clear(&mut self) {
        self.book.clear();
    }

    /// Try `order` at `current_rate`; keep it in the book unless it filled
    pub fn place(&mut self, account: &mut FxAccount, order: Order, current_rate: Decimal) -> Result<Placement> {
        check_rate(current_rate)?;
        let expires_at = account.clock().checked_add(order.lifetime).ok_or_else(|| {
            Error::InvalidValue(format!("Order lifetime {} overflows the clock", order.lifetime))
        })?;

        if order.kind.triggered(current_rate) {
            let receipt = order.execute(account, current_rate)?;
            if receipt.confirmation.is_filled() {
                info!("Order filled on placement: {:?}", order.kind);
                return Ok(Placement::Filled(receipt));
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        debug!(id, expires_at, "Order resting: {:?}", order.kind);
        self.book.entry(order.pair()).or_default().push(RestingOrder {
            id,
            order,
            expires_at,
            last_rate: current_rate,
        });
        Ok(Placement::Resting(id))
    }

    /// Tick the account, then evaluate orders against `quotes`.
    ///
    /// Orders on pairs without a quote wait; expired orders are dropped
    /// either way. Fails only if the account tick or the quotes fail;
    /// errors of individual trades land in [`TickReport::failed`].
    pub fn tick(
        &mut self,
        account: &mut FxAccount,
        step: Option<Tick>,
        quotes: Option<&Quotes>,
    ) -> Result<TickReport> {
        let mut report = TickReport {
            settled: account.tick(step)?,
            ..TickReport::default()
        };
        let now = account.clock();
        let rates = match quotes {
            Some(quotes) => self.book_rates(quotes)?,
            None => BTreeMap::new(),
        };

        for (pair, orders) in self.book.iter_mut() {
            let rate = rates.get(pair).copied();
            let mut kept = Vec::with_capacity(orders.len());

            for mut resting in std::mem::take(orders) {
                if resting.expires_at < now {
                    debug!(id = resting.id, "Order expired");
                    report.expired.push(resting.id);
                    continue;
                }
                let Some(rate) = rate else {
                    kept.push(resting);
                    continue;
                };

                resting.order.kind.follow(resting.last_rate, rate);
                resting.last_rate = resting.last_rate.max(rate);

                if resting.order.kind.triggered(rate) {
                    match resting.order.execute(account, rate) {
                        Ok(receipt) if receipt.confirmation.is_filled() => {
                            info!(id = resting.id, "Order filled at {}", rate);
                            report.filled.push((resting.id, receipt));
                            continue;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(id = resting.id, "Order failed at {}: {}", rate, e);
                            report.failed.push((resting.id, e.to_string()));
                        }
                    }
                }
                kept.push(resting);
            }
            *orders = kept;
        }
        self.book.retain(|_, orders| !orders.is_empty());
        Ok(report)
    }

    /// Rate per booked pair, inverting quotes given the other way round
    fn book_rates(&self, quotes: &Quotes) -> Result<BTreeMap<(Currency, Currency), Decimal>> {
        let mut rates = BTreeMap::new();
        for (base, quote) in self.book.keys() {
            let direct = quotes.get(&(base.clone(), quote.clone())).copied();
            let inverse = quotes.get(&(quote.clone(), base.clone())).copied();

            let rate = match (direct, inverse) {
                (Some(direct), Some(inverse)) => {
                    check_rate(direct)?;
                    check_rate(inverse)?;
                    if !inverse_consistent(direct, inverse) {
                        return Err(Error::Consistency(format!(
                            "{}/{} quoted at {} but {}/{} at {}",
                            base, quote, direct, quote, base, inverse
                        )));
                    }
                    direct
                }
                (Some(direct), None) => {
                    check_rate(direct)?;
                    direct
                }
                (None, Some(inverse)) => {
                    check_rate(inverse)?;
                    Decimal::ONE.checked_div(inverse).ok_or_else(|| {
                        Error::InvalidValue(format!("Cannot invert quote {}/{} = {}", quote, base, inverse))
                    })?
                }
                (None, None) => continue,
            };
            rates.insert((base.clone(), quote.clone()), rate);
        }
        Ok(rates)
    }
}

fn check_rate(rate: Decimal) -> Result<()> {
    if rate <= Decimal::ZERO {
        return Err(Error::InvalidValue(format!("Quoted rate must be positive, got {}", rate)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cur(code: &str) -> Currency {
        Currency::new(code).unwrap()
    }

    fn quotes(entries: &[(&str, &str, Decimal)]) -> Quotes {
        entries
            .iter()
            .map(|(b, q, r)| ((cur(b), cur(q)), *r))
            .collect()
    }

    fn account() -> FxAccount {
        FxAccount::builder("EUR")
            .position("EUR", dec!(1000))
            .position("BTC", dec!(10))
            .build()
            .unwrap()
    }

    #[test]
    fn test_triggers() {
        assert!(OrderKind::StopLoss { stop: dec!(10) }.triggered(dec!(10)));
        assert!(!OrderKind::StopLoss { stop: dec!(10) }.triggered(dec!(11)));
        assert!(OrderKind::StartBuy { start: dec!(10) }.triggered(dec!(12)));
        assert!(OrderKind::BuyLimit { limit: dec!(10) }.triggered(dec!(9)));
        assert!(!OrderKind::SellLimit { limit: dec!(10) }.triggered(dec!(9)));
    }

    #[test]
    fn test_trailing_stop_follows_rises_only() {
        let mut kind = OrderKind::TrailingStopLoss {
            stop: dec!(90),
            trail: Trail::Percent,
        };
        kind.follow(dec!(100), dec!(110));
        assert_eq!(kind, OrderKind::TrailingStopLoss { stop: dec!(99), trail: Trail::Percent });
        kind.follow(dec!(110), dec!(105));
        assert_eq!(kind, OrderKind::TrailingStopLoss { stop: dec!(99), trail: Trail::Percent });

        let mut kind = OrderKind::TrailingStopLoss {
            stop: dec!(90),
            trail: Trail::Absolute,
        };
        kind.follow(dec!(100), dec!(110));
        assert_eq!(kind, OrderKind::TrailingStopLoss { stop: dec!(100), trail: Trail::Absolute });
    }

    #[test]
    fn test_place_fills_immediately_when_triggered() {
        let mut account = account();
        let mut book = OrderManager::new();
        let order = Order::new(OrderKind::SellLimit { limit: dec!(100) }, dec!(1), "BTC", "EUR", 5).unwrap();

        let placement = book.place(&mut account, order, dec!(120)).unwrap();
        assert!(matches!(placement, Placement::Filled(_)));
        assert!(book.is_empty());
        assert_eq!(account.position("BTC"), dec!(9));
        assert_eq!(account.position("EUR"), dec!(1120));
    }

    #[test]
    fn test_stop_loss_fills_on_tick() {
        let mut account = account();
        let mut book = OrderManager::new();
        let order = Order::new(OrderKind::StopLoss { stop: dec!(80) }, dec!(2), "BTC", "EUR", 10).unwrap();
        let Placement::Resting(id) = book.place(&mut account, order, dec!(100)).unwrap() else {
            panic!("order should rest");
        };

        let report = book
            .tick(&mut account, None, Some(&quotes(&[("BTC", "EUR", dec!(90))])))
            .unwrap();
        assert!(report.filled.is_empty());
        assert_eq!(book.len(), 1);

        let report = book
            .tick(&mut account, None, Some(&quotes(&[("BTC", "EUR", dec!(75))])))
            .unwrap();
        assert_eq!(report.filled.len(), 1);
        assert_eq!(report.filled[0].0, id);
        assert!(book.is_empty());
        assert_eq!(account.position("BTC"), dec!(8));
        assert_eq!(account.position("EUR"), dec!(1150));
    }

    #[test]
    fn test_inverse_quote_is_inverted() {
        let mut account = account();
        let mut book = OrderManager::new();
        let order = Order::new(OrderKind::BuyLimit { limit: dec!(50) }, dec!(1), "BTC", "EUR", 10).unwrap();
        book.place(&mut account, order, dec!(100)).unwrap();

        let report = book
            .tick(&mut account, None, Some(&quotes(&[("EUR", "BTC", dec!(0.025))])))
            .unwrap();
        assert_eq!(report.filled.len(), 1);
        assert_eq!(account.position("BTC"), dec!(11));
        assert_eq!(account.position("EUR"), dec!(960));
    }

    #[test]
    fn test_conflicting_quotes() {
        let mut account = account();
        let mut book = OrderManager::new();
        let order = Order::new(OrderKind::BuyLimit { limit: dec!(50) }, dec!(1), "BTC", "EUR", 10).unwrap();
        book.place(&mut account, order, dec!(100)).unwrap();

        let conflicting = quotes(&[("BTC", "EUR", dec!(40)), ("EUR", "BTC", dec!(0.5))]);
        let err = book.tick(&mut account, None, Some(&conflicting)).unwrap_err();
        assert!(matches!(err, Error::Consistency(_)));
    }

    #[test]
    fn test_orders_expire() {
        let mut account = account();
        let mut book = OrderManager::new();
        let order = Order::new(OrderKind::StartBuy { start: dec!(200) }, dec!(1), "BTC", "EUR", 2).unwrap();
        book.place(&mut account, order, dec!(100)).unwrap();

        book.tick(&mut account, None, None).unwrap();
        book.tick(&mut account, None, None).unwrap();
        assert_eq!(book.len(), 1);

        let report = book.tick(&mut account, None, None).unwrap();
        assert_eq!(report.expired.len(), 1);
        assert!(book.is_empty());
    }

    #[test]
    fn test_failed_order_does_not_stop_tick() {
        let mut account = account();
        let mut book = OrderManager::new();
        let oversized = Order::new(OrderKind::StopLoss { stop: dec!(80) }, dec!(50), "BTC", "EUR", 10).unwrap();
        let small = Order::new(OrderKind::StopLoss { stop: dec!(80) }, dec!(1), "BTC", "EUR", 10).unwrap();
        book.place(&mut account, oversized, dec!(100)).unwrap();
        book.place(&mut account, small, dec!(100)).unwrap();

        let report = book
            .tick(&mut account, None, Some(&quotes(&[("BTC", "EUR", dec!(70))])))
            .unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 0);
        assert_eq!(report.filled.len(), 1);
        assert_eq!(report.filled[0].0, 1);

        assert_eq!(book.orders().map(|(id, _)| id).collect::<Vec<_>>(), vec![0]);
        assert_eq!(account.position("BTC"), dec!(9));
        assert_eq!(account.position("EUR"), dec!(1070));
    }

    #[test]
    fn test_ignored_fill_keeps_order() {
        let mut account = account();
        let mut book = OrderManager::new();
        let order = Order::new(OrderKind::StopLoss { stop: dec!(80) }, dec!(50), "BTC", "EUR", 10)
            .unwrap()
            .with_options(TxOptions::new().with_coverage(ledger_core::CoverageMode::Ignore));

        let placement = book.place(&mut account, order, dec!(70)).unwrap();
        assert!(matches!(placement, Placement::Resting(_)));
        assert_eq!(account.position("BTC"), dec!(10));

        assert_eq!(book.cancel(0).map(|o| o.volume), Some(dec!(50)));
        assert!(book.is_empty());
    }
}
