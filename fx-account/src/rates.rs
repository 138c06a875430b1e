//! Exchange rates and valuation
//!
//! A rate `(from, to) = r` means one unit of `from` is worth `r` units of
//! `to`. Valuation walks a conversion graph built from the direct rates and
//! their inverses, so any currency connected to the reference currency by a
//! chain of known rates can be valued.

use ledger_core::{Currency, Depot, Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Largest accepted deviation of `r_ab * r_ba` from one
pub const INVERSE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 18);

/// Whether `r_ab` and `r_ba` describe the same price
pub fn inverse_consistent(r_ab: Decimal, r_ba: Decimal) -> bool {
    match r_ab.checked_mul(r_ba) {
        Some(product) => (product - Decimal::ONE).abs() <= INVERSE_TOLERANCE,
        None => false,
    }
}

/// Currency-pair rate store with a freshness flag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateTable {
    rates: BTreeMap<(Currency, Currency), Decimal>,
    fresh: bool,
}

impl ExchangeRateTable {
    /// Empty, stale table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding `rates`, each positive; same-currency pairs are kept
    /// but play no part in valuation
    pub fn with_rates<I>(rates: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Currency, Currency, Decimal)>,
    {
        let mut table = Self::new();
        for (from, to, rate) in rates {
            validate_rate(&from, &to, rate)?;
            table.rates.insert((from, to), rate);
        }
        Ok(table)
    }

    /// Table from `(from, to, rate)` triples of currency codes
    pub fn from_pairs(rates: &[(&str, &str, Decimal)]) -> Result<Self> {
        let parsed = rates
            .iter()
            .map(|(from, to, rate)| Ok((Currency::new(*from)?, Currency::new(*to)?, *rate)))
            .collect::<Result<Vec<_>>>()?;
        Self::with_rates(parsed)
    }

    /// Direct rate for a pair
    pub fn get(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        self.rates.get(&(from.clone(), to.clone())).copied()
    }

    /// Stored rates
    pub fn iter(&self) -> impl Iterator<Item = (&Currency, &Currency, &Decimal)> {
        self.rates.iter().map(|((from, to), rate)| (from, to, rate))
    }

    /// Number of stored pairs
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Whether no pair is stored
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Whether rates were asserted since the last ambient valuation
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Set one rate and mark the table fresh
    pub fn update(&mut self, rate: Decimal, from: Currency, to: Currency) -> Result<()> {
        validate_update(&from, &to, rate)?;
        self.rates.insert((from, to), rate);
        self.fresh = true;
        Ok(())
    }

    /// Set many rates at once; nothing is applied unless every entry is valid
    pub fn update_batch(&mut self, rates: &[Decimal], pairs: &[(Currency, Currency)]) -> Result<()> {
        if rates.is_empty() || rates.len() != pairs.len() {
            return Err(Error::InvalidValue(format!(
                "Batch needs matching, non-empty rate and pair lists (got {} rates, {} pairs)",
                rates.len(),
                pairs.len()
            )));
        }
        for ((from, to), rate) in pairs.iter().zip(rates) {
            validate_update(from, to, *rate)?;
        }
        for ((from, to), rate) in pairs.iter().zip(rates) {
            self.rates.insert((from.clone(), to.clone()), *rate);
        }
        self.fresh = true;
        Ok(())
    }

    /// Read and clear the freshness flag
    pub fn take_fresh(&mut self) -> bool {
        std::mem::replace(&mut self.fresh, false)
    }

    /// Drop every rate and the freshness flag
    pub fn clear(&mut self) {
        self.rates.clear();
        self.fresh = false;
    }
}

fn validate_update(from: &Currency, to: &Currency, rate: Decimal) -> Result<()> {
    if from == to {
        return Err(Error::InvalidValue(format!(
            "Exchange rate needs two distinct currencies, got {}/{}",
            from, to
        )));
    }
    validate_rate(from, to, rate)
}

fn validate_rate(from: &Currency, to: &Currency, rate: Decimal) -> Result<()> {
    if rate <= Decimal::ZERO {
        return Err(Error::InvalidValue(format!(
            "Exchange rate {}/{} must be positive, got {}",
            from, to, rate
        )));
    }
    Ok(())
}

/// Conversion graph over direct rates and their inverses
#[derive(Debug, Clone, Default)]
pub struct ConversionGraph {
    /// `edges[v]` holds `(u, f)` meaning one `u` is worth `f` units of `v`
    edges: BTreeMap<Currency, Vec<(Currency, Decimal)>>,
}

impl ConversionGraph {
    /// Build the graph, rejecting pairs whose direct and inverse rates disagree
    pub fn build(table: &ExchangeRateTable) -> Result<Self> {
        let mut graph = Self::default();
        for (from, to, rate) in table.iter() {
            if from == to || *rate <= Decimal::ZERO {
                continue;
            }
            if let Some(inverse) = table.get(to, from) {
                if !inverse_consistent(*rate, inverse) {
                    return Err(Error::Consistency(format!(
                        "{}/{} = {} does not invert {}/{} = {}",
                        from, to, rate, to, from, inverse
                    )));
                }
            }
            graph.link(from, to, *rate)?;
        }
        Ok(graph)
    }

    fn link(&mut self, from: &Currency, to: &Currency, rate: Decimal) -> Result<()> {
        let inverse = Decimal::ONE.checked_div(rate).ok_or_else(|| {
            Error::InvalidValue(format!("Cannot invert rate {}/{} = {}", from, to, rate))
        })?;
        self.edges
            .entry(to.clone())
            .or_default()
            .push((from.clone(), rate));
        self.edges
            .entry(from.clone())
            .or_default()
            .push((to.clone(), inverse));
        Ok(())
    }

    /// Worth of one unit of every reachable currency in `reference`
    pub fn values_in(&self, reference: &Currency) -> BTreeMap<Currency, Decimal> {
        let mut values = BTreeMap::new();
        values.insert(reference.clone(), Decimal::ONE);

        let mut frontier = VecDeque::from([reference.clone()]);
        while let Some(current) = frontier.pop_front() {
            let worth = values[&current];
            for (neighbor, factor) in self.edges.get(&current).into_iter().flatten() {
                if values.contains_key(neighbor) {
                    continue;
                }
                if let Some(value) = factor.checked_mul(worth) {
                    values.insert(neighbor.clone(), value);
                    frontier.push_back(neighbor.clone());
                }
            }
        }
        values
    }

    /// Conversion factor from one currency to another
    pub fn rate(&self, from: &Currency, to: &Currency) -> Result<Decimal> {
        self.values_in(to)
            .get(from)
            .copied()
            .ok_or_else(|| Error::CurrencyUnknown(format!("No conversion path from {} to {}", from, to)))
    }
}

/// Sum of every held balance, in `reference`
pub fn valuate(depot: &Depot, table: &ExchangeRateTable, reference: &Currency) -> Result<Decimal> {
    let values = ConversionGraph::build(table)?.values_in(reference);

    let mut total = Decimal::ZERO;
    for (currency, balance) in depot.iter() {
        let worth = values.get(currency).ok_or_else(|| {
            Error::CurrencyUnknown(format!(
                "{} cannot be converted into {} with the given rates",
                currency, reference
            ))
        })?;
        total += balance.checked_mul(*worth).ok_or_else(|| {
            Error::InvalidValue(format!("Value of {} {} overflows", balance, currency))
        })?;
    }

    debug!("Valued {} positions at {} {}", depot.len(), total, reference);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cur(code: &str) -> Currency {
        Currency::new(code).unwrap()
    }

    fn depot() -> Depot {
        [
            (cur("BTC"), dec!(100)),
            (cur("ETH"), dec!(100)),
            (cur("EUR"), dec!(50)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_direct_rates() {
        let table = ExchangeRateTable::from_pairs(&[("BTC", "EUR", dec!(2)), ("ETH", "EUR", dec!(1))]).unwrap();
        assert_eq!(valuate(&depot(), &table, &cur("EUR")).unwrap(), dec!(350));
    }

    #[test]
    fn test_inverse_and_indirect_rates() {
        let table = ExchangeRateTable::from_pairs(&[
            ("EUR", "BTC", dec!(0.5)),
            ("ETH", "EUR", dec!(1)),
            ("EUR", "USD", dec!(100)),
        ])
        .unwrap();
        assert_eq!(valuate(&depot(), &table, &cur("EUR")).unwrap(), dec!(350));

        let table = ExchangeRateTable::from_pairs(&[
            ("BTC", "USD", dec!(2)),
            ("ETH", "USD", dec!(1)),
            ("EUR", "USD", dec!(1)),
        ])
        .unwrap();
        assert_eq!(valuate(&depot(), &table, &cur("USD")).unwrap(), dec!(350));
    }

    #[test]
    fn test_same_currency_pair_ignored() {
        let table = ExchangeRateTable::from_pairs(&[
            ("BTC", "EUR", dec!(2)),
            ("ETH", "EUR", dec!(1)),
            ("EUR", "USD", dec!(100)),
            ("ETH", "USD", dec!(100)),
            ("USD", "USD", dec!(2000)),
        ])
        .unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(valuate(&depot(), &table, &cur("EUR")).unwrap(), dec!(350));

        let graph = ConversionGraph::build(&table).unwrap();
        assert_eq!(graph.rate(&cur("USD"), &cur("USD")).unwrap(), dec!(1));
    }

    #[test]
    fn test_conflicting_inverse_rejected() {
        let table = ExchangeRateTable::from_pairs(&[
            ("BTC", "EUR", dec!(2)),
            ("ETH", "EUR", dec!(1)),
            ("EUR", "ETH", dec!(2)),
        ])
        .unwrap();
        assert!(matches!(
            valuate(&depot(), &table, &cur("EUR")),
            Err(Error::Consistency(_))
        ));

        let table = ExchangeRateTable::from_pairs(&[
            ("BTC", "EUR", dec!(2)),
            ("EUR", "BTC", dec!(0.5)),
            ("ETH", "EUR", dec!(1)),
        ])
        .unwrap();
        assert_eq!(valuate(&depot(), &table, &cur("EUR")).unwrap(), dec!(350));
    }

    #[test]
    fn test_unreachable_currency() {
        let table = ExchangeRateTable::from_pairs(&[("BTC", "EUR", dec!(2))]).unwrap();
        assert!(matches!(
            valuate(&depot(), &table, &cur("EUR")),
            Err(Error::CurrencyUnknown(_))
        ));
    }

    #[test]
    fn test_rate_round_trip() {
        let table = ExchangeRateTable::from_pairs(&[("BTC", "EUR", dec!(3))]).unwrap();
        let graph = ConversionGraph::build(&table).unwrap();
        assert_eq!(graph.rate(&cur("BTC"), &cur("EUR")).unwrap(), dec!(3));
        assert_eq!(graph.rate(&cur("EUR"), &cur("EUR")).unwrap(), dec!(1));
        assert!(graph.rate(&cur("BTC"), &cur("USD")).is_err());
    }

    #[test]
    fn test_update_validation_and_freshness() {
        let mut table = ExchangeRateTable::new();
        assert!(!table.is_fresh());
        assert!(table.update(dec!(0), cur("BTC"), cur("EUR")).is_err());
        assert!(table.update(dec!(2), cur("EUR"), cur("EUR")).is_err());
        assert!(!table.is_fresh());

        table.update(dec!(2), cur("BTC"), cur("EUR")).unwrap();
        assert!(table.take_fresh());
        assert!(!table.take_fresh());
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let mut table = ExchangeRateTable::new();
        let pairs = [(cur("BTC"), cur("EUR")), (cur("ETH"), cur("EUR"))];

        assert!(table.update_batch(&[dec!(2)], &pairs).is_err());
        assert!(table.update_batch(&[], &[]).is_err());
        assert!(table.update_batch(&[dec!(2), dec!(-1)], &pairs).is_err());
        assert!(table.is_empty());
        assert!(!table.is_fresh());

        table.update_batch(&[dec!(2), dec!(1)], &pairs).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.is_fresh());
    }
}
