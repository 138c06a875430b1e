//! Coverage checking of requested obligations

use crate::plan::Leg;
use crate::projection::projection_for;
use ledger_core::{CoveragePolicy, Currency, Depot, Error, Result, Tick};
use rust_decimal::Decimal;
use settlement::ExecutionQueue;
use std::collections::BTreeMap;
use tracing::debug;

/// Search stops once the bracket is this narrow
const SEARCH_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 20);

/// Upper bound on search steps
const SEARCH_STEPS: usize = 256;

/// Currency that cannot be funded and its lowest projected balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    /// Currency that runs negative
    pub currency: Currency,

    /// Lowest projected balance (negative)
    pub lowest: Decimal,
}

impl Shortfall {
    /// Coverage error describing the shortfall
    pub fn into_error(self, policy: CoveragePolicy) -> Error {
        Error::Coverage(format!(
            "{} would fall to {} under {} coverage",
            self.currency, self.lowest, policy
        ))
    }
}

/// Funding check for obligations under one policy
#[derive(Debug, Clone, Copy, Default)]
pub struct CoverageChecker {
    policy: CoveragePolicy,
}

impl CoverageChecker {
    /// Create new coverage checker
    pub fn new(policy: CoveragePolicy) -> Self {
        Self { policy }
    }

    /// Active policy
    pub fn policy(&self) -> CoveragePolicy {
        self.policy
    }

    /// Lowest balance each debited currency must honor.
    ///
    /// Instant legs are checked against the current balance only. Delayed
    /// legs go through the policy's projection, starting from the balance
    /// after the instant legs.
    pub fn margins(
        &self,
        legs: &[Leg],
        depot: &Depot,
        queue: &ExecutionQueue,
        clock: Tick,
    ) -> BTreeMap<Currency, Decimal> {
        let projection = projection_for(self.policy);
        let mut margins = BTreeMap::new();

        let debited: Vec<&Currency> = {
            let mut seen: Vec<&Currency> = legs.iter().filter(|l| l.is_debit()).map(|l| &l.currency).collect();
            seen.sort();
            seen.dedup();
            seen
        };

        for currency in debited {
            let mine: Vec<&Leg> = legs.iter().filter(|l| &l.currency == currency).collect();
            let start = depot.get(currency.code())
                + mine
                    .iter()
                    .filter(|l| l.is_instant())
                    .map(|l| l.signed_amount())
                    .sum::<Decimal>();

            let mut lowest: Option<Decimal> = None;
            if mine.iter().any(|l| l.is_instant() && l.is_debit()) {
                lowest = Some(start);
            }

            let delayed: Vec<&Leg> = mine.iter().copied().filter(|l| !l.is_instant()).collect();
            if delayed.iter().any(|l| l.is_debit()) {
                let projected = projection.lowest(start, currency, &delayed, queue, clock);
                lowest = Some(lowest.map_or(projected, |l| l.min(projected)));
            }

            if let Some(lowest) = lowest {
                margins.insert(currency.clone(), lowest);
            }
        }
        margins
    }

    /// Lowest margin over every debited currency, `None` if nothing is debited
    pub fn margin(&self, legs: &[Leg], depot: &Depot, queue: &ExecutionQueue, clock: Tick) -> Option<Decimal> {
        self.margins(legs, depot, queue, clock).into_values().min()
    }

    /// Worst currency if any runs negative
    pub fn shortfall(
        &self,
        legs: &[Leg],
        depot: &Depot,
        queue: &ExecutionQueue,
        clock: Tick,
    ) -> Option<Shortfall> {
        self.margins(legs, depot, queue, clock)
            .into_iter()
            .filter(|(_, lowest)| *lowest < Decimal::ZERO)
            .min_by(|a, b| a.1.cmp(&b.1))
            .map(|(currency, lowest)| Shortfall { currency, lowest })
    }

    /// Reject with a coverage error if any currency runs negative
    pub fn check(&self, legs: &[Leg], depot: &Depot, queue: &ExecutionQueue, clock: Tick) -> Result<()> {
        match self.shortfall(legs, depot, queue, clock) {
            Some(shortfall) => Err(shortfall.into_error(self.policy)),
            None => Ok(()),
        }
    }

    /// Largest principal in `[0, upper]` whose plan is covered.
    ///
    /// `plan` builds the legs for a principal (fees included). Returns
    /// `None` when even a zero principal is not covered. Uses a bracketing
    /// false-position search (Illinois variant), exact when the margin is
    /// linear in the principal.
    pub fn largest_covered<F>(
        &self,
        upper: Decimal,
        mut plan: F,
        depot: &Depot,
        queue: &ExecutionQueue,
        clock: Tick,
    ) -> Result<Option<Decimal>>
    where
        F: FnMut(Decimal) -> Result<Vec<Leg>>,
    {
        let mut margin_at = |x: Decimal| -> Result<Decimal> {
            Ok(self
                .margin(&plan(x)?, depot, queue, clock)
                .unwrap_or(Decimal::MAX))
        };

        let f_upper = margin_at(upper)?;
        if f_upper >= Decimal::ZERO {
            return Ok(Some(upper));
        }
        let f_zero = margin_at(Decimal::ZERO)?;
        if f_zero < Decimal::ZERO {
            return Ok(None);
        }

        let (mut lo, mut f_lo) = (Decimal::ZERO, f_zero);
        let (mut hi, mut f_hi) = (upper, f_upper);
        let mut last_kept_lo: Option<bool> = None;

        for _ in 0..SEARCH_STEPS {
            if hi - lo <= SEARCH_TOLERANCE || f_lo.is_zero() {
                break;
            }
            let secant = (hi - lo)
                .checked_mul(f_lo)
                .and_then(|num| f_lo.checked_sub(f_hi).and_then(|span| num.checked_div(span)))
                .map(|step| lo + step);
            let x = match secant {
                Some(x) if x > lo && x < hi => x,
                _ => (lo + hi) / Decimal::TWO,
            };

            let f_x = margin_at(x)?;
            if f_x >= Decimal::ZERO {
                lo = x;
                f_lo = f_x;
                if last_kept_lo == Some(false) {
                    f_hi /= Decimal::TWO;
                }
                last_kept_lo = Some(false);
            } else {
                hi = x;
                f_hi = f_x;
                if last_kept_lo == Some(true) {
                    f_lo /= Decimal::TWO;
                }
                last_kept_lo = Some(true);
            }
        }

        debug!(requested = %upper, covered = %lo, "Reduced principal to coverable amount");
        Ok(Some(lo))
    }
}
