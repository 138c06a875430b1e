//! Balance projections for delayed obligations
//!
//! Each strategy answers one question: starting from `start` (the balance
//! after the request's instant legs), what is the lowest balance of a
//! currency that must be honored once the request's delayed legs join the
//! queue?

use crate::plan::Leg;
use ledger_core::{CoveragePolicy, Currency, Tick};
use rust_decimal::Decimal;
use settlement::ExecutionQueue;
use std::fmt::Debug;

/// Projection strategy for one coverage policy
pub trait Projection: Debug + Send + Sync {
    /// Lowest balance of `currency` to honor. `delayed` holds only the
    /// request's delayed legs in `currency` and contains at least one debit.
    fn lowest(
        &self,
        start: Decimal,
        currency: &Currency,
        delayed: &[&Leg],
        queue: &ExecutionQueue,
        clock: Tick,
    ) -> Decimal;
}

fn horizon(delayed: &[&Leg]) -> Tick {
    delayed
        .iter()
        .filter(|leg| leg.is_debit())
        .filter_map(|leg| leg.due)
        .max()
        .unwrap_or(0)
}

/// Non-negative at every point up to the latest new debit.
///
/// Points are the due times of queued entries and new legs; each point
/// counts everything due by then, so same-time deposits offset withdrawals
/// as they do at settlement.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinBackward;

impl Projection for MinBackward {
    fn lowest(
        &self,
        start: Decimal,
        currency: &Currency,
        delayed: &[&Leg],
        queue: &ExecutionQueue,
        _clock: Tick,
    ) -> Decimal {
        let until = horizon(delayed);
        let mut points = queue.net_by_due(currency, until);
        for leg in delayed {
            if let Some(due) = leg.due.filter(|due| *due <= until) {
                *points.entry(due).or_insert(Decimal::ZERO) += leg.signed_amount();
            }
        }

        let mut balance = start;
        let mut lowest = start;
        for net in points.values() {
            balance += *net;
            lowest = lowest.min(balance);
        }
        lowest
    }
}

/// Non-negative once everything pending has settled, in any order.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxForward;

impl Projection for MaxForward {
    fn lowest(
        &self,
        start: Decimal,
        currency: &Currency,
        delayed: &[&Leg],
        queue: &ExecutionQueue,
        _clock: Tick,
    ) -> Decimal {
        let until = queue
            .max_due_time()
            .map_or(horizon(delayed), |last| last.max(horizon(delayed)));
        let pending = queue.net_until(currency.code(), until);
        let new: Decimal = delayed.iter().map(|leg| leg.signed_amount()).sum();
        start + pending + new
    }
}

/// Queue ignored; only the current balance and the request itself count.
#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot;

impl Projection for Snapshot {
    fn lowest(
        &self,
        start: Decimal,
        _currency: &Currency,
        delayed: &[&Leg],
        _queue: &ExecutionQueue,
        _clock: Tick,
    ) -> Decimal {
        start + delayed.iter().map(|leg| leg.signed_amount()).sum::<Decimal>()
    }
}

/// Strategy behind a policy
pub fn projection_for(policy: CoveragePolicy) -> &'static dyn Projection {
    match policy {
        CoveragePolicy::MinBackward => &MinBackward,
        CoveragePolicy::MaxForward => &MaxForward,
        CoveragePolicy::Disabled => &Snapshot,
    }
}
