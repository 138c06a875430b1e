//! Time-ordered execution queue of pending ledger effects
//!
//! Entries settle by `(due, deposits before withdrawals, insertion order)`.
//! The queue supports:
//! - insert and peek-min
//! - ordered pop of entries due by a given time
//! - the latest due time still pending (the whole horizon)
//! - net projections per currency, used by coverage checks

use ledger_core::{Currency, PendingEntry, Tick};
use rust_decimal::Decimal;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};
use tracing::debug;

#[derive(Debug, Clone)]
struct Scheduled {
    seq: u64,
    entry: PendingEntry,
}

impl Scheduled {
    fn key(&self) -> (Tick, u8, u64) {
        (self.entry.due, self.entry.kind.drain_rank(), self.seq)
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Min-priority queue of pending entries
#[derive(Debug, Clone, Default)]
pub struct ExecutionQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
}

impl ExecutionQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an entry
    pub fn insert(&mut self, entry: PendingEntry) {
        debug!("Scheduling {}", entry);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Scheduled { seq, entry }));
    }

    /// Next entry to settle
    pub fn peek(&self) -> Option<&PendingEntry> {
        self.heap.peek().map(|Reverse(s)| &s.entry)
    }

    /// Remove the next entry if it is due by `until`
    pub fn pop_due(&mut self, until: Tick) -> Option<PendingEntry> {
        match self.peek() {
            Some(entry) if entry.due <= until => self.heap.pop().map(|Reverse(s)| s.entry),
            _ => None,
        }
    }

    /// Remove every entry due by `until`, in settlement order
    pub fn drain_until(&mut self, until: Tick) -> Vec<PendingEntry> {
        let mut drained = Vec::new();
        while let Some(entry) = self.pop_due(until) {
            drained.push(entry);
        }
        drained
    }

    /// Latest due time in the queue
    pub fn max_due_time(&self) -> Option<Tick> {
        self.heap.iter().map(|Reverse(s)| s.entry.due).max()
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// No pending entries
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pending entries in settlement order
    pub fn entries(&self) -> Vec<&PendingEntry> {
        let mut scheduled: Vec<&Scheduled> = self.heap.iter().map(|Reverse(s)| s).collect();
        scheduled.sort();
        scheduled.into_iter().map(|s| &s.entry).collect()
    }

    /// Whether an equal entry is pending
    pub fn contains(&self, entry: &PendingEntry) -> bool {
        self.heap.iter().any(|Reverse(s)| &s.entry == entry)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.heap.clear();
        self.next_seq = 0;
    }

    /// Sum of every pending amount in `currency`, ignoring sign; `None` on overflow.
    ///
    /// Bounds the magnitude of any running balance the queue can produce.
    pub fn gross(&self, currency: &str) -> Option<Decimal> {
        self.heap
            .iter()
            .map(|Reverse(s)| &s.entry)
            .filter(|e| e.currency.code() == currency)
            .try_fold(Decimal::ZERO, |sum, e| sum.checked_add(e.amount))
    }

    /// Net signed effect on `currency` of every entry due by `until`
    pub fn net_until(&self, currency: &str, until: Tick) -> Decimal {
        self.heap
            .iter()
            .map(|Reverse(s)| &s.entry)
            .filter(|e| e.currency.code() == currency && e.due <= until)
            .map(PendingEntry::signed_amount)
            .sum()
    }

    /// Net signed effect on `currency` per due time, for entries due by `until`
    pub fn net_by_due(&self, currency: &Currency, until: Tick) -> BTreeMap<Tick, Decimal> {
        let mut points = BTreeMap::new();
        for Reverse(s) in &self.heap {
            let e = &s.entry;
            if &e.currency == currency && e.due <= until {
                *points.entry(e.due).or_insert(Decimal::ZERO) += e.signed_amount();
            }
        }
        points
    }
}

impl Extend<PendingEntry> for ExecutionQueue {
    fn extend<I: IntoIterator<Item = PendingEntry>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

impl FromIterator<PendingEntry> for ExecutionQueue {
    fn from_iter<I: IntoIterator<Item = PendingEntry>>(iter: I) -> Self {
        let mut queue = Self::new();
        queue.extend(iter);
        queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{CoverageMode, EntryKind};
    use rust_decimal_macros::dec;

    fn entry(due: Tick, kind: &str, amount: Decimal, currency: &str) -> PendingEntry {
        PendingEntry::parse(due, kind, amount, currency, None).unwrap()
    }

    #[test]
    fn test_orders_by_due_then_kind_then_insertion() {
        let mut queue = ExecutionQueue::new();
        queue.insert(entry(5, "withdraw", dec!(1), "EUR"));
        queue.insert(entry(3, "withdraw", dec!(2), "EUR"));
        queue.insert(entry(5, "deposit", dec!(3), "EUR"));
        queue.insert(entry(5, "withdraw", dec!(4), "EUR"));

        let amounts: Vec<Decimal> = queue.drain_until(10).iter().map(|e| e.amount).collect();
        assert_eq!(amounts, vec![dec!(2), dec!(3), dec!(1), dec!(4)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_stops_at_until() {
        let mut queue = ExecutionQueue::new();
        queue.insert(entry(1, "deposit", dec!(1), "EUR"));
        queue.insert(entry(2, "deposit", dec!(2), "EUR"));
        queue.insert(entry(7, "deposit", dec!(7), "EUR"));

        assert_eq!(queue.drain_until(2).len(), 2);
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_due(6).is_none());
        assert_eq!(queue.peek().map(|e| e.due), Some(7));
    }

    #[test]
    fn test_max_due_time() {
        let mut queue = ExecutionQueue::new();
        assert_eq!(queue.max_due_time(), None);
        queue.insert(entry(4, "deposit", dec!(1), "EUR"));
        queue.insert(entry(9, "withdraw", dec!(1), "BTC"));
        queue.insert(entry(2, "withdraw", dec!(1), "EUR"));
        assert_eq!(queue.max_due_time(), Some(9));
    }

    #[test]
    fn test_projection_sums() {
        let mut queue = ExecutionQueue::new();
        queue.insert(entry(1, "withdraw", dec!(10), "EUR"));
        queue.insert(entry(3, "withdraw", dec!(20), "EUR"));
        queue.insert(entry(3, "deposit", dec!(5), "EUR"));
        queue.insert(entry(6, "withdraw", dec!(40), "EUR"));
        queue.insert(entry(3, "withdraw", dec!(99), "BTC"));

        assert_eq!(queue.gross("EUR"), Some(dec!(75)));
        assert_eq!(queue.gross("USD"), Some(Decimal::ZERO));
        assert_eq!(queue.net_until("EUR", 3), dec!(-25));

        let eur = Currency::new("EUR").unwrap();
        let points = queue.net_by_due(&eur, 5);
        assert_eq!(points.len(), 2);
        assert_eq!(points[&3], dec!(-15));

        queue.insert(entry(9, "deposit", Decimal::MAX, "BTC"));
        assert_eq!(queue.gross("BTC"), None);
    }

    #[test]
    fn test_entries_listing_is_ordered() {
        let queue: ExecutionQueue = vec![
            entry(8, "withdraw", dec!(1), "EUR"),
            entry(2, "deposit", dec!(1), "EUR"),
        ]
        .into_iter()
        .collect();

        let listed = queue.entries();
        assert_eq!(listed[0].due, 2);
        assert_eq!(listed[1].due, 8);
        assert!(queue.contains(&PendingEntry {
            due: 8,
            kind: EntryKind::Withdraw,
            amount: dec!(1),
            currency: Currency::new("EUR").unwrap(),
            coverage: CoverageMode::Except,
        }));
    }
}
