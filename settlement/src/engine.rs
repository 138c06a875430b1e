//! Settlement engine
//!
//! Drains due queue entries into the ledger, re-checking coverage of every
//! withdrawal at settlement time. An entry whose effect would overflow its
//! balance blocks the drain like an uncovered one.

use crate::queue::ExecutionQueue;
use ledger_core::{CoverageMode, Depot, EntryKind, PendingEntry, Tick};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Result of one drain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainOutcome {
    /// Entries applied to the ledger, in order
    pub applied: Vec<PendingEntry>,

    /// Uncovered `ignore` withdrawals dropped without effect
    pub discarded: Vec<PendingEntry>,

    /// Uncovered or overflowing entry that stopped the drain; it is still queued
    pub blocked: Option<PendingEntry>,
}

impl DrainOutcome {
    /// Whether every due entry was handled
    pub fn is_complete(&self) -> bool {
        self.blocked.is_none()
    }
}

/// Applies due entries to a ledger
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementEngine {
    prohibit_debiting: bool,
}

enum Decision {
    Apply(Decimal),
    Discard,
    Block,
}

impl SettlementEngine {
    /// Create engine; `prohibit_debiting` turns `debit` entries into `except`
    pub fn new(prohibit_debiting: bool) -> Self {
        Self { prohibit_debiting }
    }

    fn decide(&self, entry: &PendingEntry, depot: &Depot) -> Decision {
        let Some(balance) = depot.after(entry.currency.code(), entry.signed_amount()) else {
            return Decision::Block;
        };
        if entry.kind == EntryKind::Deposit || balance >= Decimal::ZERO {
            return Decision::Apply(balance);
        }
        match entry.coverage {
            CoverageMode::Debit if !self.prohibit_debiting => Decision::Apply(balance),
            CoverageMode::Ignore => Decision::Discard,
            _ => Decision::Block,
        }
    }

    /// Settle every entry due by `until`, earliest first.
    ///
    /// Stops at the first uncovered entry, leaving it and everything after
    /// it queued. Entries settled before it stay settled.
    pub fn run(&self, queue: &mut ExecutionQueue, depot: &mut Depot, until: Tick) -> DrainOutcome {
        let mut outcome = DrainOutcome::default();

        loop {
            let decision = match queue.peek() {
                Some(entry) if entry.due <= until => self.decide(entry, depot),
                _ => break,
            };

            if let Decision::Block = decision {
                outcome.blocked = queue.peek().cloned();
                if let Some(entry) = &outcome.blocked {
                    warn!(
                        "Settlement blocked at t={}: {} {} not covered (balance {})",
                        entry.due,
                        entry.amount,
                        entry.currency,
                        depot.get(entry.currency.code())
                    );
                }
                break;
            }

            let Some(entry) = queue.pop_due(until) else {
                break;
            };
            match decision {
                Decision::Apply(balance) => {
                    depot.set(entry.currency.clone(), balance);
                    debug!("Settled {}", entry);
                    outcome.applied.push(entry);
                }
                _ => {
                    debug!("Discarded uncovered {}", entry);
                    outcome.discarded.push(entry);
                }
            }
        }

        if !outcome.applied.is_empty() || !outcome.discarded.is_empty() {
            info!(
                applied = outcome.applied.len(),
                discarded = outcome.discarded.len(),
                until,
                "Drained execution queue"
            );
        }
        outcome
    }
}
