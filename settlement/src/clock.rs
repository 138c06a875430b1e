//! Simulated account clock

use ledger_core::{Error, Result, Tick};
use serde::{Deserialize, Serialize};

/// Monotonic simulated clock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    now: Tick,
}

impl Clock {
    /// Clock starting at `now`
    pub fn new(now: Tick) -> Self {
        Self { now }
    }

    /// Current time
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Target of a tick: `None` is one step ahead, `Some(t)` is absolute.
    ///
    /// Going back in time is rejected; staying at `now` is allowed so a
    /// blocked drain can be retried.
    pub fn target(&self, step: Option<Tick>) -> Result<Tick> {
        match step {
            None => self.now.checked_add(1).ok_or_else(|| {
                Error::InvalidValue("Clock overflow".to_string())
            }),
            Some(t) if t < self.now => Err(Error::InvalidValue(format!(
                "Clock cannot move backwards from {} to {}",
                self.now, t
            ))),
            Some(t) => Ok(t),
        }
    }

    /// Move to `t` (never backwards)
    pub fn advance_to(&mut self, t: Tick) {
        self.now = self.now.max(t);
    }

    /// Absolute due time for a delay relative to now
    pub fn due_in(&self, delay: Tick) -> Result<Tick> {
        self.now.checked_add(delay).ok_or_else(|| {
            Error::InvalidValue(format!("Delay {} overflows the clock", delay))
        })
    }
}
