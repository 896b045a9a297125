//! Injectable time source
//!
//! Core scheduling logic never reads the wall clock directly; every
//! component takes its notion of "now" from a [`Clock`]. Production code
//! uses [`SystemClock`]; tests drive a [`SimulatedClock`] forward in
//! discrete jumps (hours, days, months) and assert digest presence or
//! absence at each step.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// A source of the current instant
pub trait Clock: Send + Sync {
    /// The current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time source used in production
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced time source for deterministic tests and simulations
///
/// The clock only ever moves forward; [`SimulatedClock::advance`] takes a
/// non-negative jump and [`SimulatedClock::set`] ignores attempts to move
/// backwards.
#[derive(Debug)]
pub struct SimulatedClock {
    now: Mutex<DateTime<Utc>>,
}

impl SimulatedClock {
    /// Create a simulated clock starting at the given instant
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump the clock forward by the given duration
    pub fn advance(&self, by: Duration) {
        let mut now = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if by > Duration::zero() {
            *now += by;
        }
    }

    /// Move the clock to the given instant, if it is not in the past
    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if to > *now {
            *now = to;
        }
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
