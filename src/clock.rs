//! # Millisecond Clock
//!
//! The acquisition core reads time from a 32-bit millisecond counter that wraps
//! after roughly 49.7 days. `Millis` keeps that counter opaque and only offers
//! wraparound-safe comparisons, so no state machine can accidentally compare two
//! timestamps with a raw `>=`.

use std::cell::Cell;
use std::fmt;
use std::time::Instant;

/// A point on the wrapping millisecond counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Millis(pub u32);

impl Millis {
    pub const ZERO: Millis = Millis(0);

    /// The point `ms` milliseconds after `self`, wrapping.
    pub fn add_ms(self, ms: u32) -> Millis {
        Millis(self.0.wrapping_add(ms))
    }

    /// Milliseconds elapsed since `earlier`, modulo the counter width.
    pub fn since(self, earlier: Millis) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// True once `self` is at or past `deadline`.
    ///
    /// Valid as long as deadlines are set less than half the counter range
    /// (about 24 days) ahead.
    pub fn reached(self, deadline: Millis) -> bool {
        (self.0.wrapping_sub(deadline.0) as i32) >= 0
    }
}

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Source of the current time for the tick driver.
pub trait Clock {
    fn now(&self) -> Millis;
}

/// Wall clock based on `Instant`, truncated to the 32-bit counter.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Millis {
        // Truncation is the wrap.
        Millis(self.origin.elapsed().as_millis() as u32)
    }
}

/// Hand-driven clock for tests, replays and benchmarks.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u32>,
}

impl ManualClock {
    pub fn new(start: u32) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        Millis(self.now.get())
    }
}
