//! Injectable clock for day-boundary arithmetic
//!
//! All windowing in the engine is relative to "today". Making the clock a
//! trait keeps convolution and overlap tests reproducible across time zones
//! and DST boundaries.

use chrono::{Local, NaiveDate};

/// Source of the current calendar day.
pub trait Clock {
    /// The current date, truncated to a day boundary.
    fn today(&self) -> NaiveDate;
}

/// Clock backed by the system's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock pinned to a fixed date, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
