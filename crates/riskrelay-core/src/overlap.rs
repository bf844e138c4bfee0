//! Day-overlap arithmetic
//!
//! Computes how much of a calendar day an event interval occupies. The
//! engine weights activity contributions by overlap minutes and
//! cohabitation contributions by overlap week-fractions, because the
//! underlying calculators expect weekly interaction frequencies rather than
//! absolute durations.

use chrono::{Days, NaiveDate, NaiveDateTime};

/// Milliseconds in one week, used for week-fraction weighting.
pub const MILLIS_PER_WEEK: f64 = 1000.0 * 60.0 * 60.0 * 24.0 * 7.0;

/// Overlap between `[begin, end)` and the day's `[00:00, 24:00)` window,
/// in milliseconds. Disjoint intervals yield zero, never a negative value.
pub fn overlap_millis(begin: NaiveDateTime, end: NaiveDateTime, day: NaiveDate) -> i64 {
    let day_begin = day_start(day);
    let day_end = day_start(day + Days::new(1));

    let clipped_end = end.min(day_end);
    let clipped_begin = begin.max(day_begin);

    (clipped_end - clipped_begin).num_milliseconds().max(0)
}

/// Overlap in minutes.
pub fn overlap_minutes(begin: NaiveDateTime, end: NaiveDateTime, day: NaiveDate) -> f64 {
    overlap_millis(begin, end, day) as f64 / 60_000.0
}

/// Overlap as a fraction of a week.
pub fn overlap_weeks(begin: NaiveDateTime, end: NaiveDateTime, day: NaiveDate) -> f64 {
    overlap_millis(begin, end, day) as f64 / MILLIS_PER_WEEK
}

/// Midnight at the start of `day`.
pub fn day_start(day: NaiveDate) -> NaiveDateTime {
    day.and_hms_opt(0, 0, 0).expect("midnight is always valid")
}
