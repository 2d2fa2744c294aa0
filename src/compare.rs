//! Current-vs-previous period comparison
//!
//! Given the elapsed part of a current period `[current_start, current_end)`
//! and the length `d` of the comparison period, three windows are clipped out
//! of an entity's readings:
//!
//! ```text
//!             prev_full                        current
//! |---------------------------------|-----------------|......
//! cs - d                            cs                ce
//! |-----------------|
//!    prev_aligned
//! ```
//!
//! `prev_aligned` has the same length as `current`, so "used so far this
//! period" can be compared with "used by the same point last period".

use crate::{Interval, Reading, TimeRange, Timestamp, Value};

/// Usage of one entity in the current and previous period.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CompareResult {
    /// Usage within `[current_start, current_end)`
    pub current_use: Value,

    /// Usage within the whole previous period
    pub prev_use_total: Value,

    /// Usage within the previous period, up to the same elapsed time as the current one
    pub prev_use_for_current: Value,
}

/// The three windows of a comparison.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompareWindows {
    current: Interval,
    prev_full: Interval,
    prev_aligned: Interval,
}

impl CompareWindows {
    /// Lays out the windows.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRange`] if `current_start > current_end`,
    /// if `compare_duration` is not positive, or if the windows underflow the timeline.
    pub fn new(
        current_start: Timestamp,
        current_end: Timestamp,
        compare_duration: i64,
    ) -> crate::Result<Self> {
        if compare_duration <= 0 {
            return Err(crate::Error::InvalidRange);
        }

        let current = Interval::new(current_start, current_end)?;

        let elapsed = current
            .checked_duration()
            .ok_or(crate::Error::InvalidRange)?;

        let prev_start = current_start
            .checked_sub(compare_duration)
            .ok_or(crate::Error::InvalidRange)?;

        let prev_aligned_end = prev_start
            .checked_add(elapsed)
            .ok_or(crate::Error::InvalidRange)?;

        Ok(Self {
            current,
            prev_full: Interval {
                start: prev_start,
                end: current_start,
            },
            prev_aligned: Interval {
                start: prev_start,
                end: prev_aligned_end,
            },
        })
    }

    /// `[current_start, current_end)`
    #[must_use]
    pub fn current(&self) -> Interval {
        self.current
    }

    /// `[current_start - d, current_start)`
    #[must_use]
    pub fn prev_full(&self) -> Interval {
        self.prev_full
    }

    /// `[current_start - d, current_start - d + (current_end - current_start))`
    #[must_use]
    pub fn prev_aligned(&self) -> Interval {
        self.prev_aligned
    }

    /// Range that covers all three windows.
    #[must_use]
    pub fn fetch_range(&self) -> TimeRange {
        TimeRange::between(self.prev_full.start, self.current.end)
    }

    /// Clips `readings` against all three windows.
    ///
    /// The order of `readings` does not matter.
    #[must_use]
    pub fn compute(&self, readings: &[Reading]) -> CompareResult {
        let mut readings = readings.to_vec();
        readings.sort_by(Reading::sort_key);

        readings
            .iter()
            .fold(CompareResult::default(), |mut result, reading| {
                result.current_use += reading.prorate(&self.current);
                result.prev_use_total += reading.prorate(&self.prev_full);
                result.prev_use_for_current += reading.prorate(&self.prev_aligned);
                result
            })
    }
}
