pub(crate) mod group;
pub(crate) mod rate;
pub(crate) mod rollup;
pub(crate) mod stream;
pub(crate) mod sum;

use crate::{Interval, Timestamp};

/// One output time slice `[start, end)` of a series and its aggregated value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bucket<V> {
    /// Inclusive start
    pub start: Timestamp,

    /// Exclusive end
    pub end: Timestamp,

    /// Aggregated value
    pub value: V,
}

impl<V> Bucket<V> {
    pub(crate) fn new(interval: Interval, value: V) -> Self {
        Self {
            start: interval.start,
            end: interval.end,
            value,
        }
    }

    /// The interval covered by the bucket.
    #[must_use]
    pub fn interval(&self) -> Interval {
        Interval {
            start: self.start,
            end: self.end,
        }
    }

    /// Timestamp halfway through the bucket, handy for plotting.
    #[must_use]
    pub fn middle(&self) -> Timestamp {
        let diff = self.end - self.start;
        self.start + diff / 2
    }
}
