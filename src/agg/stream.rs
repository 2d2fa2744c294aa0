use super::Bucket;
use crate::{planner::Buckets, Reading};
use std::marker::PhantomData;

/// Defines how readings overlapping a bucket are combined.
///
/// - `add` is called once per reading that shares a positive duration with the bucket
///
/// - `finish` turns the accumulator into the bucket value
///
/// - `merge` adds one member's bucket value into a group's
pub trait Aggregation: Default {
    /// Value reported per bucket
    type Output;

    /// Accounts for `reading`, which overlaps the bucket by `overlap` milliseconds.
    fn add(&mut self, reading: &Reading, overlap: i64);

    /// Produces the bucket value.
    fn finish(self) -> Self::Output;

    /// Adds `other` into `total`, for buckets of different meters in one group.
    fn merge(total: &mut Self::Output, other: Self::Output);
}

/// A streaming distributor
///
/// Takes in readings and a bucket plan, and emits one aggregated bucket per planned interval.
///
/// Readings are swept in start order: a reading becomes active once a bucket
/// ends after its start, and retires once a bucket starts at or after its end.
pub struct Distributor<A: Aggregation> {
    buckets: Buckets,
    pending: std::iter::Peekable<std::vec::IntoIter<Reading>>,
    active: Vec<Reading>,
    phantom: PhantomData<A>,
}

impl<A: Aggregation> Distributor<A> {
    /// Creates a distributor over `buckets`.
    ///
    /// The order of `readings` does not matter.
    #[must_use]
    pub fn new(buckets: Buckets, mut readings: Vec<Reading>) -> Self {
        readings.sort_by(Reading::sort_key);

        Self {
            buckets,
            pending: readings.into_iter().peekable(),
            active: Vec::new(),
            phantom: PhantomData,
        }
    }
}

impl<A: Aggregation> Iterator for Distributor<A> {
    type Item = Bucket<A::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        let interval = self.buckets.next()?;

        // NOTE: Activate readings starting before the bucket ends
        while let Some(reading) = self.pending.next_if(|r| r.start() < interval.end) {
            self.active.push(reading);
        }

        // NOTE: Retire readings ending at or before the bucket start
        self.active.retain(|r| r.end() > interval.start);

        let mut accu = A::default();

        for reading in &self.active {
            let overlap = reading.interval().overlap(&interval);
            if overlap > 0 {
                accu.add(reading, overlap);
            }
        }

        Some(Bucket::new(interval, accu.finish()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.buckets.size_hint()
    }
}
