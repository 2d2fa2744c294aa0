use super::stream::Aggregation;
use crate::{interval::prorate, Reading, Value};

/// Prorated total
///
/// Each reading contributes the share of its quantity that falls into the
/// bucket, assuming a constant rate within the reading. Zero if nothing overlaps.
#[derive(Clone, Debug, Default)]
pub struct Sum(Value);

impl Aggregation for Sum {
    type Output = Value;

    fn add(&mut self, reading: &Reading, overlap: i64) {
        self.0 += prorate(reading.quantity(), reading.duration(), overlap);
    }

    fn finish(self) -> Self::Output {
        self.0
    }

    fn merge(total: &mut Self::Output, other: Self::Output) {
        *total += other;
    }
}
