use super::stream::Aggregation;
use crate::{Reading, Value};

/// Overlap-weighted average rate
///
/// `Σ(rate · overlap) / Σ(overlap)` over all readings touching the bucket,
/// or `None` if no reading does.
#[derive(Clone, Debug, Default)]
pub struct Rate {
    weighted: Value,
    covered: i64,
}

impl Aggregation for Rate {
    type Output = Option<Value>;

    #[allow(clippy::cast_precision_loss)]
    fn add(&mut self, reading: &Reading, overlap: i64) {
        self.weighted += reading.rate() * overlap as Value;
        self.covered += overlap;
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self) -> Self::Output {
        (self.covered > 0).then(|| self.weighted / self.covered as Value)
    }

    fn merge(total: &mut Self::Output, other: Self::Output) {
        *total = match (*total, other) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
    }
}
