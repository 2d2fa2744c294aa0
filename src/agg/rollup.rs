use super::{rate::Rate, stream::Aggregation, Bucket};
use crate::{
    planner::{BarWidth, Plan, Precision},
    Reading, Timestamp, TimeRange, Value,
};
use std::collections::BTreeMap;

/// Computes sparse, calendar-aligned rate rows at one precision.
///
/// Each reading is cut at the precision boundaries it spans, and every
/// resulting unit reports the overlap-weighted rate of all readings touching it.
/// Units no reading touches are left out, so there are no absent rows.
///
/// Only rows intersecting `range` are returned, ordered by start.
#[must_use]
pub fn rollup(readings: &[Reading], precision: Precision, range: TimeRange) -> Vec<Bucket<Value>> {
    let plan = Plan::Width(BarWidth::Precision(precision));

    let mut readings = readings.to_vec();
    readings.sort_by(Reading::sort_key);

    let mut rows: BTreeMap<Timestamp, Rate> = BTreeMap::new();

    for reading in &readings {
        for unit in plan.buckets(reading.interval()) {
            if !range.intersects(&unit) {
                continue;
            }

            let overlap = reading.interval().overlap(&unit);
            if overlap > 0 {
                rows.entry(unit.start).or_default().add(reading, overlap);
            }
        }
    }

    rows.into_iter()
        .filter_map(|(start, rate)| {
            rate.finish().map(|value| Bucket {
                start,
                end: start.saturating_add(precision.width()),
                value,
            })
        })
        .collect()
}
