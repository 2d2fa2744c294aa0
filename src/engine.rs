use crate::{
    agg::{
        group::{merge_rollups, merge_series, Grouped},
        rate::Rate,
        rollup::rollup,
        stream::{Aggregation, Distributor},
        sum::Sum,
        Bucket,
    },
    compare::{CompareResult, CompareWindows},
    engine_builder::EngineBuilder,
    planner::{BarWidth, Plan, Precision},
    query::{CompareQuery, RollupQuery, SeriesQuery},
    source::{GroupResolver, ReadingSource},
    Entity, Interval, MeterId, Reading, TimeRange, Timestamp, Value,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cooperative cancellation signal for a running query.
///
/// Checked between entities, never in the middle of one.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Creates a signal that is not cancelled yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; entities not started yet report [`crate::Error::Cancelled`].
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once [`Cancellation::cancel`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Answers series and comparison queries for meters and groups.
///
/// The engine owns no data: readings come from a [`ReadingSource`], group
/// memberships from a [`GroupResolver`]. Each query is stateless.
pub struct Engine<S, G> {
    pub(crate) readings: S,
    pub(crate) groups: G,
    pub(crate) parallelism: usize,
    pub(crate) default_points: usize,
}

impl<S: ReadingSource, G: GroupResolver> Engine<S, G> {
    /// Creates an engine with default settings.
    ///
    /// Use [`EngineBuilder`] to tune it.
    pub fn new(readings: S, groups: G) -> Self {
        EngineBuilder::new().build(readings, groups)
    }

    /// Creates a builder to configure an engine.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Starts a compressed series query: a bounded number of rate points per entity.
    ///
    /// Rates are in quantity units per hour. A bucket no reading overlaps is `None`.
    #[must_use]
    pub fn compressed<'a>(&'a self, entities: &'a [Entity]) -> SeriesQuery<'a, S, G, Rate> {
        SeriesQuery::new(self, entities, Plan::Count(self.default_points))
    }

    /// Starts a bar series query: calendar-aligned totals per entity.
    #[must_use]
    pub fn bars<'a>(
        &'a self,
        entities: &'a [Entity],
        width: impl Into<BarWidth>,
    ) -> SeriesQuery<'a, S, G, Sum> {
        SeriesQuery::new(self, entities, Plan::Width(width.into()))
    }

    /// Starts a comparison of `[current_start, now)` with the preceding
    /// `compare_duration` milliseconds.
    #[must_use]
    pub fn compare<'a>(
        &'a self,
        entities: &'a [Entity],
        current_start: Timestamp,
        compare_duration: i64,
    ) -> CompareQuery<'a, S, G> {
        CompareQuery::new(self, entities, current_start, compare_duration)
    }

    /// Starts a rollup query: sparse per-precision rate rows.
    #[must_use]
    pub fn rollup<'a>(
        &'a self,
        entities: &'a [Entity],
        precision: Precision,
    ) -> RollupQuery<'a, S, G> {
        RollupQuery::new(self, entities, precision)
    }

    /// Runs `f` for every entity, on up to `parallelism` threads.
    ///
    /// Unknown entities yield an empty result, other failures stay with their entity.
    pub(crate) fn run<T, F>(
        &self,
        entities: &[Entity],
        cancellation: Option<&Cancellation>,
        f: F,
    ) -> Grouped<T>
    where
        T: Default + Send,
        F: Fn(Entity) -> crate::Result<T> + Sync,
    {
        let compute = |entity: Entity| {
            if cancellation.is_some_and(Cancellation::is_cancelled) {
                return (entity, Err(crate::Error::Cancelled));
            }

            let result = match f(entity) {
                Err(crate::Error::UnknownEntity(unknown)) => {
                    log::debug!("{unknown} is unknown, reporting no data for {entity}");
                    Ok(T::default())
                }
                Err(e) => {
                    log::warn!("Query for {entity} failed: {e}");
                    Err(e)
                }
                Ok(v) => Ok(v),
            };

            (entity, result)
        };

        let mut map =
            crate::HashMap::with_capacity_and_hasher(entities.len(), rustc_hash::FxBuildHasher);

        let workers = self.parallelism.min(entities.len());

        if workers <= 1 {
            map.extend(entities.iter().map(|&entity| compute(entity)));
            return Grouped(map);
        }

        let chunk_size = entities.len().div_ceil(workers);
        let compute = &compute;

        std::thread::scope(|s| {
            let handles = entities
                .chunks(chunk_size)
                .map(|chunk| {
                    s.spawn(move || {
                        chunk
                            .iter()
                            .map(|&entity| compute(entity))
                            .collect::<Vec<_>>()
                    })
                })
                .collect::<Vec<_>>();

            for handle in handles {
                match handle.join() {
                    Ok(results) => map.extend(results),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
        });

        Grouped(map)
    }

    fn fetch_meter(&self, meter: MeterId, range: TimeRange) -> crate::Result<Vec<Reading>> {
        match self.readings.fetch_readings(meter, range) {
            Ok(mut readings) => {
                readings.retain(|r| range.intersects(&r.interval()));
                Ok(readings)
            }
            Err(crate::Error::UnknownEntity(_)) => {
                log::debug!("meter:{meter} is unknown, treating it as empty");
                Ok(vec![])
            }
            Err(e) => Err(e),
        }
    }

    /// Fetches the readings of every meter making up `entity`, one vector per meter.
    fn fetch(&self, entity: Entity, range: TimeRange) -> crate::Result<Vec<Vec<Reading>>> {
        match entity {
            Entity::Meter(meter) => Ok(vec![self.fetch_meter(meter, range)?]),
            Entity::Group(group) => {
                let mut members = self.groups.resolve_group(group)?;
                members.sort_unstable();
                members.dedup();

                log::trace!("{entity} resolved to meters {members:?}");

                members
                    .into_iter()
                    .map(|meter| self.fetch_meter(meter, range))
                    .collect()
            }
        }
    }

    pub(crate) fn series<A: Aggregation>(
        &self,
        entity: Entity,
        range: TimeRange,
        plan: Plan,
    ) -> crate::Result<Vec<Bucket<A::Output>>> {
        let members = self.fetch(entity, range)?;

        let resolved = if let (Some(start), Some(end)) = (range.start, range.end) {
            Interval { start, end }
        } else if let Some(data) = data_span(members.iter().flatten()) {
            range.resolve(data)
        } else {
            log::trace!("{entity} has no readings, empty series");
            return Ok(vec![]);
        };

        plan.check_range(resolved)?;

        log::trace!(
            "Aggregating {entity} ({} meters) over {resolved} with {plan:?}",
            members.len()
        );

        let mut series = plan
            .buckets(resolved)
            .map(|interval| Bucket::new(interval, A::default().finish()))
            .collect::<Vec<_>>();

        for readings in members {
            let member = Distributor::<A>::new(plan.buckets(resolved), readings).collect();
            merge_series::<A>(&mut series, member);
        }

        Ok(series)
    }

    pub(crate) fn compare_entity(
        &self,
        entity: Entity,
        windows: &CompareWindows,
    ) -> crate::Result<CompareResult> {
        let readings = self.fetch(entity, windows.fetch_range())?.concat();
        Ok(windows.compute(&readings))
    }

    pub(crate) fn rollup_entity(
        &self,
        entity: Entity,
        precision: Precision,
        range: TimeRange,
    ) -> crate::Result<Vec<Bucket<Value>>> {
        Ok(self
            .fetch(entity, range)?
            .into_iter()
            .map(|readings| rollup(&readings, precision, range))
            .fold(Vec::new(), merge_rollups))
    }
}

/// Smallest interval containing all readings.
fn data_span<'a>(readings: impl Iterator<Item = &'a Reading>) -> Option<Interval> {
    readings.fold(None, |span, reading| {
        Some(match span {
            None => reading.interval(),
            Some(span) => Interval {
                start: span.start.min(reading.start()),
                end: span.end.max(reading.end()),
            },
        })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::{Duration, MemorySource};

    const HOUR: i64 = Duration::hours(1);
    const DAY: i64 = Duration::days(1);

    struct FailingSource;

    impl ReadingSource for FailingSource {
        fn fetch_readings(&self, meter: MeterId, _: TimeRange) -> crate::Result<Vec<Reading>> {
            if meter == 13 {
                Err(crate::Error::Collaborator("connection reset".into()))
            } else {
                Ok(vec![Reading::new(meter, 24.0, 0, DAY)?])
            }
        }
    }

    impl GroupResolver for FailingSource {
        fn resolve_group(&self, group: u64) -> crate::Result<Vec<MeterId>> {
            Err(crate::Error::UnknownEntity(Entity::Group(group)))
        }
    }

    /// Counts collaborator calls to show that nothing was fetched.
    #[derive(Default)]
    struct CountingSource {
        inner: MemorySource,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl CountingSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }
    }

    impl ReadingSource for CountingSource {
        fn fetch_readings(&self, meter: MeterId, range: TimeRange) -> crate::Result<Vec<Reading>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.fetch_readings(meter, range)
        }
    }

    impl GroupResolver for CountingSource {
        fn resolve_group(&self, group: u64) -> crate::Result<Vec<MeterId>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.resolve_group(group)
        }
    }

    fn source() -> MemorySource {
        let mut source = [
            Reading::new(1, 24.0, 0, DAY).unwrap(),
            Reading::new(2, 10.0, 0, 6 * HOUR).unwrap(),
            Reading::new(2, 20.0, 6 * HOUR, 18 * HOUR).unwrap(),
        ]
        .into_iter()
        .collect::<MemorySource>();

        source.set_group(100, [1, 2]);
        source.set_group(101, [1, 1]);
        source.set_group(102, []);
        source
    }

    #[test_log::test]
    fn compressed_constant_rate() -> crate::Result<()> {
        let source = source();
        let engine = Engine::new(&source, &source);

        let result = engine
            .compressed(&[Entity::Meter(1)])
            .start(0)
            .end(DAY)
            .points(2)
            .run()?
            .collect()?;

        let series = &result[&Entity::Meter(1)];
        assert_eq!(2, series.len());
        assert_eq!((0, 12 * HOUR), (series[0].start, series[0].end));
        assert_eq!((12 * HOUR, DAY), (series[1].start, series[1].end));
        for bucket in series {
            assert!((bucket.value.unwrap() - 1.0).abs() < 1e-12);
        }

        Ok(())
    }

    #[test_log::test]
    fn compressed_unbounded_uses_data_span() -> crate::Result<()> {
        let source = source();
        let engine = Engine::new(&source, &source);

        let result = engine
            .compressed(&[Entity::Meter(2)])
            .points(3)
            .run()?
            .collect()?;

        let series = &result[&Entity::Meter(2)];
        assert_eq!(3, series.len());
        assert_eq!(0, series[0].start);
        assert_eq!(18 * HOUR, series[2].end);

        Ok(())
    }

    #[test_log::test]
    fn group_rates_are_summed() -> crate::Result<()> {
        let source = source();
        let engine = Engine::new(&source, &source);

        let result = engine
            .compressed(&[Entity::Group(100)])
            .start(0)
            .end(DAY)
            .points(4)
            .run()?
            .collect()?;

        let rates = result[&Entity::Group(100)]
            .iter()
            .map(|b| b.value.unwrap())
            .collect::<Vec<_>>();

        // meter 1: 1 kW all day; meter 2: 10/6 kW, then 20/12 kW until 18:00
        let expected = [1.0 + 10.0 / 6.0, 1.0 + 20.0 / 12.0, 1.0 + 20.0 / 12.0, 1.0];
        for (rate, expected) in rates.iter().zip(expected) {
            assert!((rate - expected).abs() < 1e-9, "{rate} != {expected}");
        }

        Ok(())
    }

    #[test_log::test]
    fn bars_daily_total() -> crate::Result<()> {
        let source = source();
        let engine = Engine::new(&source, &source);

        let result = engine
            .bars(&[Entity::Meter(2), Entity::Group(100)], Precision::Day)
            .start(0)
            .end(DAY)
            .run()?
            .collect()?;

        let meter = &result[&Entity::Meter(2)];
        assert_eq!(1, meter.len());
        assert!((meter[0].value - 30.0).abs() < 1e-9);

        let group = &result[&Entity::Group(100)];
        assert!((group[0].value - 54.0).abs() < 1e-9);

        Ok(())
    }

    #[test_log::test]
    fn duplicate_members_counted_once_per_group() -> crate::Result<()> {
        let source = source();
        let engine = Engine::new(&source, &source);

        let result = engine
            .bars(&[Entity::Group(101)], BarWidth::Days(1))
            .start(0)
            .end(DAY)
            .run()?
            .collect()?;

        assert!((result[&Entity::Group(101)][0].value - 24.0).abs() < 1e-9);

        Ok(())
    }

    #[test_log::test]
    fn every_entity_present() -> crate::Result<()> {
        let source = source();
        let engine = Engine::new(&source, &source);

        let entities = [
            Entity::Meter(1),
            Entity::Meter(99),
            Entity::Group(102),
            Entity::Group(999),
        ];

        let result = engine.compressed(&entities).points(1).run()?.collect()?;

        assert_eq!(4, result.len());
        assert_eq!(1, result[&Entity::Meter(1)].len());
        assert!(result[&Entity::Meter(99)].is_empty());
        assert!(result[&Entity::Group(102)].is_empty());
        assert!(result[&Entity::Group(999)].is_empty());

        Ok(())
    }

    #[test_log::test]
    fn bounded_range_without_data_reports_absent_buckets() -> crate::Result<()> {
        let source = source();
        let engine = Engine::new(&source, &source);

        let result = engine
            .compressed(&[Entity::Meter(99)])
            .start(0)
            .end(DAY)
            .points(4)
            .run()?
            .collect()?;

        let series = &result[&Entity::Meter(99)];
        assert_eq!(4, series.len());
        assert!(series.iter().all(|b| b.value.is_none()));

        Ok(())
    }

    #[test_log::test]
    fn failure_stays_with_its_entity() -> crate::Result<()> {
        let source = FailingSource;
        let engine = EngineBuilder::new()
            .parallelism(2)
            .build(&source, &source);

        let entities = [Entity::Meter(1), Entity::Meter(13), Entity::Group(5)];
        let result = engine.bars(&entities, Precision::Day).run()?;

        assert_eq!(3, result.len());
        assert!(matches!(
            result[&Entity::Meter(13)],
            Err(crate::Error::Collaborator(_))
        ));
        assert!(matches!(&result[&Entity::Group(5)], Ok(v) if v.is_empty()));

        let Ok(bars) = &result[&Entity::Meter(1)] else {
            panic!("meter 1 should succeed");
        };
        assert!((bars[0].value - 24.0).abs() < 1e-9);

        assert!(result.collect().is_err());

        Ok(())
    }

    #[test_log::test]
    fn compare_previous_day() -> crate::Result<()> {
        let mut source = MemorySource::default();
        source.insert(Reading::new(1, 48.0, DAY, 2 * DAY)?);
        source.insert(Reading::new(1, 6.0, 2 * DAY, 2 * DAY + 6 * HOUR)?);

        let engine = Engine::new(&source, &source);

        let result = engine
            .compare(&[Entity::Meter(1), Entity::Meter(2)], 2 * DAY, DAY)
            .end(2 * DAY + 12 * HOUR)
            .run()?
            .collect()?;

        let meter = result[&Entity::Meter(1)];
        assert!((meter.prev_use_total - 48.0).abs() < 1e-9);
        assert!((meter.prev_use_for_current - 24.0).abs() < 1e-9);
        assert!((meter.current_use - 6.0).abs() < 1e-9);

        assert_eq!(CompareResult::default(), result[&Entity::Meter(2)]);

        Ok(())
    }

    #[test_log::test]
    fn rollup_group() -> crate::Result<()> {
        let source = source();
        let engine = Engine::new(&source, &source);

        let result = engine
            .rollup(&[Entity::Group(100)], Precision::Hour)
            .start(0)
            .end(2 * HOUR)
            .run()?
            .collect()?;

        let rows = &result[&Entity::Group(100)];
        assert_eq!(2, rows.len());
        assert!((rows[0].value - (1.0 + 10.0 / 6.0)).abs() < 1e-9);

        Ok(())
    }

    #[test_log::test]
    fn cancelled_before_start() -> crate::Result<()> {
        let source = source();
        let engine = Engine::new(&source, &source);

        let cancellation = Cancellation::new();
        cancellation.cancel();

        let result = engine
            .compressed(&[Entity::Meter(1), Entity::Meter(2)])
            .cancellation(cancellation)
            .run()?;

        assert_eq!(2, result.len());
        assert!(result
            .values()
            .all(|r| matches!(r, Err(crate::Error::Cancelled))));

        Ok(())
    }

    #[test_log::test]
    #[allow(clippy::cast_precision_loss)]
    fn order_independent_and_idempotent() -> crate::Result<()> {
        let mut readings = (0..48_i64)
            .map(|idx| Reading::new(1, (idx % 7) as f64 + 0.1, idx * HOUR, (idx + 1) * HOUR + 17))
            .collect::<crate::Result<Vec<_>>>()?;

        let forward = readings.iter().copied().collect::<MemorySource>();
        readings.reverse();
        readings.swap(3, 40);
        let shuffled = readings.into_iter().collect::<MemorySource>();

        let query = |source: &MemorySource| -> crate::Result<_> {
            let engine = Engine::new(source, source);
            engine
                .compressed(&[Entity::Meter(1)])
                .points(10)
                .run()?
                .collect()
        };

        let a = query(&forward)?;
        let b = query(&shuffled)?;
        let c = query(&forward)?;

        assert_eq!(a[&Entity::Meter(1)], b[&Entity::Meter(1)]);
        assert_eq!(a[&Entity::Meter(1)], c[&Entity::Meter(1)]);

        Ok(())
    }

    #[test_log::test]
    fn malformed_queries_fail_before_fetching() {
        let source = CountingSource {
            inner: source(),
            ..Default::default()
        };
        let engine = Engine::new(&source, &source);
        let entities = [Entity::Meter(1), Entity::Group(100)];

        assert!(matches!(
            engine.compressed(&entities).start(5).end(5).run(),
            Err(crate::Error::InvalidRange)
        ));
        assert!(matches!(
            engine.compressed(&entities).start(10).end(0).run(),
            Err(crate::Error::InvalidRange)
        ));
        assert!(matches!(
            engine.compressed(&entities).points(0).run(),
            Err(crate::Error::InvalidParameter)
        ));
        assert!(matches!(
            engine.bars(&entities, BarWidth::Days(0)).run(),
            Err(crate::Error::InvalidParameter)
        ));
        assert!(matches!(
            engine.bars(&entities, Precision::Day).start(10).end(0).run(),
            Err(crate::Error::InvalidRange)
        ));
        assert!(matches!(
            engine
                .rollup(&entities, Precision::Hour)
                .start(10)
                .end(0)
                .run(),
            Err(crate::Error::InvalidRange)
        ));
        assert!(matches!(
            engine.compare(&entities, DAY, 0).end(2 * DAY).run(),
            Err(crate::Error::InvalidRange)
        ));
        assert!(matches!(
            engine.compare(&entities, 2 * DAY, DAY).end(DAY).run(),
            Err(crate::Error::InvalidRange)
        ));

        assert_eq!(0, source.calls());
    }

    #[test_log::test]
    fn empty_bar_range_is_not_an_error() -> crate::Result<()> {
        let source = source();
        let engine = Engine::new(&source, &source);

        let result = engine
            .bars(&[Entity::Meter(1)], Precision::Day)
            .start(DAY)
            .end(DAY)
            .run()?
            .collect()?;

        assert!(result[&Entity::Meter(1)].is_empty());

        Ok(())
    }

    #[test_log::test]
    fn ranges_beyond_the_timeline_are_rejected() {
        let source = CountingSource {
            inner: source(),
            ..Default::default()
        };
        let engine = Engine::new(&source, &source);
        let entities = [Entity::Meter(1)];

        assert!(matches!(
            engine
                .bars(&entities, Precision::Day)
                .start(0)
                .end(i64::MAX)
                .run(),
            Err(crate::Error::InvalidRange)
        ));
        assert!(matches!(
            engine
                .compressed(&entities)
                .start(-1)
                .end(i64::MAX)
                .points(2)
                .run(),
            Err(crate::Error::InvalidRange)
        ));
        assert!(matches!(
            engine
                .rollup(&entities, Precision::Day)
                .start(-1)
                .end(i64::MAX)
                .run(),
            Err(crate::Error::InvalidRange)
        ));
        assert!(matches!(
            engine.compare(&entities, -1, 1).end(i64::MAX).run(),
            Err(crate::Error::InvalidRange)
        ));

        assert_eq!(0, source.calls());
    }

    #[test_log::test]
    fn extreme_data_fails_only_its_entity() -> crate::Result<()> {
        let mut source = source();
        source.insert(Reading::new(7, 1.0, i64::MIN, i64::MIN + DAY)?);
        source.insert(Reading::new(7, 1.0, i64::MAX - DAY, i64::MAX)?);

        let engine = Engine::<&MemorySource, &MemorySource>::builder().parallelism(2).build(&source, &source);
        let entities = [Entity::Meter(1), Entity::Meter(7)];

        // The data span of meter 7 is longer than an i64 can hold
        let result = engine.compressed(&entities).points(4).run()?;
        assert!(matches!(
            result[&Entity::Meter(7)],
            Err(crate::Error::InvalidRange)
        ));
        assert!(matches!(&result[&Entity::Meter(1)], Ok(series) if series.len() == 4));

        // The last day bar would end past the timeline
        let result = engine.bars(&entities, Precision::Day).start(0).run()?;
        assert!(matches!(
            result[&Entity::Meter(7)],
            Err(crate::Error::InvalidRange)
        ));
        assert!(matches!(&result[&Entity::Meter(1)], Ok(bars) if bars.len() == 1));

        let result = engine
            .rollup(&[Entity::Meter(7)], Precision::Hour)
            .start(0)
            .run()?
            .collect()?;
        assert!(!result[&Entity::Meter(7)].is_empty());
        assert!(result[&Entity::Meter(7)]
            .iter()
            .all(|row| row.start < row.end && row.value > 0.0));

        Ok(())
    }
}
