use crate::{
    agg::{group::Grouped, rate::Rate, stream::Aggregation, Bucket},
    compare::{CompareResult, CompareWindows},
    engine::{Cancellation, Engine},
    planner::{Plan, Precision},
    source::{GroupResolver, ReadingSource},
    time::timestamp,
    Entity, Interval, TimeRange, Timestamp, Value,
};
use std::marker::PhantomData;

/// Builder for a bucketed series query.
///
/// Created by [`Engine::compressed`] (rates) and [`Engine::bars`] (totals).
pub struct SeriesQuery<'a, S, G, A> {
    engine: &'a Engine<S, G>,

    /// Entities to report on
    entities: &'a [Entity],

    /// Overall time bounds, unbounded ends are taken from the data
    range: TimeRange,

    /// How the range is cut into buckets
    plan: Plan,

    cancellation: Option<Cancellation>,

    phantom: PhantomData<A>,
}

impl<'a, S, G, A> SeriesQuery<'a, S, G, A>
where
    S: ReadingSource,
    G: GroupResolver,
    A: Aggregation,
    A::Output: Send,
{
    pub(crate) fn new(engine: &'a Engine<S, G>, entities: &'a [Entity], plan: Plan) -> Self {
        Self {
            engine,
            entities,
            range: TimeRange::unbounded(),
            plan,
            cancellation: None,
            phantom: PhantomData,
        }
    }

    /// Sets the (inclusive) start of the series.
    ///
    /// If not set, the series starts at the earliest reading of each entity.
    #[must_use]
    pub fn start(mut self, ts: Timestamp) -> Self {
        self.range.start = Some(ts);
        self
    }

    /// Sets the (exclusive) end of the series.
    ///
    /// If not set, the series ends at the latest reading of each entity.
    #[must_use]
    pub fn end(mut self, ts: Timestamp) -> Self {
        self.range.end = Some(ts);
        self
    }

    /// Sets both ends at once.
    #[must_use]
    pub fn range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    /// Lets the caller stop the query between entities.
    #[must_use]
    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Runs the query.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRange`] or [`crate::Error::InvalidParameter`]
    /// before any work is done if the query is malformed. Failures of single
    /// entities are reported per entity in the result, including a half-open
    /// range that resolves to bounds outside the timeline.
    pub fn run(self) -> crate::Result<Grouped<Vec<Bucket<A::Output>>>> {
        self.range.validate()?;
        self.plan.validate()?;

        if let (Some(start), Some(end)) = (self.range.start, self.range.end) {
            // NOTE: An empty range cannot be split into equal-width buckets
            if matches!(self.plan, Plan::Count(_)) && start == end {
                return Err(crate::Error::InvalidRange);
            }

            self.plan.check_range(Interval { start, end })?;
        }

        log::debug!(
            "Series query {:?} over {:?} for {} entities",
            self.plan,
            self.range,
            self.entities.len()
        );

        let engine = self.engine;
        let range = self.range;
        let plan = self.plan;

        Ok(engine.run(self.entities, self.cancellation.as_ref(), |entity| {
            engine.series::<A>(entity, range, plan)
        }))
    }
}

impl<S, G> SeriesQuery<'_, S, G, Rate> {
    /// Number of points per series.
    ///
    /// Default = 500
    #[must_use]
    pub fn points(mut self, n: usize) -> Self {
        self.plan = Plan::Count(n);
        self
    }
}

/// Builder for a current-vs-previous comparison, created by [`Engine::compare`].
pub struct CompareQuery<'a, S, G> {
    engine: &'a Engine<S, G>,
    entities: &'a [Entity],
    current_start: Timestamp,
    current_end: Option<Timestamp>,
    compare_duration: i64,
    cancellation: Option<Cancellation>,
}

impl<'a, S: ReadingSource, G: GroupResolver> CompareQuery<'a, S, G> {
    pub(crate) fn new(
        engine: &'a Engine<S, G>,
        entities: &'a [Entity],
        current_start: Timestamp,
        compare_duration: i64,
    ) -> Self {
        Self {
            engine,
            entities,
            current_start,
            current_end: None,
            compare_duration,
            cancellation: None,
        }
    }

    /// Sets the end of the current period.
    ///
    /// Default = now
    #[must_use]
    pub fn end(mut self, ts: Timestamp) -> Self {
        self.current_end = Some(ts);
        self
    }

    /// Lets the caller stop the query between entities.
    #[must_use]
    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Runs the query.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRange`] before any work is done if the
    /// windows are malformed. Failures of single entities are reported per entity.
    pub fn run(self) -> crate::Result<Grouped<CompareResult>> {
        let windows = CompareWindows::new(
            self.current_start,
            self.current_end.unwrap_or_else(timestamp),
            self.compare_duration,
        )?;

        log::debug!(
            "Compare query current={} previous={} for {} entities",
            windows.current(),
            windows.prev_full(),
            self.entities.len()
        );

        let engine = self.engine;

        Ok(engine.run(self.entities, self.cancellation.as_ref(), |entity| {
            engine.compare_entity(entity, &windows)
        }))
    }
}

/// Builder for a rollup query, created by [`Engine::rollup`].
pub struct RollupQuery<'a, S, G> {
    engine: &'a Engine<S, G>,
    entities: &'a [Entity],
    precision: Precision,
    range: TimeRange,
    cancellation: Option<Cancellation>,
}

impl<'a, S: ReadingSource, G: GroupResolver> RollupQuery<'a, S, G> {
    pub(crate) fn new(
        engine: &'a Engine<S, G>,
        entities: &'a [Entity],
        precision: Precision,
    ) -> Self {
        Self {
            engine,
            entities,
            precision,
            range: TimeRange::unbounded(),
            cancellation: None,
        }
    }

    /// Sets the (inclusive) start of the rollup.
    #[must_use]
    pub fn start(mut self, ts: Timestamp) -> Self {
        self.range.start = Some(ts);
        self
    }

    /// Sets the (exclusive) end of the rollup.
    #[must_use]
    pub fn end(mut self, ts: Timestamp) -> Self {
        self.range.end = Some(ts);
        self
    }

    /// Lets the caller stop the query between entities.
    #[must_use]
    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Runs the query.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRange`] before any work is done if the
    /// range is reversed or too long. Failures of single entities are reported per entity.
    pub fn run(self) -> crate::Result<Grouped<Vec<Bucket<Value>>>> {
        self.range.validate()?;

        log::debug!(
            "Rollup query per {} over {:?} for {} entities",
            self.precision,
            self.range,
            self.entities.len()
        );

        let engine = self.engine;
        let precision = self.precision;
        let range = self.range;

        Ok(engine.run(self.entities, self.cancellation.as_ref(), |entity| {
            engine.rollup_entity(entity, precision, range)
        }))
    }
}
