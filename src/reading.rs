use crate::{interval::prorate, Duration, Interval, MeterId, Timestamp, Value};

const MILLIS_PER_HOUR: i64 = Duration::hours(1);

/// A quantity of energy consumed by a meter over `[start, end)`.
///
/// Readings are validated on construction: the interval has a positive
/// duration and the quantity is finite and non-negative.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Reading {
    meter: MeterId,
    quantity: Value,
    start: Timestamp,
    end: Timestamp,
}

impl Reading {
    /// Creates a reading.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidReading`] if `end <= start`, if the duration
    /// does not fit into an `i64`, or if `quantity` is negative or not finite.
    pub fn new(
        meter: MeterId,
        quantity: Value,
        start: Timestamp,
        end: Timestamp,
    ) -> crate::Result<Self> {
        let positive = end.checked_sub(start).is_some_and(|duration| duration > 0);

        if !positive || !quantity.is_finite() || quantity < 0.0 {
            return Err(crate::Error::InvalidReading);
        }

        Ok(Self {
            meter,
            quantity,
            start,
            end,
        })
    }

    /// Meter that produced the reading.
    #[must_use]
    pub fn meter(&self) -> MeterId {
        self.meter
    }

    /// Energy consumed over the whole interval.
    #[must_use]
    pub fn quantity(&self) -> Value {
        self.quantity
    }

    /// Inclusive start.
    #[must_use]
    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// Exclusive end.
    #[must_use]
    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// The interval covered by the reading.
    #[must_use]
    pub fn interval(&self) -> Interval {
        Interval {
            start: self.start,
            end: self.end,
        }
    }

    /// Duration in milliseconds, always positive.
    #[must_use]
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    /// Consumption rate in quantity units per hour (e.g. kWh -> kW).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> Value {
        self.quantity * (MILLIS_PER_HOUR as Value) / (self.duration() as Value)
    }

    /// Part of the quantity that falls into `window`, assuming a constant rate.
    #[must_use]
    pub fn prorate(&self, window: &Interval) -> Value {
        prorate(
            self.quantity,
            self.duration(),
            self.interval().overlap(window),
        )
    }

    /// Total order used to make aggregation independent of input order.
    pub(crate) fn sort_key(a: &Self, b: &Self) -> std::cmp::Ordering {
        (a.start, a.end, a.meter)
            .cmp(&(b.start, b.end, b.meter))
            .then_with(|| a.quantity.total_cmp(&b.quantity))
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Reading [meter: {}, quantity: {}, {}]",
            self.meter,
            self.quantity,
            self.interval()
        )
    }
}
