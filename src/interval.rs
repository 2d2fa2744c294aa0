use crate::{Timestamp, Value};

/// A half-open time interval `[start, end)`, in epoch milliseconds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    /// Inclusive start
    pub start: Timestamp,

    /// Exclusive end
    pub end: Timestamp,
}

impl Interval {
    /// Creates an interval.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRange`] if `start > end`.
    pub fn new(start: Timestamp, end: Timestamp) -> crate::Result<Self> {
        if start > end {
            return Err(crate::Error::InvalidRange);
        }
        Ok(Self { start, end })
    }

    /// Length of the interval in milliseconds, saturating at `i64::MAX`.
    #[must_use]
    pub fn duration(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }

    /// Length of the interval in milliseconds, `None` if it does not fit into an `i64`.
    #[must_use]
    pub fn checked_duration(&self) -> Option<i64> {
        self.end.checked_sub(self.start)
    }

    /// Shared duration with another interval, see [`overlap`].
    #[must_use]
    pub fn overlap(&self, other: &Self) -> i64 {
        overlap(self, other)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..{})", self.start, self.end)
    }
}

/// Returns the duration two half-open intervals share.
///
/// Disjoint or merely touching intervals overlap by `0`, never by a negative amount.
#[must_use]
pub fn overlap(a: &Interval, b: &Interval) -> i64 {
    a.end.min(b.end).saturating_sub(a.start.max(b.start)).max(0)
}

/// Scales `quantity` by the fraction `overlap / duration`.
///
/// `duration` must be positive.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn prorate(quantity: Value, duration: i64, overlap: i64) -> Value {
    debug_assert!(duration > 0, "proration over an empty interval");
    quantity * (overlap as Value) / (duration as Value)
}

/// A query range whose ends may be unbounded.
///
/// `None` means "from the beginning of data" or "to the end of data".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive start, or unbounded
    pub start: Option<Timestamp>,

    /// Exclusive end, or unbounded
    pub end: Option<Timestamp>,
}

impl TimeRange {
    /// The range covering all of time.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// A fully bounded range.
    #[must_use]
    pub const fn between(start: Timestamp, end: Timestamp) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Rejects ranges whose start lies after their end.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRange`] if both ends are set and `start > end`,
    /// or if the length of the range does not fit into an `i64`.
    pub fn validate(&self) -> crate::Result<()> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end || end.checked_sub(start).is_none() => {
                Err(crate::Error::InvalidRange)
            }
            _ => Ok(()),
        }
    }

    /// Returns `true` if the interval shares any duration with the range.
    #[must_use]
    pub fn intersects(&self, interval: &Interval) -> bool {
        self.start.map_or(true, |start| interval.end > start)
            && self.end.map_or(true, |end| interval.start < end)
    }

    /// Replaces unbounded ends by `data`, the span actually covered by readings.
    #[must_use]
    pub fn resolve(&self, data: Interval) -> Interval {
        Interval {
            start: self.start.unwrap_or(data.start),
            end: self.end.unwrap_or(data.end),
        }
    }
}
