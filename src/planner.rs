//! Bucket planning
//!
//! A [`Plan`] turns a resolved query range into an ordered, contiguous
//! sequence of output intervals ("buckets"). Two modes exist:
//!
//! - [`Plan::Count`] splits the range into N equal-width buckets
//! - [`Plan::Width`] anchors fixed-width buckets to calendar boundaries (UTC)

use crate::{Duration, Interval, Timestamp};

/// Number of points a compressed series has if not specified otherwise.
pub const DEFAULT_POINTS: usize = 500;

/// Monday, 1969-12-29 00:00 UTC; weeks are anchored to it.
const WEEK_ORIGIN: Timestamp = -Duration::days(3);

/// A calendar precision, pinned to UTC.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Precision {
    /// Whole minutes
    Minute,

    /// Whole hours
    Hour,

    /// Days starting at midnight UTC
    Day,

    /// Weeks starting on Monday, midnight UTC
    Week,
}

impl Precision {
    /// Length of one unit in milliseconds.
    #[must_use]
    pub const fn width(self) -> i64 {
        match self {
            Self::Minute => Duration::minutes(1),
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
            Self::Week => Duration::weeks(1),
        }
    }

    const fn origin(self) -> Timestamp {
        match self {
            Self::Week => WEEK_ORIGIN,
            _ => 0,
        }
    }
}

impl std::str::FromStr for Precision {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            _ => Err(crate::Error::InvalidParameter),
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
        };
        write!(f, "{name}")
    }
}

/// Width of the bars in a bar series.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BarWidth {
    /// One unit of a calendar precision
    Precision(Precision),

    /// A number of whole days, anchored to midnight UTC
    Days(u32),
}

impl BarWidth {
    /// The precision bucket boundaries are truncated to.
    #[must_use]
    pub fn precision(&self) -> Precision {
        match self {
            Self::Precision(precision) => *precision,
            Self::Days(_) => Precision::Day,
        }
    }

    /// Length of one bar in milliseconds.
    #[must_use]
    pub fn width(&self) -> i64 {
        match self {
            Self::Precision(precision) => precision.width(),
            Self::Days(n) => Duration::days(i64::from(*n)),
        }
    }

    fn validate(&self) -> crate::Result<()> {
        match self {
            Self::Days(0) => Err(crate::Error::InvalidParameter),
            _ => Ok(()),
        }
    }
}

impl From<Precision> for BarWidth {
    fn from(value: Precision) -> Self {
        Self::Precision(value)
    }
}

/// Rounds `ts` down to the start of its precision unit.
///
/// `None` if that boundary lies before the earliest representable timestamp.
#[must_use]
pub fn truncate_down(ts: Timestamp, precision: Precision) -> Option<Timestamp> {
    let width = i128::from(precision.width());
    let origin = i128::from(precision.origin());

    // NOTE: i128 so ts - origin cannot overflow
    let down = origin + (i128::from(ts) - origin).div_euclid(width) * width;
    Timestamp::try_from(down).ok()
}

/// Rounds `ts` up to the next precision boundary, or returns it if already on one.
///
/// `None` if that boundary lies past the latest representable timestamp.
#[must_use]
pub fn truncate_up(ts: Timestamp, precision: Precision) -> Option<Timestamp> {
    match truncate_down(ts, precision) {
        Some(down) if down == ts => Some(ts),
        Some(down) => down.checked_add(precision.width()),
        // NOTE: Below the earliest boundary, the next one is the first representable
        None => truncate_down(Timestamp::MIN + precision.width(), precision),
    }
}

/// Moves `ts` forward by one bar width, `None` on overflow.
#[must_use]
pub fn advance(ts: Timestamp, width: BarWidth) -> Option<Timestamp> {
    ts.checked_add(width.width())
}

/// How a query range is cut into buckets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Plan {
    /// A fixed number of equal-width buckets spanning the range
    Count(usize),

    /// Calendar-anchored buckets of a fixed width
    Width(BarWidth),
}

impl Plan {
    /// Rejects non-positive point counts and bar widths.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidParameter`] for a zero point count or bar width.
    pub fn validate(&self) -> crate::Result<()> {
        match self {
            Self::Count(0) => Err(crate::Error::InvalidParameter),
            Self::Count(_) => Ok(()),
            Self::Width(width) => width.validate(),
        }
    }

    /// Rejects ranges whose buckets cannot be laid out within the timeline.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRange`] if `range` is reversed, if its length
    /// does not fit into an `i64`, or if its calendar-aligned bounds fall outside
    /// the representable timestamps.
    pub fn check_range(&self, range: Interval) -> crate::Result<()> {
        if range.checked_duration().map_or(true, |span| span < 0) {
            return Err(crate::Error::InvalidRange);
        }

        if let Self::Width(width) = self {
            let precision = width.precision();

            let start = truncate_down(range.start, precision).ok_or(crate::Error::InvalidRange)?;
            truncate_up(range.end, precision).ok_or(crate::Error::InvalidRange)?;

            // NOTE: The first bucket must end within the timeline
            advance(start, *width).ok_or(crate::Error::InvalidRange)?;
        }

        Ok(())
    }

    /// Lays out the buckets covering `range`.
    ///
    /// The returned iterator is consumed once; plan again for another pass.
    /// Ranges rejected by [`Plan::check_range`] yield a truncated layout.
    #[must_use]
    pub fn buckets(&self, range: Interval) -> Buckets {
        match *self {
            Self::Count(points) => {
                let span = range.duration();

                // NOTE: Never emit zero-width buckets
                let points = i64::try_from(points).unwrap_or(i64::MAX).min(span).max(0);

                Buckets(Layout::Count {
                    from: range.start,
                    span,
                    points,
                    idx: 0,
                })
            }
            Self::Width(width) => {
                let precision = width.precision();

                Buckets(Layout::Width {
                    next: truncate_down(range.start, precision),
                    end: truncate_up(range.end, precision).unwrap_or(Timestamp::MAX),
                    width,
                })
            }
        }
    }
}

/// A lazy, finite sequence of buckets produced by a [`Plan`].
#[derive(Clone, Debug)]
pub struct Buckets(Layout);

#[derive(Clone, Debug)]
enum Layout {
    Count {
        from: Timestamp,
        span: i64,
        points: i64,
        idx: i64,
    },
    Width {
        next: Option<Timestamp>,
        end: Timestamp,
        width: BarWidth,
    },
}

#[allow(clippy::cast_possible_truncation)]
fn boundary(from: Timestamp, span: i64, points: i64, idx: i64) -> Timestamp {
    // NOTE: i128 so span * idx cannot overflow
    from + (i128::from(span) * i128::from(idx) / i128::from(points)) as i64
}

impl Iterator for Buckets {
    type Item = Interval;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.0 {
            Layout::Count {
                from,
                span,
                points,
                idx,
            } => {
                if *idx >= *points {
                    return None;
                }

                let start = boundary(*from, *span, *points, *idx);
                *idx += 1;
                let end = boundary(*from, *span, *points, *idx);

                Some(Interval { start, end })
            }
            Layout::Width { next, end, width } => {
                let start = (*next)?;
                if start >= *end {
                    *next = None;
                    return None;
                }

                let Some(bucket_end) = advance(start, *width) else {
                    *next = None;
                    return None;
                };
                *next = Some(bucket_end);

                Some(Interval {
                    start,
                    end: bucket_end,
                })
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.0 {
            Layout::Count { points, idx, .. } => {
                let remaining = usize::try_from(*points - *idx).unwrap_or_default();
                (remaining, Some(remaining))
            }
            Layout::Width { next, end, width } => {
                let remaining = next.map_or(0, |next| {
                    let span = (i128::from(*end) - i128::from(next)).max(0);
                    let width = i128::from(width.width());
                    usize::try_from((span + width - 1) / width).unwrap_or(usize::MAX)
                });
                (0, Some(remaining))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const DAY: i64 = Duration::days(1);
    const HOUR: i64 = Duration::hours(1);

    #[test_log::test]
    fn count_two_halves() {
        let buckets = Plan::Count(2)
            .buckets(Interval {
                start: 0,
                end: DAY,
            })
            .collect::<Vec<_>>();

        assert_eq!(
            vec![
                Interval {
                    start: 0,
                    end: 12 * HOUR
                },
                Interval {
                    start: 12 * HOUR,
                    end: DAY
                },
            ],
            buckets
        );
    }

    #[test_log::test]
    fn count_uneven_is_contiguous() {
        let buckets = Plan::Count(3)
            .buckets(Interval { start: 5, end: 15 })
            .collect::<Vec<_>>();

        assert_eq!(3, buckets.len());
        assert_eq!(Some(5), buckets.first().map(|b| b.start));
        assert_eq!(Some(15), buckets.last().map(|b| b.end));
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test_log::test]
    fn count_never_zero_width() {
        let buckets = Plan::Count(500)
            .buckets(Interval { start: 0, end: 4 })
            .collect::<Vec<_>>();

        assert_eq!(4, buckets.len());
        assert!(buckets.iter().all(|b| b.duration() == 1));
    }

    #[test_log::test]
    fn count_empty_range() {
        assert_eq!(
            0,
            Plan::Count(10)
                .buckets(Interval { start: 7, end: 7 })
                .count()
        );
    }

    #[test_log::test]
    fn truncation() {
        let ts = 3 * DAY + 5 * HOUR + 17;
        assert_eq!(Some(3 * DAY), truncate_down(ts, Precision::Day));
        assert_eq!(Some(4 * DAY), truncate_up(ts, Precision::Day));
        assert_eq!(Some(3 * DAY + 5 * HOUR), truncate_down(ts, Precision::Hour));
        assert_eq!(Some(3 * DAY), truncate_up(3 * DAY, Precision::Day));
    }

    #[test_log::test]
    fn truncation_before_epoch() {
        assert_eq!(Some(-DAY), truncate_down(-1, Precision::Day));
        assert_eq!(Some(0), truncate_up(-1, Precision::Day));
    }

    #[test_log::test]
    fn truncation_week_starts_monday() {
        // 1970-01-01 was a Thursday
        assert_eq!(Some(-3 * DAY), truncate_down(0, Precision::Week));
        // 1970-01-05 was a Monday
        assert_eq!(Some(4 * DAY), truncate_down(4 * DAY, Precision::Week));
        assert_eq!(Some(4 * DAY), truncate_down(10 * DAY + HOUR, Precision::Week));
    }

    #[test_log::test]
    fn truncation_at_the_ends_of_time() {
        assert_eq!(None, truncate_up(i64::MAX, Precision::Day));
        assert_eq!(None, truncate_down(i64::MIN, Precision::Day));

        let last = truncate_down(i64::MAX, Precision::Week).unwrap();
        assert!(i64::MAX - last < Precision::Week.width());

        // Week truncation near the end must not overflow through the Monday origin
        assert!(truncate_down(i64::MAX - HOUR, Precision::Week).is_some());

        let first = truncate_up(i64::MIN, Precision::Day).unwrap();
        assert!(first - i64::MIN < DAY);
    }

    #[test_log::test]
    fn check_range_rejects_overflow() {
        let day = Plan::Width(BarWidth::Precision(Precision::Day));

        assert!(matches!(
            day.check_range(Interval {
                start: 0,
                end: i64::MAX
            }),
            Err(crate::Error::InvalidRange)
        ));
        assert!(matches!(
            Plan::Count(2).check_range(Interval {
                start: -1,
                end: i64::MAX
            }),
            Err(crate::Error::InvalidRange)
        ));
        assert!(matches!(
            Plan::Count(2).check_range(Interval { start: 5, end: 1 }),
            Err(crate::Error::InvalidRange)
        ));

        assert!(Plan::Count(2)
            .check_range(Interval {
                start: 0,
                end: i64::MAX
            })
            .is_ok());
        assert!(day.check_range(Interval { start: 0, end: DAY }).is_ok());
    }

    #[test_log::test]
    fn unchecked_range_does_not_panic() {
        let buckets = Plan::Width(BarWidth::Precision(Precision::Day))
            .buckets(Interval {
                start: i64::MAX - DAY,
                end: i64::MAX,
            })
            .collect::<Vec<_>>();

        assert!(buckets.iter().all(|b| b.duration() == DAY));
    }

    #[test_log::test]
    fn width_anchored_to_midnight() {
        let buckets = Plan::Width(BarWidth::Precision(Precision::Day))
            .buckets(Interval {
                start: DAY + 6 * HOUR,
                end: 3 * DAY + HOUR,
            })
            .collect::<Vec<_>>();

        assert_eq!(
            vec![
                Interval {
                    start: DAY,
                    end: 2 * DAY
                },
                Interval {
                    start: 2 * DAY,
                    end: 3 * DAY
                },
                Interval {
                    start: 3 * DAY,
                    end: 4 * DAY
                },
            ],
            buckets
        );
    }

    #[test_log::test]
    fn width_multi_day_keeps_full_width() {
        let buckets = Plan::Width(BarWidth::Days(3))
            .buckets(Interval {
                start: 0,
                end: 4 * DAY,
            })
            .collect::<Vec<_>>();

        assert_eq!(
            vec![
                Interval {
                    start: 0,
                    end: 3 * DAY
                },
                Interval {
                    start: 3 * DAY,
                    end: 6 * DAY
                },
            ],
            buckets
        );
    }

    #[test_log::test]
    fn invalid_parameters() {
        assert!(Plan::Count(0).validate().is_err());
        assert!(Plan::Width(BarWidth::Days(0)).validate().is_err());
        assert!(Plan::Width(BarWidth::Days(7)).validate().is_ok());
    }

    #[test_log::test]
    fn parse_precision() {
        assert!(matches!("hour".parse::<Precision>(), Ok(Precision::Hour)));
        assert!("fortnight".parse::<Precision>().is_err());
    }
}
