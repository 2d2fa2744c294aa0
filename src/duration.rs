/// Helpers for calculating durations
///
/// All durations are plain millisecond counts, the same unit as [`crate::Timestamp`].
///
/// ```
/// use meterwise::Duration;
///
/// assert_eq!(86_400_000, Duration::days(1));
/// assert_eq!(Duration::hours(36), Duration::days(1) + Duration::hours(12));
/// ```
pub struct Duration;

impl Duration {
    /// Formats N weeks as millisecond time frame.
    #[must_use]
    pub const fn weeks(n: i64) -> i64 {
        Self::days(n) * 7
    }

    /// Formats N days as millisecond time frame.
    #[must_use]
    pub const fn days(n: i64) -> i64 {
        Self::hours(n) * 24
    }

    /// Formats N hours as millisecond time frame.
    #[must_use]
    pub const fn hours(n: i64) -> i64 {
        Self::minutes(n) * 60
    }

    /// Formats N minutes as millisecond time frame.
    #[must_use]
    pub const fn minutes(n: i64) -> i64 {
        Self::seconds(n) * 60
    }

    /// Formats N seconds as millisecond time frame.
    #[must_use]
    pub const fn seconds(n: i64) -> i64 {
        Self::millis(n) * 1_000
    }

    /// Formats N milliseconds as millisecond time frame.
    #[must_use]
    pub const fn millis(n: i64) -> i64 {
        n
    }
}
