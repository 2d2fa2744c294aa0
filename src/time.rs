use crate::Timestamp;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current timestamp in milliseconds since the Unix epoch.
///
/// A clock set before the epoch yields `0`.
#[must_use]
pub fn timestamp() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since_the_epoch| {
            Timestamp::try_from(since_the_epoch.as_millis()).unwrap_or(Timestamp::MAX)
        })
}
