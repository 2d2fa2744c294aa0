use crate::{Entity, GroupId, MeterId, Reading, TimeRange};
use std::sync::Arc;

/// Something that can hand out raw readings.
pub trait ReadingSource: Send + Sync {
    /// Returns all readings of `meter` whose interval intersects `range`.
    ///
    /// A meter without data yields an empty vector, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownEntity`] if the meter does not exist,
    /// or any other error if the readings could not be fetched.
    fn fetch_readings(&self, meter: MeterId, range: TimeRange) -> crate::Result<Vec<Reading>>;
}

/// Something that knows which meters belong to a group.
pub trait GroupResolver: Send + Sync {
    /// Returns the member meters of `group`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownEntity`] if the group does not exist,
    /// or any other error if the members could not be resolved.
    fn resolve_group(&self, group: GroupId) -> crate::Result<Vec<MeterId>>;
}

impl<T: ReadingSource + ?Sized> ReadingSource for &T {
    fn fetch_readings(&self, meter: MeterId, range: TimeRange) -> crate::Result<Vec<Reading>> {
        (**self).fetch_readings(meter, range)
    }
}

impl<T: ReadingSource + ?Sized> ReadingSource for Arc<T> {
    fn fetch_readings(&self, meter: MeterId, range: TimeRange) -> crate::Result<Vec<Reading>> {
        (**self).fetch_readings(meter, range)
    }
}

impl<T: GroupResolver + ?Sized> GroupResolver for &T {
    fn resolve_group(&self, group: GroupId) -> crate::Result<Vec<MeterId>> {
        (**self).resolve_group(group)
    }
}

impl<T: GroupResolver + ?Sized> GroupResolver for Arc<T> {
    fn resolve_group(&self, group: GroupId) -> crate::Result<Vec<MeterId>> {
        (**self).resolve_group(group)
    }
}

/// Readings and groups held in memory.
///
/// ```
/// use meterwise::{MemorySource, Reading, ReadingSource, TimeRange};
///
/// let mut source = MemorySource::default();
/// source.insert(Reading::new(1, 5.0, 0, 1_000)?);
/// source.insert(Reading::new(1, 5.0, 1_000, 2_000)?);
///
/// assert_eq!(1, source.fetch_readings(1, TimeRange::between(1_500, 3_000))?.len());
/// assert!(source.fetch_readings(2, TimeRange::unbounded())?.is_empty());
/// #
/// # Ok::<(), meterwise::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    readings: crate::HashMap<MeterId, Vec<Reading>>,
    groups: crate::HashMap<GroupId, Vec<MeterId>>,
}

impl MemorySource {
    /// Adds a reading.
    pub fn insert(&mut self, reading: Reading) {
        self.readings
            .entry(reading.meter())
            .or_default()
            .push(reading);
    }

    /// Defines (or redefines) the members of a group.
    pub fn set_group(&mut self, group: GroupId, members: impl IntoIterator<Item = MeterId>) {
        self.groups.insert(group, members.into_iter().collect());
    }
}

impl Extend<Reading> for MemorySource {
    fn extend<I: IntoIterator<Item = Reading>>(&mut self, iter: I) {
        for reading in iter {
            self.insert(reading);
        }
    }
}

impl FromIterator<Reading> for MemorySource {
    fn from_iter<I: IntoIterator<Item = Reading>>(iter: I) -> Self {
        let mut source = Self::default();
        source.extend(iter);
        source
    }
}

impl ReadingSource for MemorySource {
    fn fetch_readings(&self, meter: MeterId, range: TimeRange) -> crate::Result<Vec<Reading>> {
        Ok(self
            .readings
            .get(&meter)
            .map(|readings| {
                readings
                    .iter()
                    .filter(|r| range.intersects(&r.interval()))
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl GroupResolver for MemorySource {
    fn resolve_group(&self, group: GroupId) -> crate::Result<Vec<MeterId>> {
        self.groups
            .get(&group)
            .cloned()
            .ok_or(crate::Error::UnknownEntity(Entity::Group(group)))
    }
}
