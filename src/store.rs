use crate::{
    source::{GroupResolver, ReadingSource},
    store_builder::StoreBuilder,
    Entity, GroupId, MeterId, Reading, TimeRange, Timestamp,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use fjall::{CompressionType, PartitionCreateOptions, TxKeyspace, TxPartition, WriteTransaction};
use std::ops::Bound;

const READINGS_PARTITION: &str = "_meterwise#v1#readings";
const SPANS_PARTITION: &str = "_meterwise#v1#spans";
const GROUPS_PARTITION: &str = "_meterwise#v1#groups";

/// Key of a reading: meter (8) + start (8) + end (8)
const KEY_LEN: usize = 24;

/// Maps a timestamp to a big-endian sortable integer
#[allow(clippy::cast_sign_loss)]
fn encode_ts(ts: Timestamp) -> u64 {
    (ts as u64) ^ (1 << 63)
}

#[allow(clippy::cast_possible_wrap)]
fn decode_ts(raw: u64) -> Timestamp {
    (raw ^ (1 << 63)) as Timestamp
}

fn reading_key(meter: MeterId, start: Timestamp, end: Timestamp) -> crate::Result<Vec<u8>> {
    let mut key = Vec::with_capacity(KEY_LEN);
    key.write_u64::<BigEndian>(meter)?;
    key.write_u64::<BigEndian>(encode_ts(start))?;
    key.write_u64::<BigEndian>(encode_ts(end))?;
    Ok(key)
}

fn decode_reading(key: &[u8], value: &[u8]) -> crate::Result<Reading> {
    let mut key = key;
    let meter = key.read_u64::<BigEndian>()?;
    let start = decode_ts(key.read_u64::<BigEndian>()?);
    let end = decode_ts(key.read_u64::<BigEndian>()?);

    let mut value = value;
    let quantity = value.read_f64::<BigEndian>()?;

    Reading::new(meter, quantity, start, end)
}

fn serialize_members(members: &[MeterId]) -> crate::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(8 + members.len() * 8);
    bytes.write_u64::<BigEndian>(members.len() as u64)?;

    for &meter in members {
        bytes.write_u64::<BigEndian>(meter)?;
    }

    Ok(bytes)
}

fn deserialize_members(bytes: &[u8]) -> crate::Result<Vec<MeterId>> {
    let mut reader = bytes;

    let len = reader.read_u64::<BigEndian>()?;
    let mut members = Vec::with_capacity(usize::try_from(len).unwrap_or_default());

    for _ in 0..len {
        members.push(reader.read_u64::<BigEndian>()?);
    }

    Ok(members)
}

/// Embedded, persistent store for readings and group memberships
///
/// Serves as both collaborators of an [`crate::Engine`]:
///
/// ```
/// # let folder = tempfile::tempdir()?;
/// use meterwise::{Engine, Entity, Precision, Reading, ReadingStore};
///
/// let store = ReadingStore::builder().open(&folder)?;
/// store.insert(Reading::new(1, 24.0, 0, 86_400_000)?)?;
///
/// let engine = Engine::new(&store, &store);
/// let bars = engine
///     .bars(&[Entity::Meter(1)], Precision::Day)
///     .run()?
///     .collect()?;
///
/// assert_eq!(1, bars[&Entity::Meter(1)].len());
/// # Ok::<(), meterwise::Error>(())
/// ```
pub struct ReadingStore {
    keyspace: TxKeyspace,

    /// meter ‖ start ‖ end => quantity
    readings: TxPartition,

    /// meter => longest reading duration, bounds range scans
    spans: TxPartition,

    /// group => member meters
    groups: TxPartition,
}

impl ReadingStore {
    /// Creates a builder to open a store.
    #[must_use]
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Opens or recovers a store with default settings.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> crate::Result<Self> {
        Self::builder().open(path)
    }

    pub(crate) fn from_keyspace(keyspace: TxKeyspace, max_memtable_size: u32) -> crate::Result<Self> {
        let readings = keyspace.open_partition(
            READINGS_PARTITION,
            PartitionCreateOptions::default()
                .block_size(4_096)
                .compression(CompressionType::Lz4)
                .max_memtable_size(max_memtable_size),
        )?;

        let spans = keyspace.open_partition(
            SPANS_PARTITION,
            PartitionCreateOptions::default()
                .block_size(4_096)
                .compression(CompressionType::Lz4)
                .max_memtable_size(4_000_000),
        )?;

        let groups = keyspace.open_partition(
            GROUPS_PARTITION,
            PartitionCreateOptions::default()
                .block_size(4_096)
                .compression(CompressionType::Lz4)
                .max_memtable_size(4_000_000),
        )?;

        log::debug!("Opened reading store");

        Ok(Self {
            keyspace,
            readings,
            spans,
            groups,
        })
    }

    /// Widens the stored longest duration of a meter if needed.
    fn widen_span(
        &self,
        tx: &mut WriteTransaction,
        meter: MeterId,
        duration: i64,
    ) -> crate::Result<()> {
        let key = meter.to_be_bytes();

        let longest = match tx.get(&self.spans, key)? {
            Some(bytes) => {
                let mut reader = &bytes[..];
                reader.read_i64::<BigEndian>()?
            }
            None => 0,
        };

        if duration > longest {
            log::trace!("Longest reading of meter:{meter} is now {duration}ms");
            tx.insert(&self.spans, key, duration.to_be_bytes());
        }

        Ok(())
    }

    fn longest_span(&self, meter: MeterId) -> crate::Result<Option<i64>> {
        self.spans
            .get(meter.to_be_bytes())?
            .map(|bytes| {
                let mut reader = &bytes[..];
                Ok(reader.read_i64::<BigEndian>()?)
            })
            .transpose()
    }

    /// Stores a reading, replacing one with the same meter and interval.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn insert(&self, reading: Reading) -> crate::Result<()> {
        self.insert_all(std::iter::once(reading))
    }

    /// Stores many readings in one transaction, replacing those with the same
    /// meter and interval.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn insert_all(&self, readings: impl IntoIterator<Item = Reading>) -> crate::Result<()> {
        let mut tx = self.keyspace.write_tx();

        let mut longest = crate::HashMap::<MeterId, i64>::default();

        for reading in readings {
            let key = reading_key(reading.meter(), reading.start(), reading.end())?;
            tx.insert(&self.readings, key, reading.quantity().to_be_bytes());

            let entry = longest.entry(reading.meter()).or_default();
            *entry = (*entry).max(reading.duration());
        }

        for (meter, duration) in longest {
            self.widen_span(&mut tx, meter, duration)?;
        }

        tx.commit()?;

        Ok(())
    }

    /// Stores many readings in one transaction, skipping those whose meter and
    /// interval are already present.
    ///
    /// Returns how many readings were stored.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn insert_or_ignore_all(
        &self,
        readings: impl IntoIterator<Item = Reading>,
    ) -> crate::Result<usize> {
        let mut tx = self.keyspace.write_tx();

        let mut longest = crate::HashMap::<MeterId, i64>::default();
        let mut inserted = 0;

        for reading in readings {
            let key = reading_key(reading.meter(), reading.start(), reading.end())?;

            if tx.get(&self.readings, &key)?.is_some() {
                log::trace!("Skipping existing reading {reading}");
                continue;
            }

            tx.insert(&self.readings, key, reading.quantity().to_be_bytes());
            inserted += 1;

            let entry = longest.entry(reading.meter()).or_default();
            *entry = (*entry).max(reading.duration());
        }

        for (meter, duration) in longest {
            self.widen_span(&mut tx, meter, duration)?;
        }

        tx.commit()?;

        Ok(inserted)
    }

    /// Returns all readings of a meter, ordered by start and end.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn readings_by_meter(&self, meter: MeterId) -> crate::Result<Vec<Reading>> {
        let read_tx = self.keyspace.read_tx();

        read_tx
            .prefix(&self.readings, meter.to_be_bytes())
            .map(|kv| {
                let (k, v) = kv?;
                decode_reading(&k, &v)
            })
            .collect()
    }

    /// Sets the members of a group, replacing previous ones.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn set_group(
        &self,
        group: GroupId,
        members: impl IntoIterator<Item = MeterId>,
    ) -> crate::Result<()> {
        let members = members.into_iter().collect::<Vec<_>>();
        let bytes = serialize_members(&members)?;

        log::trace!("Setting members of group:{group} to {members:?}");

        self.groups.insert(group.to_be_bytes(), bytes)?;

        Ok(())
    }
}

impl ReadingSource for ReadingStore {
    fn fetch_readings(&self, meter: MeterId, range: TimeRange) -> crate::Result<Vec<Reading>> {
        let Some(longest) = self.longest_span(meter)? else {
            return Ok(vec![]);
        };

        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start >= end {
                return Ok(vec![]);
            }
        }

        // Readings intersecting [a, b) start in (a - longest, b), the scan
        // starts at a - longest and the filter below drops the excess
        let lo = match range.start {
            Some(start) => Bound::Included(reading_key(
                meter,
                start.saturating_sub(longest),
                Timestamp::MIN,
            )?),
            None => Bound::Included(meter.to_be_bytes().to_vec()),
        };

        let hi = match range.end {
            Some(end) => {
                let mut key = Vec::with_capacity(16);
                key.write_u64::<BigEndian>(meter)?;
                key.write_u64::<BigEndian>(encode_ts(end))?;
                Bound::Excluded(key)
            }
            None => {
                let mut key = meter.to_be_bytes().to_vec();
                key.extend_from_slice(&[u8::MAX; KEY_LEN - 8]);
                Bound::Included(key)
            }
        };

        let read_tx = self.keyspace.read_tx();

        let mut readings = vec![];

        for kv in read_tx.range(&self.readings, (lo, hi)) {
            let (k, v) = kv?;
            let reading = decode_reading(&k, &v)?;

            if range.intersects(&reading.interval()) {
                readings.push(reading);
            }
        }

        log::trace!(
            "Scanned {} readings of meter:{meter} in {range:?}",
            readings.len()
        );

        Ok(readings)
    }
}

impl GroupResolver for ReadingStore {
    fn resolve_group(&self, group: GroupId) -> crate::Result<Vec<MeterId>> {
        match self.groups.get(group.to_be_bytes())? {
            Some(bytes) => deserialize_members(&bytes),
            None => Err(crate::Error::UnknownEntity(Entity::Group(group))),
        }
    }
}
