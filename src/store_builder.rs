use crate::ReadingStore;
use fjall::TxKeyspace;
use std::path::Path;

/// Builder for [`ReadingStore`].
pub struct StoreBuilder {
    cache_size_mib: u64,
    max_memtable_size: u32,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBuilder {
    fn cache_size_bytes(mib: u64) -> u64 {
        mib.saturating_mul(1_024 * 1_024)
    }

    pub(crate) fn new() -> Self {
        Self {
            cache_size_mib: 64,
            max_memtable_size: 8_000_000,
        }
    }

    /// Sets the cache size in MiB.
    ///
    /// Only used by [`StoreBuilder::open`], an existing keyspace keeps its cache.
    ///
    /// Default = 64 MiB
    #[must_use]
    pub fn cache_size_mib(mut self, mib: u64) -> Self {
        self.cache_size_mib = mib;
        self
    }

    /// Sets the memtable size of the readings partition in bytes.
    ///
    /// Default = 8 MB
    #[must_use]
    pub fn max_memtable_size(mut self, bytes: u32) -> Self {
        self.max_memtable_size = bytes;
        self
    }

    /// Opens or recovers a reading store.
    ///
    /// If you have a keyspace already in your application, you may
    /// want to use `open_in_keyspace` instead.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn open<P: AsRef<Path>>(self, path: P) -> crate::Result<ReadingStore> {
        let keyspace = fjall::Config::new(path)
            .cache_size(Self::cache_size_bytes(self.cache_size_mib))
            .open_transactional()?;

        ReadingStore::from_keyspace(keyspace, self.max_memtable_size)
    }

    /// Uses an existing `fjall` keyspace to open a reading store.
    ///
    /// Partitions are prefixed with `_meterwise#` to avoid name clashes with other applications.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn open_in_keyspace(self, keyspace: TxKeyspace) -> crate::Result<ReadingStore> {
        ReadingStore::from_keyspace(keyspace, self.max_memtable_size)
    }
}
