mod config;
mod handle;
mod journal;
mod pool;

pub(crate) mod metrics;
pub(crate) mod sync;
pub(crate) mod util;


pub use config::{
    ColumnKind, ColumnMeta, JournalConfiguration, JournalExistence, JournalKey, JournalMetadata,
    PartitionBy,
};
pub use handle::JournalReader;
pub use journal::{Journal, JournalError, Row, Rows};
pub use metrics::{Counter, Gauge, PoolMetrics};

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use pool::PoolCore;

/// Error type for pool operations
///
/// Uses `thiserror` for automatic `Error` trait implementation; journal
/// open and metadata failures chain through the `Open` variant.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The journal name has no on-disk presence. Permanent for this name
    /// until something creates the journal.
    #[error("journal '{name}' does not exist")]
    JournalDoesNotExist { name: String },

    /// Another thread holds the administrative lock on this journal name.
    /// Retry after a caller-defined backoff.
    #[error("journal '{name}' is locked by thread {owner}")]
    Locked { name: String, owner: u64 },

    /// A lock attempt found a slot whose reader is still on loan. Retryable:
    /// the lock stays held, and the caller re-calls `lock` after backoff.
    #[error("journal '{name}' has a borrowed reader, retry the lock")]
    RetryLock { name: String },

    /// The pool has been closed. Terminal.
    #[error("reader pool is closed")]
    PoolClosed,

    /// Every slot of every entry in the name's chain is allocated and the
    /// chain is at its segment cap.
    #[error("reader pool is full for '{name}' ({max_entries} readers outstanding)")]
    PoolFull { name: String, max_entries: usize },

    /// Opening or refreshing the underlying journal failed. The slot
    /// allocation is rolled back before this surfaces.
    #[error(transparent)]
    Open(#[from] JournalError),
}

/// A thread-safe pool of journal readers.
///
/// Opening a journal is expensive (metadata resolution, partition mmaps,
/// symbol table loads), so the pool caches opened readers per journal name
/// and hands them out under an exclusive-ownership discipline: a reader
/// acquired with [`reader`](ReaderPool::reader) belongs to the calling
/// thread until the handle is dropped, at which point the reader returns to
/// its slot for reuse rather than being closed.
///
/// Acquisition and release are lock-free (one CAS each on the hot path);
/// capacity per name grows in banks of 32 slots up to the configured segment
/// cap. [`lock`](ReaderPool::lock) administratively drains a name so its
/// on-disk files can be mutated; [`close`](ReaderPool::close) (or dropping
/// the pool) frees every cached reader.
pub struct ReaderPool {
    core: Arc<PoolCore>,
}

/// Builder for constructing a ReaderPool with custom configuration
pub struct PoolBuilder {
    journal_base: PathBuf,
    max_segments: usize,
}

impl PoolBuilder {
    /// Create a new PoolBuilder for journals under `journal_base`.
    ///
    /// Defaults to 2 segments per journal name (64 concurrent readers).
    pub fn new(journal_base: impl Into<PathBuf>) -> Self {
        Self {
            journal_base: journal_base.into(),
            max_segments: 2,
        }
    }

    /// Cap the per-name segment chain. Each segment holds 32 reader slots,
    /// so a cap of `n` allows `n * 32` concurrent readers of one journal.
    pub fn max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments;
        self
    }

    /// Build the ReaderPool with the configured settings
    pub fn build(self) -> ReaderPool {
        assert!(
            self.max_segments >= 1,
            "pool needs at least one segment per journal name"
        );
        let config = JournalConfiguration::new(self.journal_base);
        ReaderPool {
            core: Arc::new(PoolCore::new(config, self.max_segments)),
        }
    }
}

impl ReaderPool {
    /// Create a pool with default settings for journals under
    /// `journal_base`. Use [`PoolBuilder`] for custom configuration.
    pub fn new(journal_base: impl Into<PathBuf>) -> Self {
        PoolBuilder::new(journal_base).build()
    }

    /// Acquire a reader for the named journal.
    ///
    /// Returns the name's cached reader (refreshed to see appended data) if
    /// one is free, or opens a new one. The handle is exclusively owned by
    /// the calling thread; dropping it returns the reader to the pool.
    pub fn reader(&self, name: &str) -> Result<JournalReader, PoolError> {
        if self.core.config().exists(name) != JournalExistence::Exists {
            return Err(PoolError::JournalDoesNotExist {
                name: name.to_string(),
            });
        }
        let metadata = Arc::new(self.core.config().read_metadata(name)?);
        self.core.acquire(metadata)
    }

    /// Acquire a reader for the journal described by `key`, overlaying the
    /// key's partitioning and sizing hints onto the on-disk metadata.
    pub fn reader_for(&self, key: &JournalKey) -> Result<JournalReader, PoolError> {
        if self.core.config().exists(&key.name) != JournalExistence::Exists {
            return Err(PoolError::JournalDoesNotExist {
                name: key.name.clone(),
            });
        }
        let metadata = self.core.config().create_metadata(key)?;
        self.core.acquire(metadata)
    }

    /// Acquire a reader from already-resolved metadata, skipping the
    /// metadata read the other entry points perform.
    pub fn reader_with_metadata(
        &self,
        metadata: Arc<JournalMetadata>,
    ) -> Result<JournalReader, PoolError> {
        self.core.acquire(metadata)
    }

    /// Exclude a journal name while its on-disk files are mutated (truncate,
    /// rename, rebuild).
    ///
    /// Re-entrant for the holding thread. Fails with
    /// [`PoolError::RetryLock`] if any reader of the name is still on loan;
    /// the lock stays held across retries, so a caller that gives up must
    /// [`unlock`](ReaderPool::unlock) or the name stays excluded until the
    /// pool is recycled.
    pub fn lock(&self, name: &str) -> Result<(), PoolError> {
        self.core.lock(name)
    }

    /// Release a lock held by this thread. No-op when the caller is not the
    /// owner.
    pub fn unlock(&self, name: &str) {
        self.core.unlock(name)
    }

    /// Close the pool, freeing every cached reader. Idempotent. Readers
    /// still on loan are freed when their handles drop; subsequent
    /// acquisitions fail with [`PoolError::PoolClosed`].
    pub fn close(&self) {
        self.core.close()
    }

    /// Total reader capacity per journal name.
    pub fn max_entries(&self) -> usize {
        self.core.max_entries()
    }

    /// Get a reference to the pool metrics
    pub fn metrics(&self) -> &PoolMetrics {
        self.core.metrics()
    }

    /// The configuration resolving names to on-disk journals.
    pub fn configuration(&self) -> &JournalConfiguration {
        self.core.config()
    }
}

impl Drop for ReaderPool {
    fn drop(&mut self) {
        self.core.close();
    }
}
