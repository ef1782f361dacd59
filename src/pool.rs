use std::sync::Arc;

use clocksource::precise::{AtomicInstant, Instant};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tracing::{debug, error, trace};

use crate::config::{JournalConfiguration, JournalExistence, JournalMetadata};
use crate::handle::JournalReader;
use crate::journal::Journal;
use crate::metrics::PoolMetrics;
use crate::sync::{spin_loop, AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering, SlotCell};
use crate::util::thread_id;
use crate::PoolError;

/// Number of reader slots in each entry of a journal's segment chain.
pub(crate) const ENTRY_SIZE: usize = 32;

/// Owner word of a slot no thread has claimed.
const UNALLOCATED: u64 = 0;

/// Lock word of an entry no thread holds the administrative lock on.
const UNLOCKED: u64 = 0;

/// One reader slot.
///
/// The owner word is the synchronization point: a successful CAS from
/// UNALLOCATED grants the winning thread exclusive ownership of the slot,
/// including the reader cell, until it stores UNALLOCATED back.
pub(crate) struct Slot {
    owner: AtomicU64,
    /// When the slot's reader was last returned; read by release_all to
    /// honor eviction deadlines.
    released_at: AtomicInstant,
    /// True iff a reader object exists for this slot, including one
    /// currently on loan to a borrower.
    cached: AtomicBool,
    /// The resident reader. Empty while on loan; repopulated on return.
    reader: SlotCell<Option<Journal>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            owner: AtomicU64::new(UNALLOCATED),
            released_at: AtomicInstant::now(),
            cached: AtomicBool::new(false),
            reader: SlotCell::new(None),
        }
    }
}

/// A bank of 32 reader slots. Entries chain per journal name to extend
/// capacity; the chain is append-only and grows by at most one entry at a
/// time through the next_status claim bit.
pub(crate) struct Entry {
    index: usize,
    slots: [Slot; ENTRY_SIZE],
    /// Thread holding the administrative lock for this journal name, or
    /// UNLOCKED. Only meaningful on the head entry of a chain.
    lock_owner: AtomicU64,
    /// Claim bit for growing the chain: the thread that CASes 0 -> 1 builds
    /// and publishes `next`.
    next_status: AtomicU32,
    /// Published successor. Owns one strong count of the Arc it points to.
    next: AtomicPtr<Entry>,
}

impl Entry {
    fn new(index: usize) -> Self {
        Self {
            index,
            slots: std::array::from_fn(|_| Slot::new()),
            lock_owner: AtomicU64::new(UNLOCKED),
            next_status: AtomicU32::new(0),
            next: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// The published successor, if any.
    fn next(&self) -> Option<Arc<Entry>> {
        let ptr = self.next.load(Ordering::Acquire);
        if ptr.is_null() {
            None
        } else {
            // The chain keeps its own strong count on `ptr`; take another
            // for the caller.
            unsafe {
                Arc::increment_strong_count(ptr);
                Some(Arc::from_raw(ptr))
            }
        }
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        let ptr = self.next.load(Ordering::Relaxed);
        if !ptr.is_null() {
            unsafe { drop(Arc::from_raw(ptr)) };
        }
    }
}

/// Shared pool state. The public surface lives on
/// [`ReaderPool`](crate::ReaderPool); borrowed handles keep a weak
/// back-reference here so a returned reader can find its way home.
pub(crate) struct PoolCore {
    entries: DashMap<String, Arc<Entry>, ahash::RandomState>,
    closed: AtomicBool,
    config: JournalConfiguration,
    max_segments: usize,
    metrics: PoolMetrics,
}

impl PoolCore {
    pub(crate) fn new(config: JournalConfiguration, max_segments: usize) -> Self {
        Self {
            entries: DashMap::with_hasher(ahash::RandomState::new()),
            closed: AtomicBool::new(false),
            config,
            max_segments,
            metrics: PoolMetrics::new(),
        }
    }

    pub(crate) fn config(&self) -> &JournalConfiguration {
        &self.config
    }

    pub(crate) fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    pub(crate) fn max_entries(&self) -> usize {
        self.max_segments * ENTRY_SIZE
    }

    /// Acquire a reader for the journal described by `metadata`: find or
    /// create the name's chain, claim a slot, and hand out its cached reader
    /// (refreshed) or a freshly opened one.
    pub(crate) fn acquire(
        self: &Arc<Self>,
        metadata: Arc<JournalMetadata>,
    ) -> Result<JournalReader, PoolError> {
        if self.closed.load(Ordering::Relaxed) {
            debug!("pool is closed");
            return Err(PoolError::PoolClosed);
        }

        let thread = thread_id();
        let mut entry = match self.entries.get(metadata.name.as_str()) {
            Some(head) => head.value().clone(),
            None => self.install_head(&metadata.name, thread)?,
        };

        let lock_owner = entry.lock_owner.load(Ordering::Relaxed);
        if lock_owner != UNLOCKED {
            debug!(name = %metadata.name, owner = lock_owner, "journal is locked");
            return Err(PoolError::Locked {
                name: metadata.name.clone(),
                owner: lock_owner,
            });
        }

        loop {
            for index in 0..ENTRY_SIZE {
                let slot = &entry.slots[index];
                if slot
                    .owner
                    .compare_exchange(UNALLOCATED, thread, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    trace!(
                        name = %metadata.name,
                        entry = entry.index,
                        slot = index,
                        thread,
                        "allocated reader slot"
                    );
                    self.metrics.slots_allocated.increment();
                    return self.take_or_open(entry, index, metadata);
                }
            }

            // All 32 slots taken; grow the chain or give up at the cap.
            if entry.index + 1 >= self.max_segments {
                debug!(
                    name = %metadata.name,
                    max_segments = self.max_segments,
                    "cannot allocate reader, pool is full"
                );
                return Err(PoolError::PoolFull {
                    name: metadata.name.clone(),
                    max_entries: self.max_entries(),
                });
            }

            if entry
                .next_status
                .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                debug!(name = %metadata.name, index = entry.index + 1, "growing segment chain");
                let next = Arc::new(Entry::new(entry.index + 1));
                entry
                    .next
                    .store(Arc::into_raw(next) as *mut Entry, Ordering::Release);
                self.metrics.entry_grow.increment();
            }

            // Advance, waiting out the winner's publication if we lost.
            entry = loop {
                match entry.next() {
                    Some(next) => break next,
                    None => spin_loop(),
                }
            };
        }
    }

    /// Create and install the head entry for a name, racing other threads
    /// through the map's put-if-absent. The race winner also verifies the
    /// journal exists on disk; the entry stays installed either way, and a
    /// loser for a nonexistent journal surfaces the failure at reader open.
    fn install_head(&self, name: &str, thread: u64) -> Result<Arc<Entry>, PoolError> {
        trace!(name, thread, "racing to create first entry");
        let candidate = Arc::new(Entry::new(0));
        let (head, won) = match self.entries.entry(name.to_string()) {
            MapEntry::Occupied(occupied) => (occupied.get().clone(), false),
            MapEntry::Vacant(vacant) => {
                vacant.insert(candidate.clone());
                (candidate, true)
            }
        };
        if won {
            if self.config.exists(name) != JournalExistence::Exists {
                debug!(name, "journal does not exist");
                return Err(PoolError::JournalDoesNotExist {
                    name: name.to_string(),
                });
            }
            trace!(name, thread, "won the race to create first entry");
        } else {
            trace!(name, thread, "lost the race to create first entry");
        }
        Ok(head)
    }

    /// Produce a reader out of a slot this thread has just claimed: refresh
    /// the cached reader or open a fresh one, then attach the handle to the
    /// pool unless a concurrent close makes the reader a throwaway.
    fn take_or_open(
        self: &Arc<Self>,
        entry: Arc<Entry>,
        index: usize,
        metadata: Arc<JournalMetadata>,
    ) -> Result<JournalReader, PoolError> {
        let slot = &entry.slots[index];
        let resident = unsafe { slot.reader.with_mut(Option::take) };

        let journal = match resident {
            Some(mut journal) => {
                if let Err(err) = journal.refresh() {
                    // The cached reader is broken: close it, clear the slot
                    // and roll the allocation back before surfacing.
                    error!(name = %metadata.name, %err, "refresh of cached reader failed");
                    journal.close();
                    self.metrics.reader_close.increment();
                    self.metrics.readers_cached.decrement();
                    slot.cached.store(false, Ordering::Release);
                    slot.owner.store(UNALLOCATED, Ordering::Release);
                    self.metrics.slots_allocated.decrement();
                    return Err(err.into());
                }
                self.metrics.reader_reuse.increment();
                journal
            }
            None => {
                let location = self.config.location(&metadata.name);
                let journal = match Journal::open(Arc::clone(&metadata), location) {
                    Ok(journal) => journal,
                    Err(err) => {
                        // Roll the allocation back so the slot is reusable.
                        slot.owner.store(UNALLOCATED, Ordering::Release);
                        self.metrics.slots_allocated.decrement();
                        return Err(err.into());
                    }
                };
                self.metrics.reader_open.increment();

                if self.closed.load(Ordering::Relaxed) {
                    // Closed while we were opening: hand the reader out
                    // unattached so the borrower frees it directly. The slot
                    // stays claimed; the pool is terminal anyway.
                    return Ok(JournalReader::detached(journal, entry, index));
                }
                slot.cached.store(true, Ordering::Release);
                self.metrics.readers_cached.increment();
                journal
            }
        };

        // A close racing with this acquisition must not leave the reader
        // attached; mirror its sweep by detaching here.
        if self.closed.load(Ordering::Relaxed) {
            slot.cached.store(false, Ordering::Release);
            self.metrics.readers_cached.decrement();
            return Ok(JournalReader::detached(journal, entry, index));
        }

        Ok(JournalReader::attached(
            journal,
            entry,
            index,
            Arc::downgrade(self),
        ))
    }

    /// Take back a borrowed reader. Returns the journal to the caller when
    /// it must be freed ("you may actually close"), or None when the pool
    /// has captured it for reuse.
    pub(crate) fn release(
        &self,
        entry: &Arc<Entry>,
        index: usize,
        journal: Journal,
    ) -> Option<Journal> {
        let thread = thread_id();

        if !self.entries.contains_key(journal.name()) {
            error!(name = journal.name(), "reader is not managed by this pool");
            self.metrics.foreign_close.increment();
            return Some(journal);
        }

        let slot = &entry.slots[index];
        if slot.owner.load(Ordering::Relaxed) != thread {
            error!(
                name = journal.name(),
                entry = entry.index,
                slot = index,
                thread,
                "thread does not own the reader it is returning"
            );
            self.metrics.not_owner_release.increment();
            return Some(journal);
        }

        if self.closed.load(Ordering::Relaxed) {
            // Keep the slot claimed and let the borrower free the reader.
            slot.cached.store(false, Ordering::Release);
            self.metrics.readers_cached.decrement();
            return Some(journal);
        }

        trace!(name = journal.name(), thread, "released reader");
        unsafe { slot.reader.with_mut(|cell| *cell = Some(journal)) };
        slot.released_at.store(Instant::now(), Ordering::Release);
        slot.owner.store(UNALLOCATED, Ordering::Release);
        self.metrics.slots_allocated.decrement();
        self.metrics.reader_return.increment();
        None
    }

    /// Administratively drain a journal name so its on-disk files can be
    /// mutated. Claims every free slot for the caller and closes the cached
    /// readers; a slot still on loan fails with RETRY without unwinding, and
    /// the lock stays held across retries.
    pub(crate) fn lock(&self, name: &str) -> Result<(), PoolError> {
        let head = match self.entries.get(name) {
            Some(head) => head.value().clone(),
            None => return Ok(()),
        };
        let thread = thread_id();

        match head
            .lock_owner
            .compare_exchange(UNLOCKED, thread, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => {}
            // Re-entrant: the caller already holds the lock.
            Err(owner) if owner == thread => {}
            Err(owner) => {
                error!(name, owner, "journal is already locked");
                return Err(PoolError::Locked {
                    name: name.to_string(),
                    owner,
                });
            }
        }

        let mut entry = Some(head);
        while let Some(e) = entry {
            for index in 0..ENTRY_SIZE {
                let slot = &e.slots[index];
                if slot
                    .owner
                    .compare_exchange(UNALLOCATED, thread, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    // Reclaimed; the slot stays claimed by the lock holder.
                    if let Some(journal) = unsafe { slot.reader.with_mut(Option::take) } {
                        debug!(name, entry = e.index, slot = index, "closing cached reader under lock");
                        journal.close();
                        slot.cached.store(false, Ordering::Release);
                        self.metrics.reader_close.increment();
                        self.metrics.readers_cached.decrement();
                    }
                } else if slot.cached.load(Ordering::Acquire) {
                    // A borrower still holds this slot's reader. The caller
                    // backs off and retries; slots already reclaimed stay
                    // reclaimed and lock_owner stays set.
                    debug!(name, entry = e.index, slot = index, "reader still borrowed, retry lock");
                    self.metrics.lock_retry.increment();
                    return Err(PoolError::RetryLock {
                        name: name.to_string(),
                    });
                }
            }
            entry = e.next();
        }
        Ok(())
    }

    /// Release an administrative lock held by this thread by dropping the
    /// name's chain; the next acquisition recreates it fresh. No-op when the
    /// caller is not the owner.
    pub(crate) fn unlock(&self, name: &str) {
        let thread = thread_id();
        let removed = self
            .entries
            .remove_if(name, |_, head| head.lock_owner.load(Ordering::Relaxed) == thread);
        if removed.is_some() {
            debug!(name, thread, "unlocked journal and dropped its chain");
        }
    }

    /// Shut the pool down. Idempotent: the thread that flips `closed` frees
    /// every cached reader; everyone else returns immediately.
    pub(crate) fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            debug!("closing reader pool");
            self.release_all(None);
        }
    }

    /// Free cached readers whose last return predates `deadline` (None
    /// frees everything). Slots on loan are skipped; their borrowers free
    /// the readers on return once the pool is closed.
    pub(crate) fn release_all(&self, deadline: Option<Instant>) {
        let thread = thread_id();
        for item in self.entries.iter() {
            let mut entry = Some(item.value().clone());
            while let Some(e) = entry {
                for slot in &e.slots {
                    let released_at = slot.released_at.load(Ordering::Acquire);
                    let expired = deadline.map_or(true, |d| released_at < d);
                    if expired
                        && slot.cached.load(Ordering::Acquire)
                        && slot
                            .owner
                            .compare_exchange(
                                UNALLOCATED,
                                thread,
                                Ordering::Acquire,
                                Ordering::Relaxed,
                            )
                            .is_ok()
                    {
                        // Re-check the deadline now that the slot is ours.
                        if deadline.map_or(true, |d| slot.released_at.load(Ordering::Relaxed) < d)
                        {
                            if let Some(journal) = unsafe { slot.reader.with_mut(Option::take) } {
                                debug!(name = journal.name(), "closing cached reader");
                                journal.close();
                                slot.cached.store(false, Ordering::Release);
                                self.metrics.reader_close.increment();
                                self.metrics.readers_cached.decrement();
                            }
                        }
                        slot.owner.store(UNALLOCATED, Ordering::Release);
                    }
                }
                entry = e.next();
            }
        }
    }
}
