use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use crate::journal::Journal;
use crate::pool::{Entry, PoolCore};

/// A journal reader on loan from a [`ReaderPool`](crate::ReaderPool).
///
/// Dereferences to [`Journal`] for record access. Dropping the handle is the
/// close: the pool decides whether the underlying reader is recycled into
/// its slot or actually freed (pool closed, pool gone, or the name no longer
/// managed).
///
/// The handle must be dropped on the thread that acquired it. The pool's
/// ownership discipline is per-thread; a cross-thread drop is detected,
/// logged, and degrades to closing the reader directly instead of recycling
/// it, so no file descriptor leaks even under misuse.
pub struct JournalReader {
    journal: Option<Journal>,
    entry: Arc<Entry>,
    index: usize,
    /// Non-owning back-reference; a handle created after pool close never
    /// gets one, and its drop frees the reader directly.
    pool: Option<Weak<PoolCore>>,
}

impl JournalReader {
    pub(crate) fn attached(
        journal: Journal,
        entry: Arc<Entry>,
        index: usize,
        pool: Weak<PoolCore>,
    ) -> Self {
        Self {
            journal: Some(journal),
            entry,
            index,
            pool: Some(pool),
        }
    }

    pub(crate) fn detached(journal: Journal, entry: Arc<Entry>, index: usize) -> Self {
        Self {
            journal: Some(journal),
            entry,
            index,
            pool: None,
        }
    }

    /// Position of the home slot, as (chain index, slot index).
    pub fn home_slot(&self) -> (usize, usize) {
        (self.entry.index(), self.index)
    }
}

impl Deref for JournalReader {
    type Target = Journal;

    fn deref(&self) -> &Journal {
        self.journal.as_ref().expect("reader already returned")
    }
}

impl DerefMut for JournalReader {
    fn deref_mut(&mut self) -> &mut Journal {
        self.journal.as_mut().expect("reader already returned")
    }
}

impl Drop for JournalReader {
    fn drop(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        match self.pool.take().and_then(|weak| weak.upgrade()) {
            Some(pool) => {
                // The pool either captures the reader for reuse or hands it
                // back for an actual close.
                if let Some(journal) = pool.release(&self.entry, self.index, journal) {
                    journal.close();
                    pool.metrics().reader_close.increment();
                }
            }
            // Detached handle, or the pool itself is gone: free directly.
            None => journal.close(),
        }
    }
}
