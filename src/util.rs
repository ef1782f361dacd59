// Thread identity for the slot ownership protocol.
//
// Ids are dense nonzero u64s handed out on first use; zero is reserved for
// the UNALLOCATED/UNLOCKED sentinels. Deliberately std atomics even under
// loom: id assignment is not part of the modeled protocol.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Nonzero id of the calling thread, stable for the thread's lifetime.
#[inline]
pub(crate) fn thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}
