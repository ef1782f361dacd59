// Synchronization primitives that switch between std and loom based on
// feature flag, so the pool's interleavings can be model-checked.

#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};

#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};

// Helper for spin loop hints
#[cfg(not(feature = "loom"))]
#[inline]
pub(crate) fn spin_loop() {
    std::hint::spin_loop();
}

#[cfg(feature = "loom")]
#[inline]
pub(crate) fn spin_loop() {
    loom::thread::yield_now();
}

/// Interior-mutable cell guarded by an external CAS protocol rather than a
/// lock: the thread that wins a slot's owner CAS has exclusive access to the
/// cell until it stores the sentinel back.
pub(crate) struct SlotCell<T>(
    #[cfg(not(feature = "loom"))] std::cell::UnsafeCell<T>,
    #[cfg(feature = "loom")] loom::cell::UnsafeCell<T>,
);

impl<T> SlotCell<T> {
    pub(crate) fn new(value: T) -> Self {
        #[cfg(not(feature = "loom"))]
        {
            Self(std::cell::UnsafeCell::new(value))
        }
        #[cfg(feature = "loom")]
        {
            Self(loom::cell::UnsafeCell::new(value))
        }
    }

    /// Mutable access to the protected value.
    ///
    /// # Safety
    /// The caller must hold the slot allocation that guards this cell.
    #[cfg(not(feature = "loom"))]
    pub(crate) unsafe fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut *self.0.get())
    }

    #[cfg(feature = "loom")]
    pub(crate) unsafe fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.0.with_mut(|ptr| f(&mut *ptr))
    }
}

// Cross-thread access is mediated by the owner CAS; see pool.rs.
unsafe impl<T: Send> Send for SlotCell<T> {}
unsafe impl<T: Send> Sync for SlotCell<T> {}
