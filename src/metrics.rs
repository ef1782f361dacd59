use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Monotonically increasing counter
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// Gauge that can increase or decrease
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-pool metrics for observability and testing
///
/// Each pool instance has its own set of metrics, allowing:
/// - Isolated testing with loom (no global state contamination)
/// - Multiple pool instances with independent metrics
/// - Clean metric validation in tests
pub struct PoolMetrics {
    // Reader lifecycle
    pub reader_open: Counter,
    pub reader_reuse: Counter,
    pub reader_return: Counter,
    pub reader_close: Counter,

    // Defensive return paths
    pub foreign_close: Counter,
    pub not_owner_release: Counter,

    // Chain and lock activity
    pub entry_grow: Counter,
    pub lock_retry: Counter,

    // Current state gauges
    pub readers_cached: Gauge,
    pub slots_allocated: Gauge,
}

impl PoolMetrics {
    /// Create a new set of metrics for a pool instance
    pub fn new() -> Self {
        Self {
            reader_open: Counter::new(),
            reader_reuse: Counter::new(),
            reader_return: Counter::new(),
            reader_close: Counter::new(),
            foreign_close: Counter::new(),
            not_owner_release: Counter::new(),
            entry_grow: Counter::new(),
            lock_retry: Counter::new(),
            readers_cached: Gauge::new(),
            slots_allocated: Gauge::new(),
        }
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}
