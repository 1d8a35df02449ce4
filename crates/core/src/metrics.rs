use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for buffer pool behavior.
///
/// # Example
/// ```rust
/// use meld_core::metrics::PoolMetrics;
///
/// let metrics = PoolMetrics::default();
/// metrics.hit();
/// assert_eq!(metrics.hits(), 1);
/// ```
#[derive(Debug, Default)]
pub struct PoolMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    allocations: AtomicU64,
}

impl PoolMetrics {
    /// Increment hit counter.
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment miss counter.
    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment allocation counter.
    pub fn alloc(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of hits.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Snapshot of misses.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Snapshot of allocations.
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }
}

impl Clone for PoolMetrics {
    fn clone(&self) -> Self {
        let cloned = PoolMetrics::default();
        cloned.hits.store(self.hits(), Ordering::Relaxed);
        cloned.misses.store(self.misses(), Ordering::Relaxed);
        cloned
            .allocations
            .store(self.allocations(), Ordering::Relaxed);
        cloned
    }
}

/// Counters for ingress queue admission outcomes.
///
/// # Example
/// ```rust
/// use meld_core::metrics::QueueMetrics;
///
/// let metrics = QueueMetrics::default();
/// metrics.rejected();
/// assert_eq!(metrics.rejected_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct QueueMetrics {
    accepted: AtomicU64,
    rejected: AtomicU64,
    discarded: AtomicU64,
}

impl QueueMetrics {
    /// Record an accepted push.
    pub fn accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a push turned away under backpressure.
    pub fn rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a caller-requested discard.
    pub fn discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of accepted pushes.
    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Snapshot of rejected pushes.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Snapshot of discards.
    pub fn discarded_count(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl Clone for QueueMetrics {
    fn clone(&self) -> Self {
        let cloned = QueueMetrics::default();
        cloned.accepted.store(self.accepted_count(), Ordering::Relaxed);
        cloned.rejected.store(self.rejected_count(), Ordering::Relaxed);
        cloned
            .discarded
            .store(self.discarded_count(), Ordering::Relaxed);
        cloned
    }
}
