use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters describing engine activity.
///
/// Shared between the engine thread and any number of handle clones.
///
/// # Example
/// ```rust
/// use meld::metrics::EngineMetrics;
///
/// let metrics = EngineMetrics::default();
/// metrics.record_submitted();
/// assert_eq!(metrics.snapshot().submitted, 1);
/// ```
#[derive(Debug, Default)]
pub struct EngineMetrics {
    submitted: AtomicU64,
    underruns: AtomicU64,
    hard_cuts: AtomicU64,
    promotions: AtomicU64,
    evictions: AtomicU64,
    debounced: AtomicU64,
}

impl EngineMetrics {
    /// One frame handed to the sink.
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// One output cycle skipped because a source backlog was empty.
    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    /// One crossfade degraded to a hard cut on descriptor mismatch.
    pub fn record_hard_cut(&self) {
        self.hard_cuts.fetch_add(1, Ordering::Relaxed);
    }

    /// One source promoted to active.
    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// One faded-out source moved to the disabled set.
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// One candidate frame destroyed by the switch debounce.
    pub fn record_debounced(&self) {
        self.debounced.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            hard_cuts: self.hard_cuts.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            debounced: self.debounced.load(Ordering::Relaxed),
        }
    }
}

/// Plain-data copy of [`EngineMetrics`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineMetricsSnapshot {
    pub submitted: u64,
    pub underruns: u64,
    pub hard_cuts: u64,
    pub promotions: u64,
    pub evictions: u64,
    pub debounced: u64,
}
