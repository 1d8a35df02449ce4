use std::time::Duration;

/// Default ingress queue capacity (frames).
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;
/// Default per-source latency buffer depth (frames).
pub const DEFAULT_BUFFER_LEN: usize = 5;
/// Default number of crossfade steps.
pub const DEFAULT_TRANSITION_COUNT: u32 = 10;
/// Default source-switch debounce length (frames).
pub const DEFAULT_SKIP_N: u32 = 5;
/// Default stale-source eviction timeout.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_millis(500);

/// Engine configuration, passed explicitly at construction.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use meld::prelude::Tunables;
///
/// let tunables = Tunables::default()
///     .buffer_len(3)
///     .source_timeout(Duration::from_millis(250));
/// assert_eq!(tunables.buffer_len, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    /// Ingress queue capacity.
    pub queue_capacity: usize,
    /// Frames accumulated for a newly promoted source before output resumes.
    pub buffer_len: usize,
    /// Crossfade step count; one step per blended frame pair.
    pub transition_count: u32,
    /// Frames from an unknown source required before it is promoted.
    pub skip_n: u32,
    /// Age after which an evicted source may compete again.
    pub source_timeout: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            buffer_len: DEFAULT_BUFFER_LEN,
            transition_count: DEFAULT_TRANSITION_COUNT,
            skip_n: DEFAULT_SKIP_N,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }
}

impl Tunables {
    /// Set the ingress queue capacity (minimum 1).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the per-source prefill depth.
    pub fn buffer_len(mut self, len: usize) -> Self {
        self.buffer_len = len;
        self
    }

    /// Set the crossfade step count (minimum 1).
    pub fn transition_count(mut self, count: u32) -> Self {
        self.transition_count = count.max(1);
        self
    }

    /// Set the source-switch debounce length.
    pub fn skip_n(mut self, n: u32) -> Self {
        self.skip_n = n;
        self
    }

    /// Set the stale-source eviction timeout.
    pub fn source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }
}
