use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

use meld_core::prelude::{Frame, SourceId};

/// Per-source bookkeeping owned by the engine thread.
///
/// Tracks, for every source id, the frames buffered for latency
/// alignment (front = oldest) and, for evicted sources, the timestamp
/// they were last seen so continued arrival keeps them suppressed.
///
/// Single-writer, single-reader; no internal locking.
#[derive(Default)]
pub struct SourceRegistry {
    buffers: HashMap<SourceId, VecDeque<Frame>>,
    disabled: HashMap<SourceId, Instant>,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is currently evicted. Refreshes the last-seen stamp
    /// as a side effect, so a source that keeps sending stays suppressed.
    pub fn is_disabled(&mut self, id: SourceId, now: Instant) -> bool {
        match self.disabled.get_mut(&id) {
            Some(last_seen) => {
                *last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Remove disabled entries whose last-seen exceeds `timeout`, making
    /// those ids eligible to compete for promotion again.
    pub fn sweep_expired(&mut self, now: Instant, timeout: Duration) {
        self.disabled.retain(|id, last_seen| {
            let keep = now.saturating_duration_since(*last_seen) <= timeout;
            if !keep {
                debug!(source = id.0, "evicted source timed out, forgetting it");
            }
            keep
        });
    }

    /// Move `id` into the disabled set.
    pub fn disable(&mut self, id: SourceId, now: Instant) {
        self.disabled.insert(id, now);
    }

    /// Append a frame to the backlog for `id`.
    pub fn buffer_frame(&mut self, id: SourceId, frame: Frame) {
        self.buffers.entry(id).or_default().push_back(frame);
    }

    /// Remove and return the oldest buffered frame for `id`, if any.
    pub fn pop_frame(&mut self, id: SourceId) -> Option<Frame> {
        self.buffers.get_mut(&id)?.pop_front()
    }

    /// Buffered frame count for `id`.
    pub fn depth(&self, id: SourceId) -> usize {
        self.buffers.get(&id).map(|b| b.len()).unwrap_or(0)
    }

    /// Destroy the entire backlog for `id` (used when evicting).
    pub fn drop_all(&mut self, id: SourceId) {
        self.buffers.remove(&id);
    }

    /// Ids currently in the disabled set (test/diagnostic helper).
    pub fn disabled_ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.disabled.keys().copied()
    }
}
