use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use meld_core::prelude::{BufferPool, Frame, SourceId, VideoDesc};

/// Errors surfaced by a display sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink has not been configured with a descriptor")]
    Unconfigured,
    #[error("reconfigure rejected: {0}")]
    Reconfigure(String),
    #[error("sink closed")]
    Closed,
    #[error("sink backend error: {0}")]
    Backend(String),
}

impl SinkError {
    /// Stable string code for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            SinkError::Unconfigured => "unconfigured",
            SinkError::Reconfigure(_) => "reconfigure_rejected",
            SinkError::Closed => "closed",
            SinkError::Backend(_) => "backend_error",
        }
    }
}

/// Result of a non-erroring submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The sink took ownership of the frame.
    Accepted,
    /// Non-blocking submit found the sink saturated; the frame was dropped.
    Rejected,
}

/// Downstream display abstraction consumed by the engine.
///
/// The engine treats `acquire`/`submit` as its only synchronization
/// surface with the real device; the sink runs its own pacing behind
/// them.
pub trait DisplaySink: Send {
    /// Adopt a new output descriptor. Idempotent; implementations must
    /// no-op when the descriptor is unchanged. A rejected reconfigure
    /// is fatal to the current engine run.
    fn reconfigure(&mut self, desc: VideoDesc) -> Result<(), SinkError>;

    /// Hand out a writable frame matching the configured descriptor.
    /// May block while the sink's own pipeline is saturated.
    fn acquire(&mut self) -> Result<Frame, SinkError>;

    /// Take ownership of a finished frame for presentation. With
    /// `blocking = false` the sink may return [`SubmitOutcome::Rejected`]
    /// instead of waiting for a slot.
    fn submit(&mut self, frame: Frame, blocking: bool) -> Result<SubmitOutcome, SinkError>;

    /// Propagate end-of-stream; no frame follows this call.
    fn end_of_stream(&mut self) -> Result<(), SinkError>;
}

#[derive(Default)]
struct CollectorShared {
    frames: Vec<Frame>,
    finished: bool,
    reconfigures: u64,
}

/// Sink that records every submitted frame into a shared log.
///
/// Clones share the log, so a clone kept outside the engine can inspect
/// what was presented. Used by tests, demos, and as a reference sink
/// implementation.
///
/// # Example
/// ```rust
/// use meld::prelude::*;
///
/// let sink = CollectorSink::new();
/// let inspect = sink.clone();
/// // ... move `sink` into an engine, later:
/// assert_eq!(inspect.frame_count(), 0);
/// ```
#[derive(Clone)]
pub struct CollectorSink {
    shared: Arc<Mutex<CollectorShared>>,
    pool: BufferPool,
    configured: Option<VideoDesc>,
    capacity: Option<usize>,
}

impl CollectorSink {
    /// Unbounded collector.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(CollectorShared::default())),
            pool: BufferPool::with_limits(2, 0, 4),
            configured: None,
            capacity: None,
        }
    }

    /// Collector that rejects non-blocking submits past `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut sink = Self::new();
        sink.capacity = Some(capacity);
        sink
    }

    /// Number of frames presented so far.
    pub fn frame_count(&self) -> usize {
        self.shared.lock().frames.len()
    }

    /// Drain and return the presented frames in submission order.
    pub fn take_frames(&self) -> Vec<Frame> {
        std::mem::take(&mut self.shared.lock().frames)
    }

    /// Whether end-of-stream has been forwarded.
    pub fn is_finished(&self) -> bool {
        self.shared.lock().finished
    }

    /// How many times the descriptor actually changed.
    pub fn reconfigure_count(&self) -> u64 {
        self.shared.lock().reconfigures
    }
}

impl Default for CollectorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for CollectorSink {
    fn reconfigure(&mut self, desc: VideoDesc) -> Result<(), SinkError> {
        if self.configured == Some(desc) {
            return Ok(());
        }
        self.configured = Some(desc);
        self.shared.lock().reconfigures += 1;
        Ok(())
    }

    fn acquire(&mut self) -> Result<Frame, SinkError> {
        let desc = self.configured.ok_or(SinkError::Unconfigured)?;
        Frame::alloc(desc, SourceId(0), &self.pool)
            .ok_or_else(|| SinkError::Backend(format!("cannot size format {}", desc.code)))
    }

    fn submit(&mut self, frame: Frame, blocking: bool) -> Result<SubmitOutcome, SinkError> {
        let mut shared = self.shared.lock();
        if shared.finished {
            return Err(SinkError::Closed);
        }
        if !blocking
            && let Some(cap) = self.capacity
            && shared.frames.len() >= cap
        {
            return Ok(SubmitOutcome::Rejected);
        }
        shared.frames.push(frame);
        Ok(SubmitOutcome::Accepted)
    }

    fn end_of_stream(&mut self) -> Result<(), SinkError> {
        self.shared.lock().finished = true;
        Ok(())
    }
}

/// Sink that counts and drops everything (throughput testing).
///
/// # Example
/// ```rust
/// use meld::prelude::*;
///
/// let sink = DiscardSink::new();
/// assert_eq!(sink.submitted(), 0);
/// ```
#[derive(Clone)]
pub struct DiscardSink {
    submitted: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    pool: BufferPool,
    configured: Option<VideoDesc>,
}

impl DiscardSink {
    pub fn new() -> Self {
        Self {
            submitted: Arc::new(AtomicU64::new(0)),
            finished: Arc::new(AtomicBool::new(false)),
            pool: BufferPool::with_limits(2, 0, 4),
            configured: None,
        }
    }

    /// Frames presented and dropped so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Whether end-of-stream has been forwarded.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

impl Default for DiscardSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for DiscardSink {
    fn reconfigure(&mut self, desc: VideoDesc) -> Result<(), SinkError> {
        self.configured = Some(desc);
        Ok(())
    }

    fn acquire(&mut self) -> Result<Frame, SinkError> {
        let desc = self.configured.ok_or(SinkError::Unconfigured)?;
        Frame::alloc(desc, SourceId(0), &self.pool)
            .ok_or_else(|| SinkError::Backend(format!("cannot size format {}", desc.code)))
    }

    fn submit(&mut self, _frame: Frame, _blocking: bool) -> Result<SubmitOutcome, SinkError> {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(SubmitOutcome::Accepted)
    }

    fn end_of_stream(&mut self) -> Result<(), SinkError> {
        self.finished.store(true, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meld_core::prelude::*;

    fn desc() -> VideoDesc {
        VideoDesc::new(
            FourCc::new(*b"GREY"),
            Resolution::new(2, 2).unwrap(),
            Interlacing::Progressive,
            Interval::from_fps(30),
        )
    }

    #[test]
    fn collector_records_in_order() {
        let mut sink = CollectorSink::new();
        let inspect = sink.clone();
        sink.reconfigure(desc()).unwrap();
        for level in 1..=3u8 {
            let mut frame = sink.acquire().unwrap();
            frame.data_mut().fill(level);
            assert_eq!(
                sink.submit(frame, true).unwrap(),
                SubmitOutcome::Accepted
            );
        }
        sink.end_of_stream().unwrap();
        let frames = inspect.take_frames();
        let levels: Vec<u8> = frames.iter().map(|f| f.data()[0]).collect();
        assert_eq!(levels, vec![1, 2, 3]);
        assert!(inspect.is_finished());
    }

    #[test]
    fn collector_reconfigure_is_idempotent() {
        let mut sink = CollectorSink::new();
        sink.reconfigure(desc()).unwrap();
        sink.reconfigure(desc()).unwrap();
        assert_eq!(sink.reconfigure_count(), 1);
    }

    #[test]
    fn collector_acquire_requires_configuration() {
        let mut sink = CollectorSink::new();
        assert!(matches!(sink.acquire(), Err(SinkError::Unconfigured)));
    }

    #[test]
    fn bounded_collector_rejects_nonblocking() {
        let mut sink = CollectorSink::with_capacity(1);
        sink.reconfigure(desc()).unwrap();
        let first = sink.acquire().unwrap();
        sink.submit(first, false).unwrap();
        let second = sink.acquire().unwrap();
        assert_eq!(
            sink.submit(second, false).unwrap(),
            SubmitOutcome::Rejected
        );
    }
}
