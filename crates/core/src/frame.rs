use std::sync::Arc;

use parking_lot::Mutex;

use crate::{format::VideoDesc, metrics::PoolMetrics};

/// Opaque, caller-supplied identifier of one frame source.
///
/// # Example
/// ```rust
/// use meld_core::prelude::SourceId;
///
/// let id = SourceId(0x1234_5678);
/// assert_ne!(id, SourceId(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

/// Handle to a pooled byte buffer.
///
/// When dropped, the buffer is returned to the originating pool so
/// later frames can reuse the allocation.
///
/// # Example
/// ```rust
/// use meld_core::prelude::BufferPool;
///
/// let pool = BufferPool::with_capacity(2, 1024);
/// let mut lease = pool.lease();
/// lease.resize(16);
/// assert_eq!(lease.len(), 16);
/// ```
pub struct BufferLease {
    pool: Arc<PoolInner>,
    buf: Option<Vec<u8>>,
}

impl BufferLease {
    /// Borrow as an immutable slice.
    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }

    /// Borrow as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }

    /// Current length of the buffer.
    pub fn len(&self) -> usize {
        self.buf.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ensure the buffer holds `len` zero-initialized bytes.
    pub fn resize(&mut self, len: usize) {
        if let Some(buf) = self.buf.as_mut() {
            if buf.capacity() < len {
                buf.reserve(len - buf.capacity());
            }
            buf.resize(len, 0);
        }
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.recycle(buf);
        }
    }
}

/// Pool that hands out reusable owned buffers.
///
/// # Example
/// ```rust
/// use meld_core::prelude::BufferPool;
///
/// let pool = BufferPool::with_limits(4, 1 << 20, 8);
/// let _lease = pool.lease();
/// ```
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
    metrics: Arc<PoolMetrics>,
}

impl BufferPool {
    /// Create a pool with `capacity` preallocated buffers of `chunk_size` bytes.
    pub fn with_capacity(capacity: usize, chunk_size: usize) -> Self {
        Self::with_limits(capacity, chunk_size, capacity)
    }

    /// Create a pool with `capacity` preallocated buffers and a maximum retained free list.
    pub fn with_limits(capacity: usize, chunk_size: usize, max_free: usize) -> Self {
        let mut free = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            free.push(vec![0; chunk_size]);
        }
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                chunk_size,
                max_free,
            }),
            metrics: Arc::new(PoolMetrics::default()),
        }
    }

    /// Acquire a buffer, allocating if the pool is empty.
    pub fn lease(&self) -> BufferLease {
        let buf = self
            .inner
            .free
            .lock()
            .pop()
            .inspect(|_| {
                self.metrics.hit();
            })
            .unwrap_or_else(|| {
                self.metrics.miss();
                self.metrics.alloc();
                vec![0; self.inner.chunk_size]
            });
        BufferLease {
            pool: self.inner.clone(),
            buf: Some(buf),
        }
    }

    /// Access metrics counters for this pool.
    pub fn metrics(&self) -> Arc<PoolMetrics> {
        self.metrics.clone()
    }
}

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    chunk_size: usize,
    max_free: usize,
}

impl PoolInner {
    fn recycle(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_free {
            free.push(buf);
        }
    }
}

/// One decoded video buffer with exclusive ownership of its pixels.
///
/// A frame is handed off by move at every stage boundary (queue push,
/// registry buffering, sink submission) and destroyed exactly once by
/// whichever owner drops it last; the backing buffer then recycles to
/// its pool.
///
/// # Example
/// ```rust
/// use meld_core::prelude::*;
///
/// let pool = BufferPool::with_capacity(1, 64);
/// let desc = VideoDesc::new(
///     FourCc::new(*b"GREY"),
///     Resolution::new(8, 8).unwrap(),
///     Interlacing::Progressive,
///     Interval::from_fps(30),
/// );
/// let frame = Frame::alloc(desc, SourceId(1), &pool).unwrap();
/// assert_eq!(frame.len(), 64);
/// ```
pub struct Frame {
    desc: VideoDesc,
    source: SourceId,
    data: BufferLease,
}

impl Frame {
    /// Allocate a frame sized from the descriptor's packed layout.
    ///
    /// Returns `None` when the pixel format's size is unknown; use
    /// [`Frame::with_len`] with an explicit length instead.
    pub fn alloc(desc: VideoDesc, source: SourceId, pool: &BufferPool) -> Option<Self> {
        let len = desc.data_len()?;
        let mut data = pool.lease();
        data.resize(len);
        Some(Self { desc, source, data })
    }

    /// Build a frame over a leased buffer with an explicit payload length.
    pub fn with_len(desc: VideoDesc, source: SourceId, mut data: BufferLease, len: usize) -> Self {
        data.resize(len);
        Self { desc, source, data }
    }

    /// Descriptor of this frame.
    pub fn desc(&self) -> VideoDesc {
        self.desc
    }

    /// Source this frame arrived from.
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Retag the frame with a different source id (used by sinks that
    /// stamp output frames with the on-air source).
    pub fn set_source(&mut self, source: SourceId) {
        self.source = source;
    }

    /// Pixel payload.
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Mutable pixel payload.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("desc", &self.desc)
            .field("source", &self.source)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{FourCc, Interlacing, Interval, Resolution};

    fn grey_desc() -> VideoDesc {
        VideoDesc::new(
            FourCc::new(*b"GREY"),
            Resolution::new(4, 4).unwrap(),
            Interlacing::Progressive,
            Interval::from_fps(30),
        )
    }

    #[test]
    fn pool_recycles_dropped_leases() {
        let pool = BufferPool::with_capacity(1, 16);
        drop(pool.lease());
        drop(pool.lease());
        let metrics = pool.metrics();
        assert_eq!(metrics.hits(), 2);
        assert_eq!(metrics.allocations(), 0);
    }

    #[test]
    fn pool_allocates_past_capacity() {
        let pool = BufferPool::with_capacity(1, 16);
        let a = pool.lease();
        let _b = pool.lease();
        drop(a);
        assert_eq!(pool.metrics().allocations(), 1);
    }

    #[test]
    fn alloc_sizes_from_descriptor() {
        let pool = BufferPool::with_capacity(1, 16);
        let frame = Frame::alloc(grey_desc(), SourceId(7), &pool).unwrap();
        assert_eq!(frame.len(), 16);
        assert_eq!(frame.source(), SourceId(7));
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn alloc_rejects_unknown_format() {
        let pool = BufferPool::with_capacity(1, 16);
        let mut desc = grey_desc();
        desc.code = FourCc::new(*b"MJPG");
        assert!(Frame::alloc(desc, SourceId(1), &pool).is_none());
    }
}
