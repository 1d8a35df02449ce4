use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::metrics::QueueMetrics;

/// How a push behaves when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionMode {
    /// Suspend the calling thread until the queue has room.
    Block,
    /// Enqueue if room, otherwise drop the value and report rejection.
    NonBlock,
    /// Always drop the value without enqueuing.
    Discard,
}

/// Result of attempting to enqueue.
///
/// # Example
/// ```rust
/// use meld_core::prelude::{AdmissionMode, PushOutcome, ingress};
///
/// let (tx, _rx) = ingress::<u8>(1);
/// assert_eq!(tx.push(1, AdmissionMode::NonBlock), PushOutcome::Accepted);
/// assert_eq!(tx.push(2, AdmissionMode::NonBlock), PushOutcome::Rejected);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Value was enqueued.
    Accepted,
    /// Queue was full (`NonBlock`) or closed; value was dropped.
    Rejected,
    /// Caller requested `Discard`; value was dropped without enqueuing.
    Discarded,
}

/// Result of a blocking dequeue.
#[derive(Debug)]
pub enum PopOutcome<T> {
    /// Received value, in strict global arrival order.
    Data(T),
    /// Queue has been closed and drained.
    Closed,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

struct QueueInner<T> {
    state: Mutex<QueueState<T>>,
    // Two wait conditions, each signaled once per state transition:
    // `not_empty` wakes the consumer, `below_capacity` wakes producers.
    not_empty: Condvar,
    below_capacity: Condvar,
    capacity: usize,
    metrics: Arc<QueueMetrics>,
}

/// Producer handle for the bounded ingress queue.
///
/// # Example
/// ```rust
/// use meld_core::prelude::{AdmissionMode, PushOutcome, ingress};
///
/// let (tx, _rx) = ingress::<u8>(4);
/// assert_eq!(tx.push(1, AdmissionMode::Block), PushOutcome::Accepted);
/// ```
#[derive(Clone)]
pub struct IngressTx<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> IngressTx<T> {
    /// Enqueue a value under the given admission mode.
    ///
    /// `Block` suspends until the queue drains below capacity (or the
    /// queue closes). `NonBlock` drops the value when full and returns
    /// `Rejected` so the producer can drop upstream. `Discard` always
    /// drops the value.
    pub fn push(&self, value: T, mode: AdmissionMode) -> PushOutcome {
        if matches!(mode, AdmissionMode::Discard) {
            self.inner.metrics.discarded();
            return PushOutcome::Discarded;
        }
        let mut state = self.inner.state.lock();
        if state.closed {
            self.inner.metrics.rejected();
            return PushOutcome::Rejected;
        }
        if state.items.len() >= self.inner.capacity {
            match mode {
                AdmissionMode::NonBlock => {
                    self.inner.metrics.rejected();
                    return PushOutcome::Rejected;
                }
                AdmissionMode::Block => {
                    while state.items.len() >= self.inner.capacity && !state.closed {
                        self.inner.below_capacity.wait(&mut state);
                    }
                    if state.closed {
                        self.inner.metrics.rejected();
                        return PushOutcome::Rejected;
                    }
                }
                AdmissionMode::Discard => unreachable!(),
            }
        }
        state.items.push_back(value);
        drop(state);
        self.inner.metrics.accepted();
        self.inner.not_empty.notify_one();
        PushOutcome::Accepted
    }

    /// Close the queue; blocked producers wake and report `Rejected`.
    pub fn close(&self) {
        close_inner(&self.inner);
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Admission counters for this queue.
    pub fn metrics(&self) -> Arc<QueueMetrics> {
        self.inner.metrics.clone()
    }
}

/// Consumer handle for the bounded ingress queue.
///
/// Single consumer by convention; the engine owns the only live clone.
///
/// # Example
/// ```rust
/// use meld_core::prelude::{AdmissionMode, PopOutcome, ingress};
///
/// let (tx, rx) = ingress::<u8>(1);
/// tx.push(7, AdmissionMode::Block);
/// assert!(matches!(rx.pop(), PopOutcome::Data(7)));
/// ```
#[derive(Clone)]
pub struct IngressRx<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> IngressRx<T> {
    /// Dequeue the oldest value, blocking until one arrives.
    ///
    /// Returns `Closed` only after the backlog has fully drained on a
    /// closed queue.
    pub fn pop(&self) -> PopOutcome<T> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(value) = state.items.pop_front() {
                drop(state);
                self.inner.below_capacity.notify_one();
                return PopOutcome::Data(value);
            }
            if state.closed {
                return PopOutcome::Closed;
            }
            self.inner.not_empty.wait(&mut state);
        }
    }

    /// Close the queue; see [`IngressTx::close`].
    pub fn close(&self) {
        close_inner(&self.inner);
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn close_inner<T>(inner: &QueueInner<T>) {
    let mut state = inner.state.lock();
    state.closed = true;
    drop(state);
    inner.not_empty.notify_all();
    inner.below_capacity.notify_all();
}

/// Create a bounded blocking queue with the given capacity.
///
/// # Example
/// ```rust
/// use meld_core::prelude::ingress;
///
/// let (tx, _rx) = ingress::<u8>(5);
/// assert_eq!(tx.capacity(), 5);
/// ```
pub fn ingress<T>(capacity: usize) -> (IngressTx<T>, IngressRx<T>) {
    let inner = Arc::new(QueueInner {
        state: Mutex::new(QueueState {
            items: VecDeque::with_capacity(capacity),
            closed: false,
        }),
        not_empty: Condvar::new(),
        below_capacity: Condvar::new(),
        capacity: capacity.max(1),
        metrics: Arc::new(QueueMetrics::default()),
    });
    (
        IngressTx {
            inner: inner.clone(),
        },
        IngressRx { inner },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn nonblock_rejects_when_full() {
        let (tx, rx) = ingress::<u32>(2);
        assert_eq!(tx.push(1, AdmissionMode::NonBlock), PushOutcome::Accepted);
        assert_eq!(tx.push(2, AdmissionMode::NonBlock), PushOutcome::Accepted);
        assert_eq!(tx.push(3, AdmissionMode::NonBlock), PushOutcome::Rejected);
        assert_eq!(tx.len(), 2);
        assert!(matches!(rx.pop(), PopOutcome::Data(1)));
        assert_eq!(tx.push(3, AdmissionMode::NonBlock), PushOutcome::Accepted);
        assert_eq!(tx.metrics().rejected_count(), 1);
    }

    #[test]
    fn discard_never_enqueues() {
        let (tx, _rx) = ingress::<u32>(2);
        assert_eq!(tx.push(1, AdmissionMode::Discard), PushOutcome::Discarded);
        assert!(tx.is_empty());
        assert_eq!(tx.metrics().discarded_count(), 1);
    }

    #[test]
    fn depth_never_exceeds_capacity() {
        let (tx, rx) = ingress::<u32>(3);
        let producer = {
            let tx = tx.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    tx.push(i, AdmissionMode::Block);
                }
            })
        };
        let mut seen = 0;
        while seen < 100 {
            assert!(tx.len() <= 3);
            match rx.pop() {
                PopOutcome::Data(v) => {
                    assert_eq!(v, seen);
                    seen += 1;
                }
                PopOutcome::Closed => panic!("queue closed early"),
            }
        }
        producer.join().unwrap();
    }

    #[test]
    fn per_producer_order_preserved() {
        let (tx, rx) = ingress::<(u32, u32)>(4);
        let mut producers = Vec::new();
        for id in 0..3u32 {
            let tx = tx.clone();
            producers.push(thread::spawn(move || {
                for seq in 0..50u32 {
                    tx.push((id, seq), AdmissionMode::Block);
                }
            }));
        }
        let mut last = [None::<u32>; 3];
        for _ in 0..150 {
            match rx.pop() {
                PopOutcome::Data((id, seq)) => {
                    if let Some(prev) = last[id as usize] {
                        assert!(seq > prev, "producer {id} reordered");
                    }
                    last[id as usize] = Some(seq);
                }
                PopOutcome::Closed => panic!("queue closed early"),
            }
        }
        for p in producers {
            p.join().unwrap();
        }
    }

    #[test]
    fn blocked_producer_wakes_on_pop() {
        let (tx, rx) = ingress::<u32>(1);
        tx.push(1, AdmissionMode::Block);
        let producer = {
            let tx = tx.clone();
            thread::spawn(move || tx.push(2, AdmissionMode::Block))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(matches!(rx.pop(), PopOutcome::Data(1)));
        assert_eq!(producer.join().unwrap(), PushOutcome::Accepted);
        assert!(matches!(rx.pop(), PopOutcome::Data(2)));
    }

    #[test]
    fn close_wakes_blocked_producer_and_drains() {
        let (tx, rx) = ingress::<u32>(1);
        tx.push(1, AdmissionMode::Block);
        let producer = {
            let tx = tx.clone();
            thread::spawn(move || tx.push(2, AdmissionMode::Block))
        };
        thread::sleep(Duration::from_millis(20));
        rx.close();
        assert_eq!(producer.join().unwrap(), PushOutcome::Rejected);
        assert!(matches!(rx.pop(), PopOutcome::Data(1)));
        assert!(matches!(rx.pop(), PopOutcome::Closed));
    }
}
