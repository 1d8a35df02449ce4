use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use meld_core::prelude::{
    AdmissionMode, Frame, IngressRx, IngressTx, PopOutcome, PushOutcome, QueueMetrics, SourceId,
    VideoDesc, ingress,
};

use crate::metrics::{EngineMetrics, EngineMetricsSnapshot};
use crate::registry::SourceRegistry;
use crate::sink::{DisplaySink, SinkError};
use crate::tunables::Tunables;

/// Errors terminating an engine run.
#[derive(Debug, thiserror::Error)]
pub enum BlendError {
    /// The display sink failed; the engine must not keep submitting.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// The worker thread panicked.
    #[error("engine worker panicked")]
    WorkerPanicked,
}

/// Multi-source blending engine.
///
/// Owns the source-selection state machine: which source is on air,
/// which is fading out, the crossfade step counter, the prefill phase
/// of a freshly promoted source, and the switch debounce. Frames are
/// fed one at a time through [`BlendEngine::process`]; at most one
/// output frame is produced per input frame.
///
/// Most users start a worker thread with [`BlendEngine::spawn`] and
/// feed it through the returned [`BlendHandle`]; `process` is public so
/// the state machine can also be driven synchronously.
///
/// # Example
/// ```rust
/// use meld::prelude::*;
///
/// let sink = CollectorSink::new();
/// let handle = BlendEngine::spawn(sink.clone(), Tunables::default());
/// handle.finish().unwrap();
/// assert!(sink.is_finished());
/// ```
pub struct BlendEngine<S> {
    sink: S,
    tunables: Tunables,
    registry: SourceRegistry,
    active: Option<SourceId>,
    fading: Option<SourceId>,
    transition: u32,
    prefilling: bool,
    pending_switch: u32,
    output_desc: Option<VideoDesc>,
    metrics: Arc<EngineMetrics>,
}

impl<S: DisplaySink> BlendEngine<S> {
    /// Create an engine around a sink. No threads are started.
    pub fn new(sink: S, tunables: Tunables) -> Self {
        Self {
            sink,
            tunables,
            registry: SourceRegistry::new(),
            active: None,
            fading: None,
            transition: 0,
            prefilling: false,
            pending_switch: 0,
            output_desc: None,
            metrics: Arc::new(EngineMetrics::default()),
        }
    }

    /// Run one iteration of the state machine for a dequeued frame.
    ///
    /// `now` is the arrival time used for eviction bookkeeping; tests
    /// pass synthetic instants to control the clock.
    pub fn process(&mut self, frame: Frame, now: Instant) -> Result<(), BlendError> {
        let id = frame.source();

        if self.registry.is_disabled(id, now) {
            trace!(source = id.0, "frame from evicted source dropped");
            return Ok(());
        }
        self.registry
            .sweep_expired(now, self.tunables.source_timeout);

        if Some(id) != self.active && Some(id) != self.fading {
            if self.active.is_none() {
                // Fresh engine: the first source goes on air without debounce.
                self.promote(id, now);
            } else {
                self.pending_switch += 1;
                if self.pending_switch >= self.tunables.skip_n {
                    self.promote(id, now);
                } else {
                    self.metrics.record_debounced();
                    return Ok(());
                }
            }
        }

        self.registry.buffer_frame(id, frame);

        if Some(id) == self.active && self.registry.depth(id) >= self.tunables.buffer_len {
            self.prefilling = false;
        }

        // Two streams may arrive concurrently; output is paced by the
        // active one, so frames for the fading source are only buffered.
        if Some(id) != self.active {
            return Ok(());
        }

        match self.fading {
            None => {
                if !self.prefilling {
                    match self.registry.pop_frame(id) {
                        Some(frame) => self.emit_copy(frame, id)?,
                        None => {
                            self.metrics.record_underrun();
                            trace!(source = id.0, "active backlog empty, skipping output");
                        }
                    }
                }
            }
            Some(fading) => {
                if self.prefilling {
                    // Keep showing the outgoing source while the new one
                    // accumulates its latency buffer.
                    match self.registry.pop_frame(fading) {
                        Some(frame) => self.emit_copy(frame, id)?,
                        None => {
                            self.metrics.record_underrun();
                            debug!(
                                source = fading.0,
                                "no outgoing frame to show during prefill"
                            );
                        }
                    }
                } else {
                    self.transition += 1;
                    self.step_transition(fading, id)?;
                }
            }
        }

        if let Some(fading) = self.fading
            && self.transition >= self.tunables.transition_count
        {
            self.registry.drop_all(fading);
            self.registry.disable(fading, now);
            self.metrics.record_eviction();
            debug!(source = fading.0, "transition complete, outgoing source disabled");
            self.fading = None;
            self.transition = 0;
        }

        Ok(())
    }

    /// Forward end-of-stream to the sink.
    pub fn finish(&mut self) -> Result<(), BlendError> {
        self.sink.end_of_stream()?;
        Ok(())
    }

    /// Source currently on air.
    pub fn active(&self) -> Option<SourceId> {
        self.active
    }

    /// Source currently fading out.
    pub fn fading(&self) -> Option<SourceId> {
        self.fading
    }

    /// Current crossfade step, `0` when no transition is in progress.
    pub fn transition(&self) -> u32 {
        self.transition
    }

    /// Whether the active source is still accumulating its prefill buffer.
    pub fn is_prefilling(&self) -> bool {
        self.prefilling
    }

    /// Shared engine counters.
    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// Registry accessor for diagnostics.
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    fn promote(&mut self, id: SourceId, now: Instant) {
        // A promotion landing mid-transition orphans the source that was
        // already fading out; treat it like a completed fade.
        if let Some(prev) = self.fading.take() {
            self.registry.drop_all(prev);
            self.registry.disable(prev, now);
            self.metrics.record_eviction();
        }
        self.fading = self.active;
        self.active = Some(id);
        self.transition = 0;
        self.prefilling = true;
        self.pending_switch = 0;
        self.metrics.record_promotion();
        debug!(
            source = id.0,
            fading = self.fading.map(|s| s.0),
            "source promoted to active"
        );
    }

    fn check_reconf(&mut self, desc: VideoDesc) -> Result<(), SinkError> {
        if self.output_desc != Some(desc) {
            debug!(
                code = %desc.code,
                width = desc.resolution.width.get(),
                height = desc.resolution.height.get(),
                "output reconfigured"
            );
            self.sink.reconfigure(desc)?;
            self.output_desc = Some(desc);
        }
        Ok(())
    }

    fn emit_copy(&mut self, src: Frame, on_air: SourceId) -> Result<(), BlendError> {
        self.check_reconf(src.desc())?;
        let mut out = self.sink.acquire()?;
        let n = out.len().min(src.len());
        out.data_mut()[..n].copy_from_slice(&src.data()[..n]);
        out.set_source(on_air);
        self.sink.submit(out, true)?;
        self.metrics.record_submitted();
        Ok(())
    }

    fn step_transition(&mut self, fading: SourceId, active: SourceId) -> Result<(), BlendError> {
        if self.registry.depth(fading) == 0 || self.registry.depth(active) == 0 {
            // Nothing to mix; cancel the smooth transition early.
            self.metrics.record_underrun();
            trace!(
                fading = fading.0,
                active = active.0,
                "backlog underrun mid-fade, cancelling transition"
            );
            self.transition = self.tunables.transition_count;
            return Ok(());
        }
        let (Some(old), Some(new)) = (
            self.registry.pop_frame(fading),
            self.registry.pop_frame(active),
        ) else {
            return Ok(());
        };

        let new_desc = new.desc();
        self.check_reconf(new_desc)?;
        let mut out = self.sink.acquire()?;

        if old.desc() == new_desc {
            let count = self.tunables.transition_count;
            let step = self.transition.min(count);
            let n = out.len().min(new.len()).min(old.len());
            let dst = out.data_mut();
            for i in 0..n {
                let old_v = old.data()[i] as u32;
                let new_v = new.data()[i] as u32;
                dst[i] = ((new_v * step + old_v * (count - step)) / count) as u8;
            }
        } else {
            // Incompatible descriptors cannot be blended; degrade to a
            // hard cut and keep going.
            warn!(
                old = %old.desc().code,
                new = %new_desc.code,
                "descriptor mismatch mid-fade, falling back to hard cut"
            );
            self.metrics.record_hard_cut();
            let n = out.len().min(new.len());
            out.data_mut()[..n].copy_from_slice(&new.data()[..n]);
        }

        out.set_source(active);
        self.sink.submit(out, true)?;
        self.metrics.record_submitted();
        Ok(())
    }
}

impl<S: DisplaySink + 'static> BlendEngine<S> {
    /// Start the dedicated consumer thread and return a shareable handle.
    ///
    /// The handle clones all route to the same engine; see [`BlendHandle`].
    pub fn spawn(sink: S, tunables: Tunables) -> BlendHandle {
        let (tx, rx) = ingress::<Option<Frame>>(tunables.queue_capacity);
        let engine = BlendEngine::new(sink, tunables);
        let metrics = engine.metrics();
        let worker = thread::spawn(move || run(engine, rx));
        BlendHandle {
            shared: Arc::new(HandleShared {
                tx,
                worker: Mutex::new(Some(worker)),
                metrics,
            }),
        }
    }
}

fn run<S: DisplaySink>(
    mut engine: BlendEngine<S>,
    rx: IngressRx<Option<Frame>>,
) -> Result<(), BlendError> {
    let result = loop {
        match rx.pop() {
            PopOutcome::Data(Some(frame)) => {
                if let Err(err) = engine.process(frame, Instant::now()) {
                    warn!(error = %err, "engine stopping on sink error");
                    break Err(err);
                }
            }
            // In-band sentinel: forward end-of-stream and stop.
            PopOutcome::Data(None) => break engine.finish(),
            // All handles dropped without a sentinel; shut down anyway.
            PopOutcome::Closed => break engine.finish(),
        }
    };
    // Wake any producers still blocked on admission.
    rx.close();
    result
}

struct HandleShared {
    tx: IngressTx<Option<Frame>>,
    worker: Mutex<Option<JoinHandle<Result<(), BlendError>>>>,
    metrics: Arc<EngineMetrics>,
}

impl Drop for HandleShared {
    fn drop(&mut self) {
        // Last handle gone without finish(): close the queue so the
        // worker drains and exits, then reap it.
        self.tx.close();
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.join();
        }
    }
}

/// Shared front-end to a spawned [`BlendEngine`].
///
/// Clones are cheap and all route to the same engine instance, which
/// is how multiple forked display front-ends share one blender. Any
/// one clone may call [`BlendHandle::finish`].
///
/// # Example
/// ```rust
/// use meld::prelude::*;
///
/// let handle = BlendEngine::spawn(DiscardSink::new(), Tunables::default());
/// let producer_side = handle.clone();
/// drop(producer_side);
/// handle.finish().unwrap();
/// ```
#[derive(Clone)]
pub struct BlendHandle {
    shared: Arc<HandleShared>,
}

impl BlendHandle {
    /// Hand a frame to the engine under the given admission mode.
    pub fn push(&self, frame: Frame, mode: AdmissionMode) -> PushOutcome {
        self.shared.tx.push(Some(frame), mode)
    }

    /// Enqueue the end-of-stream sentinel, wait for the worker to drain
    /// the queue and forward it, and return the engine's result.
    ///
    /// Later calls (from this or any clone) are no-ops returning `Ok`.
    pub fn finish(&self) -> Result<(), BlendError> {
        let worker = self.shared.worker.lock().take();
        match worker {
            Some(handle) => {
                self.shared.tx.push(None, AdmissionMode::Block);
                match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(BlendError::WorkerPanicked),
                }
            }
            None => Ok(()),
        }
    }

    /// Snapshot of engine counters.
    pub fn metrics(&self) -> EngineMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Admission counters of the ingress queue.
    pub fn queue_metrics(&self) -> Arc<QueueMetrics> {
        self.shared.tx.metrics()
    }

    /// Current ingress queue depth.
    pub fn queue_len(&self) -> usize {
        self.shared.tx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CollectorSink, SubmitOutcome};
    use meld_core::prelude::*;
    use std::time::Duration;

    fn desc(w: u32, h: u32) -> VideoDesc {
        VideoDesc::new(
            FourCc::new(*b"GREY"),
            Resolution::new(w, h).unwrap(),
            Interlacing::Progressive,
            Interval::from_fps(30),
        )
    }

    fn frame(pool: &BufferPool, desc: VideoDesc, source: u32, level: u8) -> Frame {
        let mut f = Frame::alloc(desc, SourceId(source), pool).unwrap();
        f.data_mut().fill(level);
        f
    }

    fn engine(tunables: Tunables) -> (BlendEngine<CollectorSink>, CollectorSink) {
        let sink = CollectorSink::new();
        (BlendEngine::new(sink.clone(), tunables), sink)
    }

    fn levels(sink: &CollectorSink) -> Vec<u8> {
        sink.take_frames().iter().map(|f| f.data()[0]).collect()
    }

    #[test]
    fn first_source_promotes_without_debounce() {
        let (mut engine, sink) = engine(Tunables::default());
        let pool = BufferPool::with_capacity(4, 16);
        let now = Instant::now();
        engine
            .process(frame(&pool, desc(4, 4), 1, 10), now)
            .unwrap();
        assert_eq!(engine.active(), Some(SourceId(1)));
        assert_eq!(engine.fading(), None);
        assert!(engine.is_prefilling());
        assert_eq!(sink.frame_count(), 0);
    }

    #[test]
    fn prefill_clears_at_buffer_len_and_output_starts() {
        let tunables = Tunables::default().buffer_len(3).skip_n(5);
        let (mut engine, sink) = engine(tunables);
        let pool = BufferPool::with_capacity(8, 16);
        let now = Instant::now();
        for level in 1..=5u8 {
            engine
                .process(frame(&pool, desc(4, 4), 1, level), now)
                .unwrap();
        }
        // Frames 1 and 2 prefill; frames 3..5 each pop the oldest.
        assert!(!engine.is_prefilling());
        assert_eq!(levels(&sink), vec![1, 2, 3]);
        assert_eq!(sink.reconfigure_count(), 1);
    }

    #[test]
    fn debounce_destroys_then_promotes_at_threshold() {
        let tunables = Tunables::default().buffer_len(1).skip_n(5);
        let (mut engine, _sink) = engine(tunables);
        let pool = BufferPool::with_capacity(8, 16);
        let now = Instant::now();
        engine
            .process(frame(&pool, desc(4, 4), 1, 10), now)
            .unwrap();
        assert_eq!(engine.active(), Some(SourceId(1)));

        // Four frames from a new source: destroyed, not buffered.
        for _ in 0..4 {
            engine
                .process(frame(&pool, desc(4, 4), 2, 99), now)
                .unwrap();
            assert_eq!(engine.active(), Some(SourceId(1)));
            assert_eq!(engine.registry().depth(SourceId(2)), 0);
        }
        assert_eq!(engine.metrics().snapshot().debounced, 4);

        // The fifth promotes.
        engine
            .process(frame(&pool, desc(4, 4), 2, 99), now)
            .unwrap();
        assert_eq!(engine.active(), Some(SourceId(2)));
        assert_eq!(engine.fading(), Some(SourceId(1)));
        assert!(engine.is_prefilling());
    }

    #[test]
    fn crossfade_blends_with_integer_steps() {
        let tunables = Tunables::default()
            .buffer_len(2)
            .skip_n(1)
            .transition_count(10);
        let (mut engine, sink) = engine(tunables);
        let pool = BufferPool::with_capacity(16, 16);
        let d = desc(4, 4);
        let now = Instant::now();

        // Establish A (level 0) with a stocked backlog.
        for _ in 0..3 {
            engine.process(frame(&pool, d, 1, 0), now).unwrap();
        }
        // Promote B (level 100); keep A fed so the fade has material.
        engine.process(frame(&pool, d, 2, 100), now).unwrap();
        for _ in 0..3 {
            engine.process(frame(&pool, d, 1, 0), now).unwrap();
            engine.process(frame(&pool, d, 2, 100), now).unwrap();
        }

        // A passthrough x2, one prefill copy of A, then steps 1..3 of the fade.
        assert_eq!(levels(&sink), vec![0, 0, 0, 10, 20, 30]);
        assert_eq!(engine.transition(), 3);
    }

    #[test]
    fn transition_completes_and_evicts_outgoing() {
        let tunables = Tunables::default()
            .buffer_len(2)
            .skip_n(1)
            .transition_count(3);
        let (mut engine, sink) = engine(tunables);
        let pool = BufferPool::with_capacity(16, 16);
        let d = desc(4, 4);
        let now = Instant::now();

        engine.process(frame(&pool, d, 1, 0), now).unwrap();
        engine.process(frame(&pool, d, 1, 0), now).unwrap();
        engine.process(frame(&pool, d, 2, 90), now).unwrap();
        for _ in 0..3 {
            engine.process(frame(&pool, d, 1, 0), now).unwrap();
            engine.process(frame(&pool, d, 2, 90), now).unwrap();
        }

        assert_eq!(engine.active(), Some(SourceId(2)));
        assert_eq!(engine.fading(), None);
        assert_eq!(engine.transition(), 0);
        assert_eq!(engine.metrics().snapshot().evictions, 1);
        assert!(
            engine
                .registry()
                .disabled_ids()
                .any(|id| id == SourceId(1))
        );

        // Frames from the evicted source are destroyed, not buffered.
        engine.process(frame(&pool, d, 1, 0), now).unwrap();
        assert_eq!(engine.registry().depth(SourceId(1)), 0);

        // Steps (90*t + 0*(3-t))/3 for t = 1..3.
        let out = levels(&sink);
        assert_eq!(&out[out.len() - 3..], &[30, 60, 90]);
    }

    #[test]
    fn underrun_mid_fade_cancels_transition() {
        let tunables = Tunables::default()
            .buffer_len(1)
            .skip_n(1)
            .transition_count(10);
        let (mut engine, sink) = engine(tunables);
        let pool = BufferPool::with_capacity(8, 16);
        let d = desc(4, 4);
        let now = Instant::now();

        // A's only frame is popped before B arrives, so the fade has no
        // outgoing material.
        engine.process(frame(&pool, d, 1, 0), now).unwrap();
        engine.process(frame(&pool, d, 2, 100), now).unwrap();

        assert_eq!(engine.fading(), None);
        assert_eq!(engine.transition(), 0);
        assert_eq!(engine.metrics().snapshot().evictions, 1);
        assert_eq!(engine.metrics().snapshot().underruns, 1);
        // Only A's passthrough frame made it out.
        assert_eq!(levels(&sink), vec![0]);
    }

    #[test]
    fn descriptor_mismatch_degrades_to_hard_cut() {
        let tunables = Tunables::default()
            .buffer_len(2)
            .skip_n(1)
            .transition_count(10);
        let (mut engine, sink) = engine(tunables);
        let pool = BufferPool::with_capacity(16, 256);
        let now = Instant::now();

        engine.process(frame(&pool, desc(4, 4), 1, 7), now).unwrap();
        engine.process(frame(&pool, desc(4, 4), 1, 7), now).unwrap();
        engine
            .process(frame(&pool, desc(8, 8), 2, 200), now)
            .unwrap();
        engine.process(frame(&pool, desc(4, 4), 1, 7), now).unwrap();
        engine
            .process(frame(&pool, desc(8, 8), 2, 200), now)
            .unwrap();

        assert_eq!(engine.metrics().snapshot().hard_cuts, 1);
        let frames = sink.take_frames();
        let last = frames.last().unwrap();
        assert_eq!(last.desc(), desc(8, 8));
        assert!(last.data().iter().all(|&b| b == 200));
        // Initial configuration plus the 4x4 -> 8x8 change.
        assert_eq!(sink.reconfigure_count(), 2);
    }

    #[test]
    fn eviction_ages_out_via_sweep() {
        let tunables = Tunables::default()
            .buffer_len(1)
            .skip_n(1)
            .transition_count(1)
            .source_timeout(Duration::from_millis(500));
        let (mut engine, _sink) = engine(tunables);
        let pool = BufferPool::with_capacity(16, 16);
        let d = desc(4, 4);
        let t0 = Instant::now();

        // A on air, then a completed one-step fade to B disables A at t0.
        engine.process(frame(&pool, d, 1, 0), t0).unwrap();
        engine.process(frame(&pool, d, 1, 0), t0).unwrap();
        engine.process(frame(&pool, d, 2, 50), t0).unwrap();
        engine.process(frame(&pool, d, 1, 0), t0).unwrap();
        engine.process(frame(&pool, d, 2, 50), t0).unwrap();
        assert!(engine.registry().disabled_ids().any(|id| id == SourceId(1)));

        // Still suppressed just before the timeout (B traffic sweeps).
        let before = t0 + Duration::from_millis(499);
        engine.process(frame(&pool, d, 2, 50), before).unwrap();
        engine.process(frame(&pool, d, 1, 0), before).unwrap();
        assert_eq!(engine.registry().depth(SourceId(1)), 0);

        // The arrival above refreshed A's stamp; it ages out once other
        // traffic sweeps past the refreshed deadline.
        let after = before + Duration::from_millis(501);
        engine.process(frame(&pool, d, 2, 50), after).unwrap();
        engine.process(frame(&pool, d, 1, 0), after).unwrap();
        assert_eq!(engine.active(), Some(SourceId(1)));
    }

    #[test]
    fn active_and_fading_always_differ() {
        let tunables = Tunables::default().buffer_len(1).skip_n(1);
        let (mut engine, _sink) = engine(tunables);
        let pool = BufferPool::with_capacity(32, 16);
        let d = desc(4, 4);
        let now = Instant::now();

        for id in [1u32, 2, 3, 2, 1, 3, 3, 1] {
            engine.process(frame(&pool, d, id, 0), now).unwrap();
            if let (Some(active), Some(fading)) = (engine.active(), engine.fading()) {
                assert_ne!(active, fading);
            }
            let on_air: Vec<SourceId> =
                [engine.active(), engine.fading()].into_iter().flatten().collect();
            for id in engine.registry().disabled_ids() {
                assert!(!on_air.contains(&id));
            }
        }
    }

    #[test]
    fn spawned_engine_crossfades_end_to_end() {
        let sink = CollectorSink::new();
        let handle = BlendEngine::spawn(sink.clone(), Tunables::default());
        let pool = BufferPool::with_capacity(8, 16);
        let d = desc(4, 4);

        let push = |id: u32, level: u8| {
            assert_eq!(
                handle.push(frame(&pool, d, id, level), AdmissionMode::Block),
                PushOutcome::Accepted
            );
        };

        // Source A alone: five prefill frames, then one output per input.
        for _ in 0..10 {
            push(1, 10);
        }
        // Source B: four debounced, the fifth promotes.
        for _ in 0..5 {
            push(2, 200);
        }
        // Interleaved pairs carry B through prefill and the crossfade.
        for _ in 0..14 {
            push(1, 10);
            push(2, 200);
        }
        handle.finish().unwrap();

        let mut expected = vec![10u8; 10];
        // (200 * t + 10 * (10 - t)) / 10 for t = 1..10.
        expected.extend((1..=10u32).map(|t| (10 + 19 * t) as u8));
        expected.push(200);
        let out: Vec<u8> = sink.take_frames().iter().map(|f| f.data()[0]).collect();
        assert_eq!(out, expected);

        let metrics = handle.metrics();
        assert_eq!(metrics.submitted, 21);
        assert_eq!(metrics.promotions, 2);
        assert_eq!(metrics.evictions, 1);
        assert_eq!(metrics.debounced, 4);
        assert_eq!(metrics.hard_cuts, 0);
        assert_eq!(handle.queue_metrics().accepted_count(), 44);
        assert!(sink.is_finished());
    }

    #[test]
    fn concurrent_producers_drain_without_deadlock() {
        let sink = CollectorSink::new();
        let handle = BlendEngine::spawn(sink.clone(), Tunables::default());
        let d = desc(4, 4);

        let workers: Vec<_> = [(1u32, 30u8), (2u32, 220u8)]
            .into_iter()
            .map(|(id, level)| {
                let handle = handle.clone();
                thread::spawn(move || {
                    let pool = BufferPool::with_capacity(8, 16);
                    for _ in 0..20 {
                        assert_eq!(
                            handle.push(frame(&pool, d, id, level), AdmissionMode::Block),
                            PushOutcome::Accepted
                        );
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        handle.finish().unwrap();

        let metrics = handle.metrics();
        assert_eq!(handle.queue_metrics().accepted_count(), 41);
        assert!(metrics.promotions >= 1);
        assert!(sink.is_finished());
        // Every output byte traces back to a source level or a blend of the two.
        for f in sink.take_frames() {
            let level = f.data()[0];
            assert!((30..=220).contains(&level));
        }
    }

    #[test]
    fn finish_is_idempotent_across_clones() {
        let handle = BlendEngine::spawn(CollectorSink::new(), Tunables::default());
        let other = handle.clone();
        other.finish().unwrap();
        handle.finish().unwrap();
        other.finish().unwrap();
    }

    #[test]
    fn sink_failure_is_fatal_for_the_cycle() {
        struct FailingSink;

        impl DisplaySink for FailingSink {
            fn reconfigure(&mut self, desc: VideoDesc) -> Result<(), SinkError> {
                Err(SinkError::Reconfigure(format!("{} refused", desc.code)))
            }
            fn acquire(&mut self) -> Result<Frame, SinkError> {
                Err(SinkError::Unconfigured)
            }
            fn submit(&mut self, _: Frame, _: bool) -> Result<SubmitOutcome, SinkError> {
                Err(SinkError::Closed)
            }
            fn end_of_stream(&mut self) -> Result<(), SinkError> {
                Ok(())
            }
        }

        let tunables = Tunables::default().buffer_len(1).skip_n(1);
        let mut engine = BlendEngine::new(FailingSink, tunables);
        let pool = BufferPool::with_capacity(2, 16);
        let err = engine
            .process(frame(&pool, desc(4, 4), 1, 0), Instant::now())
            .unwrap_err();
        assert!(matches!(err, BlendError::Sink(SinkError::Reconfigure(_))));
    }
}
