//! Minimal preview window sink (feature `preview-window`).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minifb::{Window, WindowOptions};
use tracing::warn;

use meld_core::prelude::{
    AdmissionMode, BufferPool, FourCc, Frame, IngressRx, IngressTx, PopOutcome, PushOutcome,
    SourceId, VideoDesc, ingress,
};

use crate::sink::{DisplaySink, SinkError, SubmitOutcome};

enum PreviewCmd {
    Show(Frame),
    Close,
}

/// Display sink backed by a minifb window.
///
/// The window lives on its own thread because minifb windows cannot
/// move between threads; `submit` hands frames over through a small
/// bounded queue. Closing the window surfaces as [`SinkError::Closed`]
/// on the next submit.
///
/// Supports GREY, RG24/BGR3 and RGBA/BGRA packed frames.
///
/// # Example
/// ```rust,ignore
/// use meld::preview::WindowSink;
/// use meld::prelude::*;
///
/// let handle = BlendEngine::spawn(WindowSink::new("meld"), Tunables::default());
/// ```
pub struct WindowSink {
    tx: IngressTx<PreviewCmd>,
    closed: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    pool: BufferPool,
    configured: Option<VideoDesc>,
}

impl WindowSink {
    /// Create the sink and start its window thread. The window itself
    /// is opened on the first reconfigure.
    pub fn new(title: &str) -> Self {
        let (tx, rx) = ingress::<PreviewCmd>(2);
        let closed = Arc::new(AtomicBool::new(false));
        let title = title.to_owned();
        let thread_closed = closed.clone();
        let worker = thread::spawn(move || window_loop(&title, rx, thread_closed));
        Self {
            tx,
            closed,
            worker: Some(worker),
            pool: BufferPool::with_limits(2, 0, 4),
            configured: None,
        }
    }

    fn supported(code: FourCc) -> bool {
        [*b"GREY", *b"R8  ", *b"RG24", *b"BGR3", *b"RGBA", *b"BGRA"]
            .into_iter()
            .any(|c| code == FourCc::new(c))
    }
}

impl DisplaySink for WindowSink {
    fn reconfigure(&mut self, desc: VideoDesc) -> Result<(), SinkError> {
        if !Self::supported(desc.code) {
            return Err(SinkError::Reconfigure(format!(
                "format {} not previewable",
                desc.code
            )));
        }
        self.configured = Some(desc);
        Ok(())
    }

    fn acquire(&mut self) -> Result<Frame, SinkError> {
        let desc = self.configured.ok_or(SinkError::Unconfigured)?;
        Frame::alloc(desc, SourceId(0), &self.pool)
            .ok_or_else(|| SinkError::Backend(format!("cannot size format {}", desc.code)))
    }

    fn submit(&mut self, frame: Frame, blocking: bool) -> Result<SubmitOutcome, SinkError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(SinkError::Closed);
        }
        let mode = if blocking {
            AdmissionMode::Block
        } else {
            AdmissionMode::NonBlock
        };
        match self.tx.push(PreviewCmd::Show(frame), mode) {
            PushOutcome::Accepted => Ok(SubmitOutcome::Accepted),
            PushOutcome::Rejected => {
                if self.closed.load(Ordering::Relaxed) {
                    Err(SinkError::Closed)
                } else {
                    Ok(SubmitOutcome::Rejected)
                }
            }
            PushOutcome::Discarded => Ok(SubmitOutcome::Rejected),
        }
    }

    fn end_of_stream(&mut self) -> Result<(), SinkError> {
        self.tx.push(PreviewCmd::Close, AdmissionMode::Block);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        Ok(())
    }
}

impl Drop for WindowSink {
    fn drop(&mut self) {
        self.tx.close();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

struct WindowState {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

fn window_loop(title: &str, rx: IngressRx<PreviewCmd>, closed: Arc<AtomicBool>) {
    let mut state: Option<WindowState> = None;
    loop {
        match rx.pop() {
            PopOutcome::Data(PreviewCmd::Show(frame)) => {
                if let Err(err) = show(title, &mut state, &frame) {
                    warn!(error = %err, "preview window gone, dropping frames");
                    closed.store(true, Ordering::Relaxed);
                    break;
                }
            }
            PopOutcome::Data(PreviewCmd::Close) | PopOutcome::Closed => break,
        }
    }
    closed.store(true, Ordering::Relaxed);
    rx.close();
}

fn show(title: &str, state: &mut Option<WindowState>, frame: &Frame) -> Result<(), String> {
    let desc = frame.desc();
    let width = desc.resolution.width.get() as usize;
    let height = desc.resolution.height.get() as usize;

    if state.is_none() {
        let mut window = Window::new(title, width, height, WindowOptions::default())
            .map_err(|e| e.to_string())?;
        window.limit_update_rate(Some(Duration::from_millis(16)));
        *state = Some(WindowState {
            window,
            buffer: vec![0; width * height],
            width,
            height,
        });
    }
    let Some(state) = state.as_mut() else {
        return Err("window state missing".into());
    };

    if !state.window.is_open() {
        return Err("window closed".into());
    }
    if width != state.width || height != state.height {
        state.width = width;
        state.height = height;
        state.buffer.resize(width * height, 0);
    }

    let code = desc.code;
    if code == FourCc::new(*b"GREY") || code == FourCc::new(*b"R8  ") {
        blit_grey(state, frame.data())?;
    } else if code == FourCc::new(*b"RG24") {
        blit_rgb24(state, frame.data(), false)?;
    } else if code == FourCc::new(*b"BGR3") {
        blit_rgb24(state, frame.data(), true)?;
    } else if code == FourCc::new(*b"RGBA") {
        blit_rgba(state, frame.data(), false)?;
    } else if code == FourCc::new(*b"BGRA") {
        blit_rgba(state, frame.data(), true)?;
    } else {
        return Err(format!("unsupported preview format {code}"));
    }

    state
        .window
        .update_with_buffer(&state.buffer, state.width, state.height)
        .map_err(|e| e.to_string())
}

fn blit_grey(state: &mut WindowState, data: &[u8]) -> Result<(), String> {
    if data.len() < state.width * state.height {
        return Err("frame too small for grey".into());
    }
    for y in 0..state.height {
        let row = &data[y * state.width..];
        for x in 0..state.width {
            let v = row[x] as u32;
            state.buffer[y * state.width + x] = (0xFF << 24) | v << 16 | v << 8 | v;
        }
    }
    Ok(())
}

fn blit_rgb24(state: &mut WindowState, data: &[u8], swap_rb: bool) -> Result<(), String> {
    let stride = state.width * 3;
    if data.len() < stride * state.height {
        return Err("frame too small for rgb24".into());
    }
    for y in 0..state.height {
        let row = &data[y * stride..];
        for x in 0..state.width {
            let i = x * 3;
            let (r, g, b) = (row[i], row[i + 1], row[i + 2]);
            let (r, b) = if swap_rb { (b, r) } else { (r, b) };
            state.buffer[y * state.width + x] =
                (0xFF << 24) | (r as u32) << 16 | (g as u32) << 8 | (b as u32);
        }
    }
    Ok(())
}

fn blit_rgba(state: &mut WindowState, data: &[u8], swap_rb: bool) -> Result<(), String> {
    let stride = state.width * 4;
    if data.len() < stride * state.height {
        return Err("frame too small for rgba".into());
    }
    for y in 0..state.height {
        let row = &data[y * stride..];
        for x in 0..state.width {
            let i = x * 4;
            let (r, g, b, a) = (row[i], row[i + 1], row[i + 2], row[i + 3]);
            let (r, b) = if swap_rb { (b, r) } else { (r, b) };
            state.buffer[y * state.width + x] =
                (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | (b as u32);
        }
    }
    Ok(())
}
