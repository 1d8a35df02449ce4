#![doc = include_str!("../README.md")]

pub mod format;
pub mod frame;
pub mod metrics;
pub mod queue;

pub mod prelude {
    pub use crate::{
        format::{FourCc, Interlacing, Interval, Resolution, VideoDesc},
        frame::{BufferLease, BufferPool, Frame, SourceId},
        metrics::{PoolMetrics, QueueMetrics},
        queue::{AdmissionMode, IngressRx, IngressTx, PopOutcome, PushOutcome, ingress},
    };
}
