#![doc = include_str!("../README.md")]

pub use meld_core as core;
pub use thiserror;

pub mod engine;
pub mod metrics;
#[cfg(feature = "preview-window")]
pub mod preview;
pub mod registry;
pub mod sink;
pub mod tunables;

pub mod prelude {
    pub use crate::engine::{BlendEngine, BlendError, BlendHandle};
    pub use crate::metrics::{EngineMetrics, EngineMetricsSnapshot};
    pub use crate::registry::SourceRegistry;
    pub use crate::sink::{CollectorSink, DiscardSink, DisplaySink, SinkError, SubmitOutcome};
    pub use crate::tunables::{
        DEFAULT_BUFFER_LEN, DEFAULT_QUEUE_CAPACITY, DEFAULT_SKIP_N, DEFAULT_SOURCE_TIMEOUT,
        DEFAULT_TRANSITION_COUNT, Tunables,
    };
    pub use meld_core::prelude::*;
}
