//! pf-pipeline: Streaming pipeline executor for PulseForge
//!
//! Composes pf-dsp stages into an ordered, stateful processing chain over
//! interleaved multi-channel streams:
//! - per-channel state cells with virtual de-interleaving (stride walks,
//!   no per-call allocation)
//! - exact cross-chunk continuity: any chunking of a stream produces
//!   bit-identical output to a single-chunk run
//! - full state round-tripping through the pf-state blob codec, so
//!   processing can suspend on one worker and resume on another
//! - optional callbacks (batch views, stage timing, errors, pooled logs)
//!   and per-stage taps

mod callbacks;
mod executor;
mod stage;

pub use callbacks::{
    BatchCallback, BatchInfo, ErrorCallback, LOG_POOL_CAPACITY, LogBatchCallback, LogCallback,
    LogEntry, LogLevel, PipelineCallbacks, StageCompleteCallback, TapCallback,
};
pub use executor::{Pipeline, ProcessOptions};
pub use stage::{FilterSpec, StageSpec, StatMode, WindowedSpec};

// Re-exports for downstream convenience
pub use pf_core::{PfError, PfResult, PipelineConfig, Sample, TimestampMs};
pub use pf_dsp::{DriftDetector, DriftReport, RectifyMode};
pub use pf_state::{FORMAT_VERSION, StateBlob};
