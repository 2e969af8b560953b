//! pf-state: Pipeline state serialization for PulseForge
//!
//! The versioned, textual wire contract for suspending a pipeline on one
//! worker and resuming it bit-identically on another. This crate owns the
//! document types and the encode/decode/summary operations; mapping live
//! stage state onto the documents is the pipeline's job.

mod codec;

pub use codec::*;
