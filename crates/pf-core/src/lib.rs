//! pf-core: Shared types, buffers, and utilities for PulseForge
//!
//! This crate provides the foundational types used across all PulseForge
//! crates: the sample type, the error taxonomy, the two buffer primitives
//! (sample ring buffer, time-series buffer), timestamp synthesis, and the
//! pass-through pipeline configuration.

mod config;
mod error;
mod ring;
mod sample;
mod timebase;
mod timeseries;

pub use config::*;
pub use error::*;
pub use ring::*;
pub use sample::*;
pub use timebase::*;
pub use timeseries::*;
