//! pf-dsp: Streaming DSP primitives for PulseForge
//!
//! High-performance, SIMD-optimized per-sample processing.
//!
//! ## Modules
//! - `simd` - Runtime SIMD dispatch (AVX2/SSE2/NEON) for the elementwise
//!   kernels: rectification, sum, sum of squares, windowing, dot product,
//!   complex pair maps
//! - `policy` - Incremental statistic policies (mean, RMS, MAV, variance,
//!   z-score) with exact add/remove accumulators
//! - `window` - Generic sliding-window filter over a policy, with sample
//!   count and time duration extents
//! - `rectify` - Stateless full/half-wave rectification
//! - `fir` - FIR/IIR section running externally designed taps
//! - `drift` - Passive sampling-drift observer

pub mod drift;
pub mod fir;
pub mod policy;
pub mod rectify;
pub mod simd;
pub mod window;

pub use drift::{DEFAULT_GAP_FACTOR, DriftDetector, DriftReport};
pub use fir::FirIirSection;
pub use policy::{Accumulators, DEFAULT_EPSILON, Mav, Mean, Rms, StatPolicy, Variance, ZScore};
pub use rectify::RectifyMode;
pub use simd::{KernelDispatch, SimdLevel, detect_simd_level, simd_level};
pub use window::{SlidingWindow, WindowExtent, WindowState};
