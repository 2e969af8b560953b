//! Sliding-window filter
//!
//! Generic engine combining a buffer with a statistic policy to compute
//! per-channel windowed statistics in O(1) per sample. The window extent is
//! either the most recent K samples or all samples within a duration of the
//! newest timestamp; the policy is chosen at construction and monomorphized
//! into the filter.
//!
//! Cross-chunk continuity depends on exact state round-tripping: the
//! exported state carries both the buffer contents and the policy
//! accumulators, and import adopts the accumulators verbatim instead of
//! recomputing them from the buffer. Recomputation would inject a fresh
//! rounding error on every save/load cycle.

use pf_core::{PfError, PfResult, RingBuffer, Sample, TimeSeriesBuffer, TimestampMs};

use crate::policy::{Accumulators, StatPolicy};

/// Window extent: most recent K samples, or all samples within a duration
/// of the newest one
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowExtent {
    Samples(usize),
    DurationMs(f64),
}

#[derive(Debug, Clone)]
enum WindowStore {
    Count(RingBuffer),
    Time {
        points: TimeSeriesBuffer,
        duration_ms: f64,
    },
}

/// Exported per-channel filter state
#[derive(Debug, Clone, Default)]
pub struct WindowState {
    /// Buffer contents, oldest to newest
    pub values: Vec<Sample>,
    /// Parallel timestamps (duration windows only)
    pub timestamps: Option<Vec<TimestampMs>>,
    /// Policy accumulators, adopted verbatim on import
    pub accumulators: Accumulators,
}

/// Windowed-statistic filter over one channel
#[derive(Debug, Clone)]
pub struct SlidingWindow<P: StatPolicy> {
    store: WindowStore,
    policy: P,
}

impl<P: StatPolicy> SlidingWindow<P> {
    pub fn new(extent: WindowExtent, policy: P) -> Self {
        let store = match extent {
            WindowExtent::Samples(k) => WindowStore::Count(RingBuffer::new(k)),
            WindowExtent::DurationMs(ms) => WindowStore::Time {
                points: TimeSeriesBuffer::unbounded(),
                duration_ms: ms.max(f64::MIN_POSITIVE),
            },
        };
        Self { store, policy }
    }

    /// Number of samples currently in the window
    pub fn len(&self) -> usize {
        match &self.store {
            WindowStore::Count(buf) => buf.len(),
            WindowStore::Time { points, .. } => points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Feed one sample, returning the statistic over the updated window
    pub fn add_sample(&mut self, x: Sample, t: TimestampMs) -> Sample {
        match &mut self.store {
            WindowStore::Count(buf) => {
                if buf.is_full() {
                    if let Some(oldest) = buf.pop() {
                        self.policy.on_remove(oldest);
                    }
                }
                buf.push_overwrite(x);
                self.policy.on_add(x);
                self.policy.result(x, buf.len())
            }
            WindowStore::Time {
                points,
                duration_ms,
            } => {
                points.push(t, x);
                // Strict >: a sample exactly `duration` old stays. The loop
                // cannot evict the sample just pushed (span is 0 at len 1).
                while points.time_span() > *duration_ms {
                    if let Some(expired) = points.pop_front() {
                        self.policy.on_remove(expired.value);
                    }
                }
                self.policy.on_add(x);
                self.policy.result(x, points.len())
            }
        }
    }

    /// Reset buffer and policy
    pub fn clear(&mut self) {
        match &mut self.store {
            WindowStore::Count(buf) => buf.clear(),
            WindowStore::Time { points, .. } => points.clear(),
        }
        self.policy.clear();
    }

    /// Snapshot buffer contents and accumulators
    pub fn export(&self) -> WindowState {
        match &self.store {
            WindowStore::Count(buf) => WindowState {
                values: buf.to_vec(),
                timestamps: None,
                accumulators: self.policy.accumulators(),
            },
            WindowStore::Time { points, .. } => WindowState {
                values: points.values_to_vec(),
                timestamps: Some(points.timestamps_to_vec()),
                accumulators: self.policy.accumulators(),
            },
        }
    }

    /// Restore a snapshot: buffer first, then accumulators verbatim
    pub fn import(&mut self, state: &WindowState) -> PfResult<()> {
        match &mut self.store {
            WindowStore::Count(buf) => {
                buf.load(&state.values);
            }
            WindowStore::Time { points, .. } => {
                let timestamps = state.timestamps.as_ref().ok_or_else(|| {
                    PfError::Codec("duration window state is missing timestamps".to_string())
                })?;
                if timestamps.len() != state.values.len() {
                    return Err(PfError::Codec(format!(
                        "duration window state has {} timestamps for {} samples",
                        timestamps.len(),
                        state.values.len()
                    )));
                }
                points.load(timestamps, &state.values);
            }
        }
        self.policy.restore(state.accumulators);
        Ok(())
    }
}
