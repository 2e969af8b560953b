//! Time-series buffer
//!
//! FIFO of `(timestamp, value)` pairs ordered by insertion. Two independent
//! retention constraints are enforced after every push: a maximum sample
//! count and a maximum age relative to the newest entry. Either constraint
//! can be disabled. Timestamp monotonicity is not enforced here; the drift
//! detector is the observer for irregular input.

use std::collections::VecDeque;

use crate::sample::{Sample, TimestampMs};

/// One timestamped sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePoint {
    pub timestamp: TimestampMs,
    pub value: Sample,
}

/// FIFO of timestamped samples with age-based expiry
#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer {
    points: VecDeque<TimePoint>,
    /// Maximum entries kept (0 = unlimited)
    max_samples: usize,
    /// Maximum age relative to the newest entry (0.0 = disabled)
    window_duration_ms: f64,
}

impl TimeSeriesBuffer {
    pub fn new(max_samples: usize, window_duration_ms: f64) -> Self {
        Self {
            points: VecDeque::new(),
            max_samples,
            window_duration_ms: if window_duration_ms.is_finite() && window_duration_ms > 0.0 {
                window_duration_ms
            } else {
                0.0
            },
        }
    }

    /// Buffer with both retention constraints disabled
    pub fn unbounded() -> Self {
        Self::new(0, 0.0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append unconditionally, then enforce both retention constraints
    pub fn push(&mut self, timestamp: TimestampMs, value: Sample) {
        self.points.push_back(TimePoint { timestamp, value });

        if self.window_duration_ms > 0.0 {
            let newest = timestamp;
            while let Some(front) = self.points.front() {
                if newest - front.timestamp > self.window_duration_ms {
                    self.points.pop_front();
                } else {
                    break;
                }
            }
        }

        if self.max_samples > 0 {
            while self.points.len() > self.max_samples {
                self.points.pop_front();
            }
        }
    }

    /// Remove and return the oldest entry
    pub fn pop_front(&mut self) -> Option<TimePoint> {
        self.points.pop_front()
    }

    pub fn front(&self) -> Option<&TimePoint> {
        self.points.front()
    }

    pub fn back(&self) -> Option<&TimePoint> {
        self.points.back()
    }

    /// Drop front entries older than `cutoff`
    pub fn remove_older_than(&mut self, cutoff: TimestampMs) {
        while let Some(front) = self.points.front() {
            if front.timestamp < cutoff {
                self.points.pop_front();
            } else {
                break;
            }
        }
    }

    /// Span between oldest and newest timestamps (0 with fewer than 2 entries)
    pub fn time_span(&self) -> f64 {
        match (self.points.front(), self.points.back()) {
            (Some(front), Some(back)) if self.points.len() > 1 => back.timestamp - front.timestamp,
            _ => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimePoint> {
        self.points.iter()
    }

    /// Value snapshot, oldest to newest
    pub fn values_to_vec(&self) -> Vec<Sample> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Timestamp snapshot, oldest to newest
    pub fn timestamps_to_vec(&self) -> Vec<TimestampMs> {
        self.points.iter().map(|p| p.timestamp).collect()
    }

    /// Restore from parallel snapshots, re-applying the retention constraints
    pub fn load(&mut self, timestamps: &[TimestampMs], values: &[Sample]) {
        self.points.clear();
        for (&t, &v) in timestamps.iter().zip(values.iter()) {
            self.push(t, v);
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}
