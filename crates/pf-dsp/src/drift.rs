//! Sampling drift detection
//!
//! Observes the timestamp stream alongside processing and reports
//! irregular sampling: per-sample deltas, drift against the expected
//! interval, monotonicity violations, and gap intervals. Purely passive:
//! it never modifies samples and never fails a `process` call.

use pf_core::{Sample, TimeSeriesBuffer, TimestampMs};
use serde::Serialize;

/// Default multiple of the expected interval treated as a gap
pub const DEFAULT_GAP_FACTOR: f64 = 2.0;

/// Recent-delta history length
const DELTA_HISTORY: usize = 256;

/// Read-only drift metrics snapshot
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    /// Timestamps observed in total
    pub samples_seen: u64,
    /// Delta between the two newest timestamps (ms)
    pub last_delta_ms: f64,
    /// Mean of all non-negative deltas (ms)
    pub mean_delta_ms: f64,
    /// Expected inter-sample interval, when a rate is configured (ms)
    pub expected_delta_ms: Option<f64>,
    /// Mean delta minus the expected interval (ms)
    pub drift_ms: f64,
    /// Timestamps that moved backwards
    pub monotonicity_violations: u64,
    /// Deltas exceeding `gap_factor` times the expected interval
    pub gap_count: u64,
    /// Largest delta observed (ms)
    pub max_gap_ms: f64,
}

/// Passive observer of the timestamp stream
#[derive(Debug, Clone)]
pub struct DriftDetector {
    expected_interval_ms: Option<f64>,
    gap_factor: f64,
    last_timestamp: Option<TimestampMs>,
    samples_seen: u64,
    delta_count: u64,
    delta_sum: f64,
    last_delta_ms: f64,
    max_gap_ms: f64,
    monotonicity_violations: u64,
    gap_count: u64,
    /// Bounded history of recent deltas for interactive inspection
    recent_deltas: TimeSeriesBuffer,
}

impl DriftDetector {
    /// Detector expecting `rate_hz` samples per second, or rate-agnostic
    /// when `None`
    pub fn new(expected_rate_hz: Option<f64>) -> Self {
        let expected_interval_ms = match expected_rate_hz {
            Some(rate) if rate.is_finite() && rate > 0.0 => Some(1000.0 / rate),
            _ => None,
        };
        Self {
            expected_interval_ms,
            gap_factor: DEFAULT_GAP_FACTOR,
            last_timestamp: None,
            samples_seen: 0,
            delta_count: 0,
            delta_sum: 0.0,
            last_delta_ms: 0.0,
            max_gap_ms: 0.0,
            monotonicity_violations: 0,
            gap_count: 0,
            recent_deltas: TimeSeriesBuffer::new(DELTA_HISTORY, 0.0),
        }
    }

    pub fn with_gap_factor(mut self, factor: f64) -> Self {
        if factor.is_finite() && factor > 1.0 {
            self.gap_factor = factor;
        }
        self
    }

    /// Consume one chunk's timestamps
    pub fn observe(&mut self, timestamps: &[TimestampMs]) {
        for &t in timestamps {
            self.samples_seen += 1;
            let Some(last) = self.last_timestamp else {
                self.last_timestamp = Some(t);
                continue;
            };
            let delta = t - last;
            self.last_timestamp = Some(t);

            if delta < 0.0 {
                self.monotonicity_violations += 1;
                continue;
            }

            self.last_delta_ms = delta;
            self.delta_sum += delta;
            self.delta_count += 1;
            self.max_gap_ms = self.max_gap_ms.max(delta);
            self.recent_deltas.push(t, delta as Sample);

            if let Some(expected) = self.expected_interval_ms {
                if delta > self.gap_factor * expected {
                    self.gap_count += 1;
                }
            }
        }
    }

    /// Recent deltas, oldest to newest
    pub fn recent_deltas(&self) -> Vec<Sample> {
        self.recent_deltas.values_to_vec()
    }

    /// Current metrics snapshot
    pub fn report(&self) -> DriftReport {
        let mean_delta_ms = if self.delta_count > 0 {
            self.delta_sum / self.delta_count as f64
        } else {
            0.0
        };
        DriftReport {
            samples_seen: self.samples_seen,
            last_delta_ms: self.last_delta_ms,
            mean_delta_ms,
            expected_delta_ms: self.expected_interval_ms,
            drift_ms: self
                .expected_interval_ms
                .map(|e| mean_delta_ms - e)
                .unwrap_or(0.0),
            monotonicity_violations: self.monotonicity_violations,
            gap_count: self.gap_count,
            max_gap_ms: self.max_gap_ms,
        }
    }

    pub fn reset(&mut self) {
        let expected = self.expected_interval_ms;
        let factor = self.gap_factor;
        *self = Self::new(None).with_gap_factor(factor);
        self.expected_interval_ms = expected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_regular_stream_has_no_findings() {
        let mut detector = DriftDetector::new(Some(1000.0));
        let timestamps: Vec<f64> = (0..100).map(|i| i as f64).collect();
        detector.observe(&timestamps);

        let report = detector.report();
        assert_eq!(report.samples_seen, 100);
        assert_eq!(report.monotonicity_violations, 0);
        assert_eq!(report.gap_count, 0);
        assert_relative_eq!(report.mean_delta_ms, 1.0);
        assert_relative_eq!(report.drift_ms, 0.0);
    }

    #[test]
    fn test_gap_detection() {
        // 1 kHz expectation, one 10ms hole
        let mut detector = DriftDetector::new(Some(1000.0));
        detector.observe(&[0.0, 1.0, 2.0, 12.0, 13.0]);

        let report = detector.report();
        assert_eq!(report.gap_count, 1);
        assert_relative_eq!(report.max_gap_ms, 10.0);
    }

    #[test]
    fn test_monotonicity_violation() {
        let mut detector = DriftDetector::new(None);
        detector.observe(&[0.0, 5.0, 3.0, 6.0]);

        let report = detector.report();
        assert_eq!(report.monotonicity_violations, 1);
        // Negative deltas stay out of the mean
        assert_relative_eq!(report.mean_delta_ms, 4.0);
    }

    #[test]
    fn test_drift_against_expected_interval() {
        // Expecting 1ms, receiving 1.25ms
        let mut detector = DriftDetector::new(Some(1000.0));
        let timestamps: Vec<f64> = (0..9).map(|i| i as f64 * 1.25).collect();
        detector.observe(&timestamps);

        let report = detector.report();
        assert_relative_eq!(report.drift_ms, 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_observation_spans_chunks() {
        let mut detector = DriftDetector::new(None);
        detector.observe(&[0.0, 1.0]);
        detector.observe(&[2.0, 3.0]);
        // Delta across the chunk boundary counts too
        assert_eq!(detector.report().samples_seen, 4);
        assert_relative_eq!(detector.report().mean_delta_ms, 1.0);
    }

    #[test]
    fn test_reset_keeps_configuration() {
        let mut detector = DriftDetector::new(Some(500.0)).with_gap_factor(3.0);
        detector.observe(&[0.0, 100.0]);
        detector.reset();

        let report = detector.report();
        assert_eq!(report.samples_seen, 0);
        assert_eq!(report.expected_delta_ms, Some(2.0));
    }

    #[test]
    fn test_invalid_rate_disables_expectation() {
        let detector = DriftDetector::new(Some(0.0));
        assert_eq!(detector.report().expected_delta_ms, None);
    }
}
