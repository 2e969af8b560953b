//! Timestamp synthesis
//!
//! Callers may supply explicit timestamps, a sample rate, or nothing. The
//! executor normalizes all three shapes into `(samples, timestamps)` before
//! dispatching to stages; this module covers the two synthetic shapes.

use crate::sample::TimestampMs;

/// Fill `out` with one timestamp per frame
///
/// With a valid sample rate, `t_i = i * 1000 / rate` (milliseconds);
/// otherwise the integer frame index is used. `out` is a reusable scratch
/// vector and is cleared first.
pub fn synthesize_timestamps(frames: usize, sample_rate: Option<f64>, out: &mut Vec<TimestampMs>) {
    out.clear();
    out.reserve(frames);

    match sample_rate {
        Some(rate) if rate.is_finite() && rate > 0.0 => {
            let period_ms = 1000.0 / rate;
            out.extend((0..frames).map(|i| i as f64 * period_ms));
        }
        Some(rate) => {
            log::warn!("ignoring invalid sample rate {rate}; falling back to frame indices");
            out.extend((0..frames).map(|i| i as f64));
        }
        None => {
            out.extend((0..frames).map(|i| i as f64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rate_derived_timestamps() {
        let mut ts = Vec::new();
        synthesize_timestamps(4, Some(2000.0), &mut ts);
        assert_eq!(ts.len(), 4);
        assert_relative_eq!(ts[1], 0.5);
        assert_relative_eq!(ts[3], 1.5);
    }

    #[test]
    fn test_index_fallback() {
        let mut ts = Vec::new();
        synthesize_timestamps(3, None, &mut ts);
        assert_eq!(ts, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_invalid_rate_falls_back_to_indices() {
        let mut ts = Vec::new();
        synthesize_timestamps(3, Some(0.0), &mut ts);
        assert_eq!(ts, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_scratch_reuse_clears() {
        let mut ts = vec![99.0; 8];
        synthesize_timestamps(2, None, &mut ts);
        assert_eq!(ts, vec![0.0, 1.0]);
    }
}
