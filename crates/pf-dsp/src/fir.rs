//! FIR/IIR filter section
//!
//! Runs externally designed coefficient sets; coefficient computation lives
//! in the filter-design subsystem, not here. The section keeps
//! most-recent-first input and output histories per channel and evaluates
//! the direct-form difference equation
//!
//! `y[n] = sum(b[k] * x[n-k]) - sum(a[k] * y[n-k-1])`
//!
//! with the FIR inner product running through the `dot_product` kernel.
//! An empty feedback set degenerates to a pure FIR.

use pf_core::{PfError, PfResult, Sample};

use crate::simd;

/// One per-channel FIR/IIR section with externally supplied taps
#[derive(Debug, Clone)]
pub struct FirIirSection {
    feed_forward: Vec<Sample>,
    feed_back: Vec<Sample>,
    /// Input history, most recent first, `feed_forward.len()` entries
    x_hist: Vec<Sample>,
    /// Output history, most recent first, `feed_back.len()` entries
    y_hist: Vec<Sample>,
}

impl FirIirSection {
    /// Build a section from feed-forward taps `b` and feedback taps `a`
    /// (`a` excludes the implicit unity a0 and may be empty)
    pub fn new(feed_forward: Vec<Sample>, feed_back: Vec<Sample>) -> PfResult<Self> {
        if feed_forward.is_empty() {
            return Err(PfError::Config(
                "filter section requires at least one feed-forward tap".to_string(),
            ));
        }
        if feed_forward
            .iter()
            .chain(feed_back.iter())
            .any(|c| !c.is_finite())
        {
            return Err(PfError::Config(
                "filter taps must be finite".to_string(),
            ));
        }
        let x_hist = vec![0.0; feed_forward.len()];
        let y_hist = vec![0.0; feed_back.len()];
        Ok(Self {
            feed_forward,
            feed_back,
            x_hist,
            y_hist,
        })
    }

    pub fn feed_forward(&self) -> &[Sample] {
        &self.feed_forward
    }

    pub fn feed_back(&self) -> &[Sample] {
        &self.feed_back
    }

    /// Process one sample through the section
    pub fn process_sample(&mut self, input: Sample) -> Sample {
        // Shift histories, newest in front
        for i in (1..self.x_hist.len()).rev() {
            self.x_hist[i] = self.x_hist[i - 1];
        }
        self.x_hist[0] = input;

        let mut output = simd::dot_product(&self.feed_forward, &self.x_hist);
        if !self.feed_back.is_empty() {
            output -= simd::dot_product(&self.feed_back, &self.y_hist);
            for i in (1..self.y_hist.len()).rev() {
                self.y_hist[i] = self.y_hist[i - 1];
            }
            self.y_hist[0] = output;
        }
        output
    }

    /// Zero both histories
    pub fn clear(&mut self) {
        self.x_hist.fill(0.0);
        self.y_hist.fill(0.0);
    }

    /// History snapshot: inputs then outputs, most recent first
    pub fn export(&self) -> Vec<Sample> {
        let mut state = Vec::with_capacity(self.x_hist.len() + self.y_hist.len());
        state.extend_from_slice(&self.x_hist);
        state.extend_from_slice(&self.y_hist);
        state
    }

    /// Restore a history snapshot produced by [`export`](Self::export)
    pub fn import(&mut self, state: &[Sample]) -> PfResult<()> {
        let expected = self.x_hist.len() + self.y_hist.len();
        if state.len() != expected {
            return Err(PfError::Codec(format!(
                "filter state has {} entries, section expects {}",
                state.len(),
                expected
            )));
        }
        let (x, y) = state.split_at(self.x_hist.len());
        self.x_hist.copy_from_slice(x);
        self.y_hist.copy_from_slice(y);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_requires_feed_forward_taps() {
        assert!(matches!(
            FirIirSection::new(vec![], vec![]),
            Err(PfError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_non_finite_taps() {
        assert!(matches!(
            FirIirSection::new(vec![1.0, f32::NAN], vec![]),
            Err(PfError::Config(_))
        ));
    }

    #[test]
    fn test_fir_moving_average_taps() {
        // b = [1/2, 1/2] averages adjacent samples
        let mut section = FirIirSection::new(vec![0.5, 0.5], vec![]).unwrap();
        let out: Vec<Sample> = [2.0, 4.0, 6.0, 8.0]
            .into_iter()
            .map(|x| section.process_sample(x))
            .collect();
        assert_eq!(out, vec![1.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_iir_leaky_integrator() {
        // y[n] = x[n] + 0.5 y[n-1]  (a = [-0.5])
        let mut section = FirIirSection::new(vec![1.0], vec![-0.5]).unwrap();
        assert_relative_eq!(section.process_sample(1.0), 1.0);
        assert_relative_eq!(section.process_sample(0.0), 0.5);
        assert_relative_eq!(section.process_sample(0.0), 0.25);
    }

    #[test]
    fn test_state_round_trip() {
        let taps = (vec![0.25, 0.5, 0.25], vec![-0.1, 0.05]);
        let mut original = FirIirSection::new(taps.0.clone(), taps.1.clone()).unwrap();
        for x in [1.0, -1.0, 2.0, -2.0, 3.0] {
            original.process_sample(x);
        }

        let state = original.export();
        let mut resumed = FirIirSection::new(taps.0, taps.1).unwrap();
        resumed.import(&state).unwrap();

        for x in [4.0, -4.0, 5.0] {
            assert_eq!(original.process_sample(x), resumed.process_sample(x));
        }
    }

    #[test]
    fn test_import_length_mismatch() {
        let mut section = FirIirSection::new(vec![1.0, 0.0], vec![]).unwrap();
        assert!(matches!(
            section.import(&[0.0; 5]),
            Err(PfError::Codec(_))
        ));
    }
}
