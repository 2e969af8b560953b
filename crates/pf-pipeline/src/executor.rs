//! Pipeline executor
//!
//! Ordered list of stages run in insertion order over interleaved
//! multi-channel chunks, in place. One pipeline instance is single-threaded:
//! a `process` call is a bounded, CPU-only unit of work with no internal
//! suspension points. Distinct pipelines share nothing.
//!
//! Shape and compatibility validation happens before any state mutation, so
//! a surfaced error always leaves the pipeline exactly as it was.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use pf_core::{
    PfError, PfResult, PipelineConfig, Sample, TimestampMs, frame_count, synthesize_timestamps,
};
use pf_dsp::{DriftDetector, DriftReport};
use pf_state::StateBlob;

use crate::callbacks::{
    BatchInfo, LogEntry, LogLevel, LogPool, PipelineCallbacks, TapCallback,
};
use crate::stage::{Stage, StageSpec};

/// Per-call processing options
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Interleaved channel count
    pub channels: usize,
    /// Overrides the configured sample rate for timestamp synthesis
    pub sample_rate: Option<f64>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate: None,
        }
    }
}

impl ProcessOptions {
    pub fn channels(channels: usize) -> Self {
        Self {
            channels,
            ..Self::default()
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }
}

struct Tap {
    stage_index: usize,
    callback: TapCallback,
}

/// Composable, stateful processing pipeline over interleaved streams
pub struct Pipeline {
    config: PipelineConfig,
    stages: Vec<Stage>,
    taps: Vec<Tap>,
    callbacks: PipelineCallbacks,
    drift: Option<DriftDetector>,
    log_pool: LogPool,
    /// Channel count the current per-channel state is bound to
    bound_channels: Option<usize>,
    /// Whether any stateful stage holds populated state
    state_dirty: bool,
    ts_scratch: Vec<TimestampMs>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            stages: Vec::new(),
            taps: Vec::new(),
            callbacks: PipelineCallbacks::default(),
            drift: None,
            log_pool: LogPool::default(),
            bound_channels: None,
            state_dirty: false,
            ts_scratch: Vec::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Append a stage
    ///
    /// Adding a stage after processing has started implicitly clears all
    /// pipeline state.
    pub fn add_stage(&mut self, spec: StageSpec) -> PfResult<&mut Self> {
        let stage = Stage::new(spec, self.stages.len())?;
        if self.state_dirty {
            log::warn!("stage added after processing started; clearing pipeline state");
            self.log_pool.push(LogEntry::new(
                LogLevel::Warn,
                "pipeline",
                "stage added after processing started; pipeline state cleared",
                None,
            ));
            self.clear_state();
        }
        self.stages.push(stage);
        Ok(self)
    }

    /// Register a tap running after the most recently added stage
    pub fn tap(
        &mut self,
        callback: impl FnMut(&[Sample]) + Send + 'static,
    ) -> PfResult<&mut Self> {
        let Some(stage_index) = self.stages.len().checked_sub(1) else {
            return Err(PfError::Config(
                "a tap must follow a stage; add one first".to_string(),
            ));
        };
        self.taps.push(Tap {
            stage_index,
            callback: Box::new(callback),
        });
        Ok(self)
    }

    pub fn set_callbacks(&mut self, callbacks: PipelineCallbacks) -> &mut Self {
        self.callbacks = callbacks;
        self
    }

    pub fn set_drift_detector(&mut self, detector: DriftDetector) -> &mut Self {
        self.drift = Some(detector);
        self
    }

    /// Drift metrics, when a detector is attached
    pub fn drift_report(&self) -> Option<DriftReport> {
        self.drift.as_ref().map(DriftDetector::report)
    }

    /// Process one interleaved chunk in place
    ///
    /// `timestamps` carries one entry per frame, shared across channels;
    /// absent timestamps are synthesized from the sample rate or fall back
    /// to frame indices.
    pub fn process(
        &mut self,
        samples: &mut [Sample],
        timestamps: Option<&[TimestampMs]>,
        options: &ProcessOptions,
    ) -> PfResult<()> {
        let channels = options.channels;
        if channels == 0 {
            return Err(PfError::Shape("channel count must be at least 1".to_string()));
        }
        let frames = frame_count(samples.len(), channels).ok_or_else(|| {
            PfError::Shape(format!(
                "chunk of {} samples is not a multiple of {} channels",
                samples.len(),
                channels
            ))
        })?;
        if let Some(ts) = timestamps {
            if ts.len() != frames {
                return Err(PfError::Shape(format!(
                    "{} timestamps supplied for {} frames",
                    ts.len(),
                    frames
                )));
            }
        }
        if let Some(bound) = self.bound_channels {
            if bound != channels && self.state_dirty {
                return Err(PfError::Shape(format!(
                    "pipeline state is bound to {bound} channels; cannot process {channels}"
                )));
            }
        }

        // Validation passed; from here on mutation is allowed.
        for stage in &mut self.stages {
            stage.ensure_channels(channels)?;
        }

        let mut scratch = std::mem::take(&mut self.ts_scratch);
        let ts_slice: &[TimestampMs] = match timestamps {
            Some(ts) => ts,
            None => {
                let rate = options.sample_rate.or(self.config.sample_rate);
                synthesize_timestamps(frames, rate, &mut scratch);
                &scratch
            }
        };

        if let Some(drift) = &mut self.drift {
            drift.observe(ts_slice);
        }

        for i in 0..self.stages.len() {
            let started = Instant::now();

            if let Err(err) = self.stages[i].process_chunk(samples, ts_slice, channels) {
                let label = self.stages[i].label().to_string();
                log::warn!("stage {label} failed: {err}");
                self.log_pool.push(LogEntry::new(
                    LogLevel::Error,
                    "stage",
                    format!("{label} failed: {err}"),
                    None,
                ));
                if let Some(cb) = self.callbacks.on_error.as_mut() {
                    invoke_guarded(&mut self.log_pool, "on_error", || cb(&label, &err));
                }
                // The chunk stays unmodified from the failure point onward
                break;
            }

            if let Some(cb) = self.callbacks.on_batch.as_mut() {
                let info = BatchInfo {
                    stage: self.stages[i].label(),
                    samples,
                    start_index: 0,
                    count: samples.len(),
                };
                invoke_guarded(&mut self.log_pool, "on_batch", || cb(&info));
            }

            for tap in self.taps.iter_mut().filter(|t| t.stage_index == i) {
                invoke_guarded(&mut self.log_pool, "tap", || (tap.callback)(&*samples));
            }

            if let Some(cb) = self.callbacks.on_stage_complete.as_mut() {
                let label = self.stages[i].label();
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                invoke_guarded(&mut self.log_pool, "on_stage_complete", || {
                    cb(label, elapsed_ms)
                });
            }
        }

        self.bound_channels = Some(channels);
        if frames > 0 && self.stages.iter().any(|s| s.spec().is_stateful()) {
            self.state_dirty = true;
        }

        self.ts_scratch = scratch;
        self.flush_logs();
        Ok(())
    }

    /// Allocate a copy of the input and process that instead
    pub fn process_copy(
        &mut self,
        samples: &[Sample],
        timestamps: Option<&[TimestampMs]>,
        options: &ProcessOptions,
    ) -> PfResult<Vec<Sample>> {
        let mut copy = samples.to_vec();
        self.process(&mut copy, timestamps, options)?;
        Ok(copy)
    }

    // ---- State surface ----

    /// Encode the complete pipeline state into a textual blob
    pub fn save_state(&self) -> PfResult<String> {
        let records = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| stage.to_record(i))
            .collect();
        pf_state::encode(&StateBlob::new(records))
    }

    /// Restore state from a blob produced by a pipeline with the same
    /// stage list
    ///
    /// All records are decoded and rebuilt before anything is swapped in;
    /// any failure leaves the pipeline untouched.
    pub fn load_state(&mut self, text: &str) -> PfResult<()> {
        let blob = pf_state::decode(text)?;
        if blob.stages.len() != self.stages.len() {
            return Err(PfError::StateCompat(format!(
                "blob carries {} stages, pipeline has {}",
                blob.stages.len(),
                self.stages.len()
            )));
        }

        let mut new_states = Vec::with_capacity(self.stages.len());
        let mut channels: Option<usize> = None;
        for (stage, record) in self.stages.iter().zip(blob.stages.iter()) {
            let state = stage.build_state_from_record(record)?;
            let n = record.state.num_channels as usize;
            if stage.spec().is_stateful() && n > 0 {
                match channels {
                    None => channels = Some(n),
                    Some(existing) if existing != n => {
                        return Err(PfError::StateCompat(format!(
                            "stages disagree on channel count ({existing} vs {n})"
                        )));
                    }
                    _ => {}
                }
            }
            new_states.push(state);
        }

        for (stage, state) in self.stages.iter_mut().zip(new_states) {
            stage.adopt_state(state);
        }
        if let Some(n) = channels {
            self.bound_channels = Some(n);
            self.state_dirty = true;
        } else {
            self.bound_channels = None;
            self.state_dirty = false;
        }
        log::debug!("pipeline state restored ({} stages)", self.stages.len());
        self.log_pool.push(LogEntry::new(
            LogLevel::Info,
            "pipeline",
            format!("state restored ({} stages)", self.stages.len()),
            None,
        ));
        Ok(())
    }

    /// Reset per-channel state of every stage; the stages remain
    pub fn clear_state(&mut self) {
        for stage in &mut self.stages {
            stage.clear_state();
        }
        self.bound_channels = None;
        self.state_dirty = false;
    }

    /// Lightweight state summary without per-channel buffer contents
    pub fn list_state(&self) -> PfResult<StateBlob> {
        let records = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| stage.to_record(i))
            .collect();
        Ok(StateBlob::new(records).summary())
    }

    fn flush_logs(&mut self) {
        if self.log_pool.is_empty() {
            return;
        }
        let entries = self.log_pool.drain();
        if let Some(cb) = self.callbacks.on_log.as_mut() {
            for entry in &entries {
                if catch_unwind(AssertUnwindSafe(|| cb(entry))).is_err() {
                    log::warn!("on_log callback panicked; continuing");
                }
            }
        }
        if let Some(cb) = self.callbacks.on_log_batch.as_mut() {
            if catch_unwind(AssertUnwindSafe(|| cb(&entries))).is_err() {
                log::warn!("on_log_batch callback panicked; continuing");
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

/// Run a callback, swallowing and logging a panic instead of letting it
/// tear through the stage loop
fn invoke_guarded<F: FnOnce()>(pool: &mut LogPool, what: &str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::warn!("{what} callback panicked; continuing");
        pool.push(LogEntry::new(
            LogLevel::Warn,
            "callback",
            format!("{what} callback panicked"),
            None,
        ));
    }
}
