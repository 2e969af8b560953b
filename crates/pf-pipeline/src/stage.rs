//! Stage model
//!
//! A stage is one node in the pipeline: a windowed statistic (batch or
//! moving), a rectifier, or an externally designed FIR/IIR filter. Stage
//! kind is a tagged variant; per-sample dispatch is a match on it. Stateful
//! stages own a flat vector of per-channel cells indexed by channel number;
//! de-interleaving is virtual (stride walks over the shared chunk), so no
//! allocation happens per `process` call.

use pf_core::{PfError, PfResult, Sample, TimestampMs};
use pf_dsp::policy::Accumulators;
use pf_dsp::{
    DEFAULT_EPSILON, FirIirSection, Mav, Mean, RectifyMode, Rms, SlidingWindow, Variance,
    WindowExtent, WindowState, ZScore, simd,
};
use pf_state::{ChannelStateDoc, StageRecord, StageStateDoc};

// ============ Specs ============

/// Statistic evaluation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatMode {
    /// One statistic over the whole chunk, no cross-chunk state
    Batch,
    /// One statistic per sample from a sliding window that persists
    /// across chunks
    Moving,
}

impl StatMode {
    pub fn tag(self) -> &'static str {
        match self {
            StatMode::Batch => "batch",
            StatMode::Moving => "moving",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "batch" => Some(StatMode::Batch),
            "moving" => Some(StatMode::Moving),
            _ => None,
        }
    }
}

/// Parameters shared by the windowed-statistic stages
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedSpec {
    pub mode: StatMode,
    pub window_size: Option<u32>,
    pub window_duration_ms: Option<f64>,
}

impl WindowedSpec {
    pub fn batch() -> Self {
        Self {
            mode: StatMode::Batch,
            window_size: None,
            window_duration_ms: None,
        }
    }

    pub fn moving_samples(window_size: u32) -> Self {
        Self {
            mode: StatMode::Moving,
            window_size: Some(window_size),
            window_duration_ms: None,
        }
    }

    pub fn moving_duration(window_duration_ms: f64) -> Self {
        Self {
            mode: StatMode::Moving,
            window_size: None,
            window_duration_ms: Some(window_duration_ms),
        }
    }

    fn validate(&self) -> PfResult<()> {
        if let Some(size) = self.window_size {
            if size == 0 {
                return Err(PfError::Config("window size must be positive".to_string()));
            }
        }
        if let Some(duration) = self.window_duration_ms {
            if !duration.is_finite() || duration <= 0.0 {
                return Err(PfError::Config(
                    "window duration must be positive and finite".to_string(),
                ));
            }
        }
        match self.mode {
            StatMode::Moving => {
                if self.window_size.is_none() && self.window_duration_ms.is_none() {
                    return Err(PfError::Config(
                        "moving mode requires a window size or duration".to_string(),
                    ));
                }
            }
            StatMode::Batch => {
                if self.window_size.is_some() || self.window_duration_ms.is_some() {
                    return Err(PfError::Config(
                        "batch mode does not take window parameters".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Active window extent in moving mode; duration wins when both are set
    fn extent(&self) -> Option<WindowExtent> {
        if self.mode != StatMode::Moving {
            return None;
        }
        self.window_duration_ms
            .map(WindowExtent::DurationMs)
            .or(self.window_size.map(|k| WindowExtent::Samples(k as usize)))
    }
}

/// Externally designed filter taps
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    /// Feed-forward taps `b` (at least one)
    pub feed_forward: Vec<Sample>,
    /// Feedback taps `a`, excluding the implicit unity a0 (may be empty)
    pub feed_back: Vec<Sample>,
}

/// Stage kind plus parameters; the stable wire tags live here
#[derive(Debug, Clone, PartialEq)]
pub enum StageSpec {
    MovingAverage(WindowedSpec),
    Rms(WindowedSpec),
    MeanAbsoluteValue(WindowedSpec),
    Variance(WindowedSpec),
    ZScoreNormalize {
        windowed: WindowedSpec,
        epsilon: f64,
    },
    Rectify(RectifyMode),
    Filter(FilterSpec),
}

impl StageSpec {
    /// Z-score stage with the default epsilon
    pub fn z_score_normalize(windowed: WindowedSpec) -> Self {
        StageSpec::ZScoreNormalize {
            windowed,
            epsilon: DEFAULT_EPSILON,
        }
    }

    /// Stable on-wire kind tag
    pub fn tag(&self) -> &'static str {
        match self {
            StageSpec::MovingAverage(_) => "movingAverage",
            StageSpec::Rms(_) => "rms",
            StageSpec::MeanAbsoluteValue(_) => "meanAbsoluteValue",
            StageSpec::Variance(_) => "variance",
            StageSpec::ZScoreNormalize { .. } => "zScoreNormalize",
            StageSpec::Rectify(_) => "rectify",
            StageSpec::Filter(_) => "filter",
        }
    }

    pub fn validate(&self) -> PfResult<()> {
        match self {
            StageSpec::MovingAverage(spec)
            | StageSpec::Rms(spec)
            | StageSpec::MeanAbsoluteValue(spec)
            | StageSpec::Variance(spec) => spec.validate(),
            StageSpec::ZScoreNormalize { windowed, epsilon } => {
                if !epsilon.is_finite() || *epsilon <= 0.0 {
                    return Err(PfError::Config("epsilon must be positive".to_string()));
                }
                windowed.validate()
            }
            StageSpec::Rectify(_) => Ok(()),
            StageSpec::Filter(spec) => {
                FirIirSection::new(spec.feed_forward.clone(), spec.feed_back.clone()).map(|_| ())
            }
        }
    }

    fn windowed(&self) -> Option<&WindowedSpec> {
        match self {
            StageSpec::MovingAverage(spec)
            | StageSpec::Rms(spec)
            | StageSpec::MeanAbsoluteValue(spec)
            | StageSpec::Variance(spec) => Some(spec),
            StageSpec::ZScoreNormalize { windowed, .. } => Some(windowed),
            StageSpec::Rectify(_) | StageSpec::Filter(_) => None,
        }
    }

    fn stat_kind(&self) -> Option<StatKind> {
        match self {
            StageSpec::MovingAverage(_) => Some(StatKind::Mean),
            StageSpec::Rms(_) => Some(StatKind::Rms),
            StageSpec::MeanAbsoluteValue(_) => Some(StatKind::Mav),
            StageSpec::Variance(_) => Some(StatKind::Variance),
            StageSpec::ZScoreNormalize { .. } => Some(StatKind::ZScore),
            StageSpec::Rectify(_) | StageSpec::Filter(_) => None,
        }
    }

    fn epsilon(&self) -> Option<f64> {
        match self {
            StageSpec::ZScoreNormalize { epsilon, .. } => Some(*epsilon),
            _ => None,
        }
    }

    /// Whether the stage carries per-channel runtime state
    pub fn is_stateful(&self) -> bool {
        match self {
            StageSpec::Filter(_) => true,
            StageSpec::Rectify(_) => false,
            _ => self
                .windowed()
                .map(|w| w.mode == StatMode::Moving)
                .unwrap_or(false),
        }
    }
}

/// Statistic identity, used for cell construction and accumulator checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatKind {
    Mean,
    Rms,
    Mav,
    Variance,
    ZScore,
}

// ============ Per-channel cells ============

/// One channel's sliding-window filter, dispatched by statistic kind
#[derive(Debug, Clone)]
pub(crate) enum WindowedChannel {
    Mean(SlidingWindow<Mean>),
    Rms(SlidingWindow<Rms>),
    Mav(SlidingWindow<Mav>),
    Variance(SlidingWindow<Variance>),
    ZScore(SlidingWindow<ZScore>),
}

impl WindowedChannel {
    fn new(kind: StatKind, extent: WindowExtent, epsilon: f64) -> Self {
        match kind {
            StatKind::Mean => WindowedChannel::Mean(SlidingWindow::new(extent, Mean::default())),
            StatKind::Rms => WindowedChannel::Rms(SlidingWindow::new(extent, Rms::default())),
            StatKind::Mav => WindowedChannel::Mav(SlidingWindow::new(extent, Mav::default())),
            StatKind::Variance => {
                WindowedChannel::Variance(SlidingWindow::new(extent, Variance::default()))
            }
            StatKind::ZScore => {
                WindowedChannel::ZScore(SlidingWindow::new(extent, ZScore::new(epsilon)))
            }
        }
    }

    #[inline]
    fn add_sample(&mut self, x: Sample, t: TimestampMs) -> Sample {
        match self {
            WindowedChannel::Mean(w) => w.add_sample(x, t),
            WindowedChannel::Rms(w) => w.add_sample(x, t),
            WindowedChannel::Mav(w) => w.add_sample(x, t),
            WindowedChannel::Variance(w) => w.add_sample(x, t),
            WindowedChannel::ZScore(w) => w.add_sample(x, t),
        }
    }

    fn clear(&mut self) {
        match self {
            WindowedChannel::Mean(w) => w.clear(),
            WindowedChannel::Rms(w) => w.clear(),
            WindowedChannel::Mav(w) => w.clear(),
            WindowedChannel::Variance(w) => w.clear(),
            WindowedChannel::ZScore(w) => w.clear(),
        }
    }

    fn export(&self) -> WindowState {
        match self {
            WindowedChannel::Mean(w) => w.export(),
            WindowedChannel::Rms(w) => w.export(),
            WindowedChannel::Mav(w) => w.export(),
            WindowedChannel::Variance(w) => w.export(),
            WindowedChannel::ZScore(w) => w.export(),
        }
    }

    fn import(&mut self, state: &WindowState) -> PfResult<()> {
        match self {
            WindowedChannel::Mean(w) => w.import(state),
            WindowedChannel::Rms(w) => w.import(state),
            WindowedChannel::Mav(w) => w.import(state),
            WindowedChannel::Variance(w) => w.import(state),
            WindowedChannel::ZScore(w) => w.import(state),
        }
    }
}

/// Stage runtime state
#[derive(Debug)]
pub(crate) enum StageState {
    /// Rectify and batch statistics carry nothing across chunks
    Stateless,
    Windowed(Vec<WindowedChannel>),
    Filter(Vec<FirIirSection>),
}

// ============ Stage ============

/// One pipeline node: spec plus per-channel runtime state
#[derive(Debug)]
pub(crate) struct Stage {
    spec: StageSpec,
    label: String,
    state: StageState,
}

impl Stage {
    pub fn new(spec: StageSpec, index: usize) -> PfResult<Self> {
        spec.validate()?;
        let label = format!("{}[{}]", spec.tag(), index);
        let state = if spec.is_stateful() {
            match spec {
                StageSpec::Filter(_) => StageState::Filter(Vec::new()),
                _ => StageState::Windowed(Vec::new()),
            }
        } else {
            StageState::Stateless
        };
        Ok(Self { spec, label, state })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn spec(&self) -> &StageSpec {
        &self.spec
    }

    /// Build fresh per-channel cells when the count changes
    ///
    /// The executor only calls this when no populated state would be lost.
    pub fn ensure_channels(&mut self, channels: usize) -> PfResult<()> {
        match &mut self.state {
            StageState::Stateless => Ok(()),
            StageState::Windowed(cells) => {
                if cells.len() != channels {
                    *cells = self.spec.fresh_windowed_cells(channels)?;
                }
                Ok(())
            }
            StageState::Filter(sections) => {
                if sections.len() != channels {
                    *sections = self.spec.fresh_filter_sections(channels)?;
                }
                Ok(())
            }
        }
    }

    /// Reset per-channel state; the stage itself remains
    pub fn clear_state(&mut self) {
        match &mut self.state {
            StageState::Stateless => {}
            StageState::Windowed(cells) => cells.iter_mut().for_each(WindowedChannel::clear),
            StageState::Filter(sections) => sections.iter_mut().for_each(FirIirSection::clear),
        }
    }

    /// Run the stage over one interleaved chunk, overwriting in place
    pub fn process_chunk(
        &mut self,
        samples: &mut [Sample],
        timestamps: &[TimestampMs],
        channels: usize,
    ) -> PfResult<()> {
        match (&self.spec, &mut self.state) {
            (StageSpec::Rectify(mode), _) => {
                // Elementwise and channel-independent: one kernel pass over
                // the whole interleaved chunk.
                mode.apply(samples);
                Ok(())
            }
            (spec, StageState::Stateless) => {
                let kind = spec.stat_kind().ok_or_else(|| {
                    PfError::Runtime(format!("{} has no batch statistic", self.label))
                })?;
                batch_fill(kind, spec.epsilon().unwrap_or(DEFAULT_EPSILON), samples, channels);
                Ok(())
            }
            (_, StageState::Windowed(cells)) => {
                for (channel, cell) in cells.iter_mut().enumerate() {
                    for (frame, index) in (channel..samples.len()).step_by(channels).enumerate() {
                        samples[index] = cell.add_sample(samples[index], timestamps[frame]);
                    }
                }
                Ok(())
            }
            (_, StageState::Filter(sections)) => {
                for (channel, section) in sections.iter_mut().enumerate() {
                    for index in (channel..samples.len()).step_by(channels) {
                        samples[index] = section.process_sample(samples[index]);
                    }
                }
                Ok(())
            }
        }
    }

    // ---- State document mapping ----

    /// Serialize parameters and per-channel substate
    pub fn to_record(&self, index: usize) -> StageRecord {
        let channels: Vec<ChannelStateDoc> = match &self.state {
            StageState::Stateless => Vec::new(),
            StageState::Windowed(cells) => cells
                .iter()
                .map(|cell| window_state_to_doc(&cell.export()))
                .collect(),
            StageState::Filter(sections) => sections
                .iter()
                .map(|section| ChannelStateDoc {
                    buffer: section.export().iter().map(|&v| v as f64).collect(),
                    ..ChannelStateDoc::default()
                })
                .collect(),
        };
        StageRecord {
            index: index as u32,
            type_tag: self.spec.tag().to_string(),
            state: self.params_doc(channels),
        }
    }

    /// Parameter fields of the state document
    pub fn params_doc(&self, channels: Vec<ChannelStateDoc>) -> StageStateDoc {
        let num_channels = channels.len() as u32;
        let mut doc = StageStateDoc {
            num_channels,
            channels,
            ..StageStateDoc::default()
        };
        match &self.spec {
            StageSpec::Rectify(mode) => {
                doc.mode = Some(mode.tag().to_string());
            }
            StageSpec::Filter(spec) => {
                doc.feed_forward = Some(spec.feed_forward.iter().map(|&c| c as f64).collect());
                doc.feed_back = Some(spec.feed_back.iter().map(|&c| c as f64).collect());
            }
            spec => {
                if let Some(windowed) = spec.windowed() {
                    doc.mode = Some(windowed.mode.tag().to_string());
                    doc.window_size = windowed.window_size;
                    doc.window_duration = windowed.window_duration_ms;
                }
                doc.epsilon = spec.epsilon();
            }
        }
        doc
    }

    /// Check a record's tag and parameters against this stage
    pub fn check_record_compat(&self, record: &StageRecord) -> PfResult<()> {
        if record.type_tag != self.spec.tag() {
            return Err(PfError::StateCompat(format!(
                "{} cannot adopt state saved for `{}`",
                self.label, record.type_tag
            )));
        }
        let own = self.params_doc(Vec::new());
        let theirs = &record.state;
        let params_match = own.window_size == theirs.window_size
            && own.window_duration == theirs.window_duration
            && own.mode == theirs.mode
            && own.epsilon == theirs.epsilon
            && own.feed_forward == theirs.feed_forward
            && own.feed_back == theirs.feed_back;
        if !params_match {
            return Err(PfError::StateCompat(format!(
                "{} parameters differ from the saved stage",
                self.label
            )));
        }
        Ok(())
    }

    /// Build a fresh runtime state from a compatible record
    ///
    /// Pure construction: the live state is untouched until
    /// [`adopt_state`](Self::adopt_state), so a failing record leaves the
    /// pipeline unchanged.
    pub fn build_state_from_record(&self, record: &StageRecord) -> PfResult<StageState> {
        self.check_record_compat(record)?;
        let docs = &record.state.channels;
        match &self.state {
            StageState::Stateless => {
                if !docs.is_empty() {
                    return Err(PfError::StateCompat(format!(
                        "{} carries no per-channel state but the record has {}",
                        self.label,
                        docs.len()
                    )));
                }
                Ok(StageState::Stateless)
            }
            StageState::Windowed(_) => {
                let kind = self.spec.stat_kind().ok_or_else(|| {
                    PfError::Runtime(format!("{} has windowed state without a statistic", self.label))
                })?;
                let mut cells = self.spec.fresh_windowed_cells(docs.len())?;
                for (cell, doc) in cells.iter_mut().zip(docs.iter()) {
                    let state = doc_to_window_state(kind, doc)?;
                    cell.import(&state)?;
                }
                Ok(StageState::Windowed(cells))
            }
            StageState::Filter(_) => {
                let mut sections = self.spec.fresh_filter_sections(docs.len())?;
                for (section, doc) in sections.iter_mut().zip(docs.iter()) {
                    let history: Vec<Sample> = doc.buffer.iter().map(|&v| v as Sample).collect();
                    section.import(&history)?;
                }
                Ok(StageState::Filter(sections))
            }
        }
    }

    /// Swap in a state built by [`build_state_from_record`](Self::build_state_from_record)
    pub fn adopt_state(&mut self, state: StageState) {
        self.state = state;
    }
}

impl StageSpec {
    fn fresh_windowed_cells(&self, channels: usize) -> PfResult<Vec<WindowedChannel>> {
        let kind = self
            .stat_kind()
            .ok_or_else(|| PfError::Runtime(format!("`{}` has no statistic kind", self.tag())))?;
        let extent = self
            .windowed()
            .and_then(WindowedSpec::extent)
            .ok_or_else(|| PfError::Runtime(format!("`{}` has no window extent", self.tag())))?;
        let epsilon = self.epsilon().unwrap_or(DEFAULT_EPSILON);
        Ok((0..channels)
            .map(|_| WindowedChannel::new(kind, extent, epsilon))
            .collect())
    }

    fn fresh_filter_sections(&self, channels: usize) -> PfResult<Vec<FirIirSection>> {
        let StageSpec::Filter(spec) = self else {
            return Err(PfError::Runtime(format!(
                "`{}` is not a filter stage",
                self.tag()
            )));
        };
        (0..channels)
            .map(|_| FirIirSection::new(spec.feed_forward.clone(), spec.feed_back.clone()))
            .collect()
    }
}

// ============ Batch statistics ============

/// Fill the chunk with the per-channel batch statistic
///
/// Mean, RMS, MAV, and variance emit one scalar per channel into every
/// slot. Z-score normalizes each sample against the chunk's own mean and
/// deviation (a constant would be meaningless for a normalizer).
fn batch_fill(kind: StatKind, epsilon: f64, samples: &mut [Sample], channels: usize) {
    let frames = samples.len() / channels;
    if frames == 0 {
        return;
    }
    let n = frames as f64;

    for channel in 0..channels {
        let (sum, sum_sq, sum_abs) = channel_moments(samples, channel, channels);

        match kind {
            StatKind::Mean => fill_channel(samples, channel, channels, (sum / n) as Sample),
            StatKind::Rms => {
                fill_channel(samples, channel, channels, ((sum_sq.max(0.0) / n).sqrt()) as Sample)
            }
            StatKind::Mav => fill_channel(samples, channel, channels, (sum_abs / n) as Sample),
            StatKind::Variance => {
                let mean = sum / n;
                let variance = (sum_sq / n - mean * mean).max(0.0);
                fill_channel(samples, channel, channels, variance as Sample);
            }
            StatKind::ZScore => {
                let mean = sum / n;
                let std = (sum_sq / n - mean * mean).max(0.0).sqrt();
                if frames < 2 || std < epsilon {
                    fill_channel(samples, channel, channels, 0.0);
                } else {
                    for index in (channel..samples.len()).step_by(channels) {
                        samples[index] = ((samples[index] as f64 - mean) / std) as Sample;
                    }
                }
            }
        }
    }
}

/// Sum, sum of squares, and sum of absolute values over one channel
fn channel_moments(samples: &[Sample], channel: usize, channels: usize) -> (f64, f64, f64) {
    if channels == 1 {
        // Contiguous mono chunk: reduction kernels apply directly
        let sum = simd::sum(samples);
        let sum_sq = simd::sum_of_squares(samples);
        let sum_abs = samples.iter().map(|&x| (x as f64).abs()).sum();
        return (sum, sum_sq, sum_abs);
    }
    let mut sum = 0.0_f64;
    let mut sum_sq = 0.0_f64;
    let mut sum_abs = 0.0_f64;
    for index in (channel..samples.len()).step_by(channels) {
        let x = samples[index] as f64;
        sum += x;
        sum_sq += x * x;
        sum_abs += x.abs();
    }
    (sum, sum_sq, sum_abs)
}

fn fill_channel(samples: &mut [Sample], channel: usize, channels: usize, value: Sample) {
    for index in (channel..samples.len()).step_by(channels) {
        samples[index] = value;
    }
}

// ============ Document mapping helpers ============

fn window_state_to_doc(state: &WindowState) -> ChannelStateDoc {
    ChannelStateDoc {
        buffer: state.values.iter().map(|&v| v as f64).collect(),
        timestamps: state.timestamps.clone(),
        running_sum: state.accumulators.sum,
        running_sum_of_squares: state.accumulators.sum_sq,
        running_sum_of_abs: state.accumulators.sum_abs,
    }
}

fn doc_to_window_state(kind: StatKind, doc: &ChannelStateDoc) -> PfResult<WindowState> {
    let require = |field: Option<f64>, name: &str| {
        field.ok_or_else(|| PfError::Codec(format!("channel state is missing `{name}`")))
    };
    let accumulators = match kind {
        StatKind::Mean => Accumulators {
            sum: Some(require(doc.running_sum, "runningSum")?),
            ..Accumulators::default()
        },
        StatKind::Rms => Accumulators {
            sum_sq: Some(require(doc.running_sum_of_squares, "runningSumOfSquares")?),
            ..Accumulators::default()
        },
        StatKind::Mav => Accumulators {
            sum_abs: Some(require(doc.running_sum_of_abs, "runningSumOfAbs")?),
            ..Accumulators::default()
        },
        StatKind::Variance | StatKind::ZScore => Accumulators {
            sum: Some(require(doc.running_sum, "runningSum")?),
            sum_sq: Some(require(doc.running_sum_of_squares, "runningSumOfSquares")?),
            sum_abs: None,
        },
    };
    Ok(WindowState {
        values: doc.buffer.iter().map(|&v| v as Sample).collect(),
        timestamps: doc.timestamps.clone(),
        accumulators,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spec_validation() {
        assert!(StageSpec::Rms(WindowedSpec::moving_samples(3)).validate().is_ok());
        assert!(StageSpec::Rms(WindowedSpec::moving_samples(0)).validate().is_err());
        assert!(StageSpec::Rms(WindowedSpec::batch()).validate().is_ok());

        // Moving without any window parameter
        let bad = WindowedSpec {
            mode: StatMode::Moving,
            window_size: None,
            window_duration_ms: None,
        };
        assert!(StageSpec::MovingAverage(bad).validate().is_err());

        // Batch with a window parameter
        let bad = WindowedSpec {
            mode: StatMode::Batch,
            window_size: Some(4),
            window_duration_ms: None,
        };
        assert!(StageSpec::MovingAverage(bad).validate().is_err());

        assert!(
            StageSpec::ZScoreNormalize {
                windowed: WindowedSpec::moving_samples(4),
                epsilon: 0.0,
            }
            .validate()
            .is_err()
        );

        assert!(
            StageSpec::Filter(FilterSpec {
                feed_forward: vec![],
                feed_back: vec![],
            })
            .validate()
            .is_err()
        );
    }

    #[test]
    fn test_duration_wins_over_size() {
        let spec = WindowedSpec {
            mode: StatMode::Moving,
            window_size: Some(8),
            window_duration_ms: Some(250.0),
        };
        assert_eq!(spec.extent(), Some(WindowExtent::DurationMs(250.0)));
    }

    #[test]
    fn test_stage_labels() {
        let stage = Stage::new(StageSpec::Rms(WindowedSpec::moving_samples(2)), 3).unwrap();
        assert_eq!(stage.label(), "rms[3]");
    }

    #[test]
    fn test_moving_stage_stride_walk() {
        // Two channels, window 2: each channel averages independently
        let mut stage =
            Stage::new(StageSpec::MovingAverage(WindowedSpec::moving_samples(2)), 0).unwrap();
        stage.ensure_channels(2).unwrap();

        let mut samples = vec![10.0, 100.0, 20.0, 200.0, 30.0, 300.0, 40.0, 400.0];
        let timestamps = vec![0.0, 1.0, 2.0, 3.0];
        stage.process_chunk(&mut samples, &timestamps, 2).unwrap();
        assert_eq!(samples, vec![10.0, 100.0, 15.0, 150.0, 25.0, 250.0, 35.0, 350.0]);
    }

    #[test]
    fn test_batch_fill_constant() {
        let mut stage = Stage::new(StageSpec::MovingAverage(WindowedSpec::batch()), 0).unwrap();
        stage.ensure_channels(1).unwrap();

        let mut samples = vec![1.0, 2.0, 3.0, 4.0];
        let timestamps = vec![0.0, 1.0, 2.0, 3.0];
        stage.process_chunk(&mut samples, &timestamps, 1).unwrap();
        assert_eq!(samples, vec![2.5; 4]);
    }

    #[test]
    fn test_batch_rms_per_channel() {
        let mut stage = Stage::new(StageSpec::Rms(WindowedSpec::batch()), 0).unwrap();
        stage.ensure_channels(2).unwrap();

        let mut samples = vec![3.0, 1.0, -4.0, -1.0];
        let timestamps = vec![0.0, 1.0];
        stage.process_chunk(&mut samples, &timestamps, 2).unwrap();
        let rms_ch0 = ((9.0 + 16.0) / 2.0_f64).sqrt() as Sample;
        assert_relative_eq!(samples[0], rms_ch0);
        assert_relative_eq!(samples[2], rms_ch0);
        assert_relative_eq!(samples[1], 1.0);
        assert_relative_eq!(samples[3], 1.0);
    }

    #[test]
    fn test_batch_zscore_normalizes_chunk() {
        let mut stage = Stage::new(
            StageSpec::z_score_normalize(WindowedSpec::batch()),
            0,
        )
        .unwrap();
        stage.ensure_channels(1).unwrap();

        let mut samples = vec![1.0, 2.0, 3.0];
        let timestamps = vec![0.0, 1.0, 2.0];
        stage.process_chunk(&mut samples, &timestamps, 1).unwrap();

        // mean 2, population std sqrt(2/3)
        let std = (2.0_f64 / 3.0).sqrt();
        assert_relative_eq!(samples[0], (-1.0 / std) as Sample, epsilon = 1e-6);
        assert_relative_eq!(samples[1], 0.0);
        assert_relative_eq!(samples[2], (1.0 / std) as Sample, epsilon = 1e-6);
    }

    #[test]
    fn test_batch_zscore_degenerate_chunk_is_zero() {
        let mut stage = Stage::new(
            StageSpec::z_score_normalize(WindowedSpec::batch()),
            0,
        )
        .unwrap();
        stage.ensure_channels(1).unwrap();

        let mut samples = vec![5.0, 5.0, 5.0];
        let timestamps = vec![0.0, 1.0, 2.0];
        stage.process_chunk(&mut samples, &timestamps, 1).unwrap();
        assert_eq!(samples, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_record_round_trip() {
        let spec = StageSpec::Rms(WindowedSpec::moving_samples(3));
        let mut stage = Stage::new(spec.clone(), 0).unwrap();
        stage.ensure_channels(1).unwrap();

        let mut samples = vec![1.0, -2.0, 3.0];
        let timestamps = vec![0.0, 1.0, 2.0];
        stage.process_chunk(&mut samples, &timestamps, 1).unwrap();

        let record = stage.to_record(0);
        assert_eq!(record.type_tag, "rms");
        assert_eq!(record.state.num_channels, 1);
        assert_eq!(record.state.channels[0].buffer, vec![1.0, -2.0, 3.0]);
        assert_eq!(record.state.channels[0].running_sum_of_squares, Some(14.0));

        let mut resumed = Stage::new(spec, 0).unwrap();
        let state = resumed.build_state_from_record(&record).unwrap();
        resumed.adopt_state(state);

        let mut a = vec![-4.0];
        let mut b = vec![-4.0];
        stage.process_chunk(&mut a, &[3.0], 1).unwrap();
        resumed.process_chunk(&mut b, &[3.0], 1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_record_compat_rejects_other_kind() {
        let mut rms = Stage::new(StageSpec::Rms(WindowedSpec::moving_samples(3)), 0).unwrap();
        rms.ensure_channels(1).unwrap();
        let record = rms.to_record(0);

        let mean = Stage::new(StageSpec::MovingAverage(WindowedSpec::moving_samples(3)), 0).unwrap();
        assert!(matches!(
            mean.build_state_from_record(&record),
            Err(PfError::StateCompat(_))
        ));
    }

    #[test]
    fn test_record_compat_rejects_parameter_change() {
        let mut narrow = Stage::new(StageSpec::Rms(WindowedSpec::moving_samples(3)), 0).unwrap();
        narrow.ensure_channels(1).unwrap();
        let record = narrow.to_record(0);

        let wide = Stage::new(StageSpec::Rms(WindowedSpec::moving_samples(4)), 0).unwrap();
        assert!(matches!(
            wide.build_state_from_record(&record),
            Err(PfError::StateCompat(_))
        ));
    }

    #[test]
    fn test_missing_accumulator_is_codec_error() {
        let mut stage = Stage::new(StageSpec::Rms(WindowedSpec::moving_samples(3)), 0).unwrap();
        stage.ensure_channels(1).unwrap();
        let mut record = stage.to_record(0);
        record.state.channels[0].running_sum_of_squares = None;

        assert!(matches!(
            stage.build_state_from_record(&record),
            Err(PfError::Codec(_))
        ));
    }

    #[test]
    fn test_filter_stage_state_round_trip() {
        let spec = StageSpec::Filter(FilterSpec {
            feed_forward: vec![0.5, 0.5],
            feed_back: vec![-0.25],
        });
        let mut stage = Stage::new(spec.clone(), 0).unwrap();
        stage.ensure_channels(1).unwrap();

        let mut warmup = vec![1.0, -1.0, 2.0];
        stage.process_chunk(&mut warmup, &[0.0, 1.0, 2.0], 1).unwrap();

        let record = stage.to_record(0);
        assert_eq!(record.state.feed_forward, Some(vec![0.5, 0.5]));

        let mut resumed = Stage::new(spec, 0).unwrap();
        let state = resumed.build_state_from_record(&record).unwrap();
        resumed.adopt_state(state);

        let mut a = vec![3.0, -3.0];
        let mut b = vec![3.0, -3.0];
        stage.process_chunk(&mut a, &[3.0, 4.0], 1).unwrap();
        resumed.process_chunk(&mut b, &[3.0, 4.0], 1).unwrap();
        assert_eq!(a, b);
    }
}
