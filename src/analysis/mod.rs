//! Per-frame analysis stages: spectrum, formants and pitch

pub mod formant;
pub mod pitch;
pub mod spectrum;
pub mod tracking;

pub use formant::{
    Formant, FormantAlgorithm, FormantEstimate, FormantEstimator, LpcFormantEstimator,
    LpcSettings,
};
pub use pitch::{Pitch, PitchAlgorithm, PitchDetector, PitchEstimate, PitchSettings};
pub use spectrum::{SpectralAnalyzer, SpectralSlice};
pub use tracking::FormantTracker;

use rustfft::FftPlanner;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::audio::{AudioFrame, FrameGeometry};
use crate::config::{AnalysisConfig, TuningConfig};

/// Everything computed for one frame
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Session that produced the frame
    pub session: u64,
    /// Frame sequence number within the session
    pub sequence: u64,
    /// Frame start relative to the session start
    pub timestamp: Duration,
    /// Version of the configuration the frame was analysed under
    pub config_version: u64,
    pub spectrum: SpectralSlice,
    pub formants: FormantEstimate,
    pub pitch: PitchEstimate,
}

/// The three analyzers built from one configuration snapshot.
///
/// Stages are immutable once built and shared by the worker threads; a new
/// configuration produces a new `FrameStages` rather than mutating this one.
pub struct FrameStages {
    config_version: u64,
    config: Arc<AnalysisConfig>,
    spectral: SpectralAnalyzer,
    formants: LpcFormantEstimator,
    pitch: Box<dyn PitchDetector>,
}

impl FrameStages {
    pub fn build(
        config: Arc<AnalysisConfig>,
        config_version: u64,
        tuning: &TuningConfig,
        sample_rate: u32,
    ) -> Self {
        let frame_len = FrameGeometry::from_config(&config).length_samples(sample_rate);
        let mut planner = FftPlanner::new();

        let spectral =
            SpectralAnalyzer::new(&mut planner, config.fft_size, frame_len, tuning.spectrum_phase);
        let formants = LpcFormantEstimator::new(
            &mut planner,
            LpcSettings::new(&config, tuning),
            sample_rate,
            frame_len,
        );
        let pitch = config.pitch_algorithm().detector(
            PitchSettings::from_tuning(tuning),
            &mut planner,
            frame_len,
        );

        debug!(
            "Built stages for config v{}: fft={}, lp_order={}, pitch={}, formants={} @ {:.0} Hz",
            config_version,
            config.fft_size,
            config.lp_order,
            pitch.algorithm(),
            config.formant_algorithm(),
            formants.analysis_rate()
        );

        Self {
            config_version,
            config,
            spectral,
            formants,
            pitch,
        }
    }

    pub fn config_version(&self) -> u64 {
        self.config_version
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn spectrum(&self, frame: &AudioFrame) -> SpectralSlice {
        self.spectral.analyze(frame)
    }

    pub fn formants(&self, frame: &AudioFrame) -> FormantEstimate {
        self.formants.estimate(frame)
    }

    pub fn pitch(&self, frame: &AudioFrame) -> PitchEstimate {
        self.pitch.detect(frame)
    }

    /// Run all three stages on the calling thread
    pub fn analyze(&self, session: u64, frame: &AudioFrame) -> AnalysisResult {
        AnalysisResult {
            session,
            sequence: frame.sequence,
            timestamp: frame.timestamp,
            config_version: self.config_version,
            spectrum: self.spectrum(frame),
            formants: self.formants(frame),
            pitch: self.pitch(frame),
        }
    }
}
