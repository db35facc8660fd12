//! Formant estimation from an all-pole model of the frame

use rustfft::FftPlanner;
use serde::Serialize;
use std::f64::consts::PI;
use tracing::trace;

use crate::audio::AudioFrame;
use crate::config::{AnalysisConfig, TuningConfig};
use crate::dsp::lpc::{self, LpcMethod};
use crate::dsp::{self, polynomial, window, FftResampler};
use crate::error::{ConfigError, FrameDegeneracy};

/// Distance kept from the Nyquist frequency when accepting roots (Hz)
const NYQUIST_MARGIN_HZ: f64 = 50.0;

/// One vocal-tract resonance
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Formant {
    /// Centre frequency (Hz)
    pub frequency: f64,
    /// 3 dB bandwidth (Hz)
    pub bandwidth: f64,
}

/// Formants of one frame, ascending by frequency
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormantEstimate {
    pub formants: Vec<Formant>,
    /// Why the estimate is empty, when it is
    pub degeneracy: Option<FrameDegeneracy>,
}

impl FormantEstimate {
    pub fn degenerate(reason: FrameDegeneracy) -> Self {
        Self {
            formants: Vec::new(),
            degeneracy: Some(reason),
        }
    }

    pub fn frequencies(&self) -> Vec<f64> {
        self.formants.iter().map(|f| f.frequency).collect()
    }

    pub fn len(&self) -> usize {
        self.formants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formants.is_empty()
    }
}

/// Formant strategies, in the order exposed to collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum FormantAlgorithm {
    /// Raw per-frame linear prediction
    #[default]
    LinearPrediction,
    /// Linear prediction smoothed by a Kalman tracker
    Kalman,
}

impl FormantAlgorithm {
    pub const ALL: [FormantAlgorithm; 2] =
        [FormantAlgorithm::LinearPrediction, FormantAlgorithm::Kalman];

    pub fn from_id(id: usize) -> Result<Self, ConfigError> {
        Self::ALL
            .get(id)
            .copied()
            .ok_or(ConfigError::AlgorithmIdOutOfRange {
                kind: "formant",
                id,
                count: Self::ALL.len(),
            })
    }

    pub fn id(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            FormantAlgorithm::LinearPrediction => "Linear prediction",
            FormantAlgorithm::Kalman => "Kalman filter",
        }
    }

    /// Whether estimates pass through the sequential tracker
    pub fn is_tracked(self) -> bool {
        matches!(self, FormantAlgorithm::Kalman)
    }
}

impl std::fmt::Display for FormantAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-frame formant estimation
pub trait FormantEstimator: Send + Sync {
    fn estimate(&self, frame: &AudioFrame) -> FormantEstimate;
}

/// Tuning knobs of the LP estimator
#[derive(Debug, Clone, PartialEq)]
pub struct LpcSettings {
    pub method: LpcMethod,
    pub lp_order: usize,
    pub max_freq: f64,
    pub silence_rms: f64,
    pub pre_emphasis_hz: f64,
    pub min_freq: f64,
    pub max_bandwidth: f64,
}

impl LpcSettings {
    pub fn new(config: &AnalysisConfig, tuning: &TuningConfig) -> Self {
        Self {
            method: tuning.lpc_method,
            lp_order: config.lp_order,
            max_freq: config.max_freq as f64,
            silence_rms: tuning.silence_rms as f64,
            pre_emphasis_hz: tuning.pre_emphasis_hz,
            min_freq: tuning.formant_min_hz,
            max_bandwidth: tuning.formant_bandwidth_max_hz,
        }
    }
}

/// Linear prediction formant estimator for frames of one known length.
///
/// Frames captured above `2·max_freq` are first resampled to that rate, so
/// the model spends its poles on the band of interest.
pub struct LpcFormantEstimator {
    settings: LpcSettings,
    resampler: Option<FftResampler>,
    analysis_rate: f64,
    window: Vec<f64>,
}

impl LpcFormantEstimator {
    pub fn new(
        planner: &mut FftPlanner<f32>,
        settings: LpcSettings,
        sample_rate: u32,
        frame_len: usize,
    ) -> Self {
        let target_rate = 2.0 * settings.max_freq;
        let (resampler, analysis_rate, analysed_len) =
            if (sample_rate as f64) > target_rate && frame_len > 0 {
                let out_len = ((frame_len as f64 * target_rate / sample_rate as f64).round()
                    as usize)
                    .max(1);
                // Effective rate after rounding the block length
                let rate = out_len as f64 * sample_rate as f64 / frame_len as f64;
                (
                    Some(FftResampler::new(planner, frame_len, out_len)),
                    rate,
                    out_len,
                )
            } else {
                (None, sample_rate as f64, frame_len)
            };

        Self {
            settings,
            resampler,
            analysis_rate,
            window: window::hamming(analysed_len),
        }
    }

    /// Sample rate the LP model is fitted at
    pub fn analysis_rate(&self) -> f64 {
        self.analysis_rate
    }

    /// Map all-pole coefficients to formants
    fn formants_from_model(&self, model: &lpc::LpcModel, fs: f64) -> Vec<Formant> {
        let s = &self.settings;
        let nyquist_limit = fs / 2.0 - NYQUIST_MARGIN_HZ;

        let mut formants: Vec<Formant> = polynomial::roots(&model.coefficients)
            .into_iter()
            .filter(|z| z.im > 0.0)
            .filter_map(|z| {
                let r = z.norm();
                if r >= 1.0 || r <= 0.0 {
                    return None;
                }
                let frequency = z.arg() * fs / (2.0 * PI);
                let bandwidth = -r.ln() * fs / PI;
                let accepted = frequency > s.min_freq
                    && frequency <= s.max_freq
                    && frequency < nyquist_limit
                    && bandwidth < s.max_bandwidth;
                accepted.then_some(Formant {
                    frequency,
                    bandwidth,
                })
            })
            .collect();

        formants.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
        formants.truncate(s.lp_order / 2);
        formants
    }
}

impl FormantEstimator for LpcFormantEstimator {
    fn estimate(&self, frame: &AudioFrame) -> FormantEstimate {
        let s = &self.settings;
        if frame.len() <= s.lp_order {
            return FormantEstimate::degenerate(FrameDegeneracy::TooShort);
        }

        let centred = dsp::remove_mean(&frame.samples);
        if dsp::rms(&centred) < s.silence_rms {
            return FormantEstimate::degenerate(FrameDegeneracy::Silent);
        }

        let mut x = match &self.resampler {
            Some(resampler) => dsp::remove_mean(&resampler.process(&frame.samples)),
            None => centred,
        };
        if x.len() <= s.lp_order {
            return FormantEstimate::degenerate(FrameDegeneracy::TooShort);
        }

        let fs = self.analysis_rate;
        if s.pre_emphasis_hz > 0.0 {
            lpc::pre_emphasis(&mut x, lpc::pre_emphasis_coefficient(s.pre_emphasis_hz, fs));
        }

        let fresh;
        let window = if x.len() == self.window.len() {
            &self.window
        } else {
            fresh = window::hamming(x.len());
            &fresh
        };
        for (v, w) in x.iter_mut().zip(window.iter()) {
            *v *= *w;
        }

        let model = match s.method.fit(&x, s.lp_order) {
            Ok(model) => model,
            Err(reason) => {
                trace!("Frame {}: LP model rejected ({})", frame.sequence, reason);
                return FormantEstimate::degenerate(reason);
            }
        };

        FormantEstimate {
            formants: self.formants_from_model(&model, fs),
            degeneracy: None,
        }
    }
}
