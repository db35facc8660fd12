//! Pluggable fundamental-frequency detectors

mod amdf;
mod autocorrelation;
mod cepstrum;
mod mcleod;
mod wavelet;
mod yin;

pub use amdf::AmdfDetector;
pub use autocorrelation::AutocorrelationDetector;
pub use cepstrum::CepstrumDetector;
pub use mcleod::McLeodDetector;
pub use wavelet::WaveletDetector;
pub use yin::YinDetector;

use rustfft::FftPlanner;
use serde::Serialize;

use crate::audio::AudioFrame;
use crate::config::TuningConfig;
use crate::dsp::{self, parabolic_peak};
use crate::error::{ConfigError, FrameDegeneracy};

/// Candidates within this ratio of the best correlation count as the same
/// period class; the shortest of them wins
pub(crate) const OCTAVE_RATIO: f64 = 0.9;

/// A pick is a sub-octave when the correlation at half its period reaches
/// this fraction of the correlation at the period itself
const HALF_PERIOD_RATIO: f64 = 0.9;

/// Pitch of one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Pitch {
    Voiced(f64),
    Unvoiced,
}

/// Result of a pitch detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub pitch: Pitch,
    /// In [0, 1]; 0 whenever the frame is unvoiced
    pub confidence: f64,
    /// Detector that produced the estimate
    pub algorithm: PitchAlgorithm,
    /// Why the frame is unvoiced, when it is
    pub degeneracy: Option<FrameDegeneracy>,
}

impl PitchEstimate {
    pub fn voiced(algorithm: PitchAlgorithm, frequency: f64, confidence: f64) -> Self {
        Self {
            pitch: Pitch::Voiced(frequency),
            confidence: confidence.clamp(0.0, 1.0),
            algorithm,
            degeneracy: None,
        }
    }

    pub fn unvoiced(algorithm: PitchAlgorithm, reason: FrameDegeneracy) -> Self {
        Self {
            pitch: Pitch::Unvoiced,
            confidence: 0.0,
            algorithm,
            degeneracy: Some(reason),
        }
    }

    pub fn frequency(&self) -> Option<f64> {
        match self.pitch {
            Pitch::Voiced(hz) => Some(hz),
            Pitch::Unvoiced => None,
        }
    }

    pub fn is_voiced(&self) -> bool {
        matches!(self.pitch, Pitch::Voiced(_))
    }
}

/// Pitch strategies, in the order exposed to collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PitchAlgorithm {
    /// Normalized square difference function with key-maximum picking
    #[default]
    McLeod,
    /// Cumulative mean normalized difference
    Yin,
    /// Average magnitude difference function
    Amdf,
    /// Peak of the real cepstrum
    Cepstrum,
    /// Normalized autocorrelation peak
    Autocorrelation,
    /// Extremum spacing across Haar approximation levels
    Wavelet,
}

impl PitchAlgorithm {
    pub const ALL: [PitchAlgorithm; 6] = [
        PitchAlgorithm::McLeod,
        PitchAlgorithm::Yin,
        PitchAlgorithm::Amdf,
        PitchAlgorithm::Cepstrum,
        PitchAlgorithm::Autocorrelation,
        PitchAlgorithm::Wavelet,
    ];

    pub fn from_id(id: usize) -> Result<Self, ConfigError> {
        Self::ALL
            .get(id)
            .copied()
            .ok_or(ConfigError::AlgorithmIdOutOfRange {
                kind: "pitch",
                id,
                count: Self::ALL.len(),
            })
    }

    pub fn id(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchAlgorithm::McLeod => "McLeod",
            PitchAlgorithm::Yin => "YIN",
            PitchAlgorithm::Amdf => "AMDF",
            PitchAlgorithm::Cepstrum => "Cepstrum",
            PitchAlgorithm::Autocorrelation => "Autocorrelation",
            PitchAlgorithm::Wavelet => "Wavelet",
        }
    }

    /// Build the detector for frames of `frame_len` samples
    pub fn detector(
        self,
        settings: PitchSettings,
        planner: &mut FftPlanner<f32>,
        frame_len: usize,
    ) -> Box<dyn PitchDetector> {
        match self {
            PitchAlgorithm::McLeod => Box::new(McLeodDetector::new(settings)),
            PitchAlgorithm::Yin => Box::new(YinDetector::new(settings)),
            PitchAlgorithm::Amdf => Box::new(AmdfDetector::new(settings)),
            PitchAlgorithm::Cepstrum => {
                Box::new(CepstrumDetector::new(settings, planner, frame_len))
            }
            PitchAlgorithm::Autocorrelation => Box::new(AutocorrelationDetector::new(settings)),
            PitchAlgorithm::Wavelet => Box::new(WaveletDetector::new(settings)),
        }
    }
}

impl std::fmt::Display for PitchAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-frame pitch detection
pub trait PitchDetector: Send + Sync {
    fn algorithm(&self) -> PitchAlgorithm;

    fn detect(&self, frame: &AudioFrame) -> PitchEstimate;
}

/// Parameters shared by every detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSettings {
    pub min_hz: f64,
    pub max_hz: f64,
    pub silence_rms: f64,
    pub yin_threshold: f64,
    pub mpm_cutoff: f64,
    pub voicing_threshold: f64,
    pub cepstrum_candidate_ratio: f64,
}

impl PitchSettings {
    pub fn from_tuning(tuning: &TuningConfig) -> Self {
        Self {
            min_hz: tuning.pitch_min_hz,
            max_hz: tuning.pitch_max_hz,
            silence_rms: tuning.silence_rms as f64,
            yin_threshold: tuning.yin_threshold,
            mpm_cutoff: tuning.mpm_cutoff,
            voicing_threshold: tuning.voicing_threshold,
            cepstrum_candidate_ratio: tuning.cepstrum_candidate_ratio,
        }
    }

    /// Period search range in samples, `(min_lag, max_lag)` inclusive.
    ///
    /// The longest period is limited to half the frame so that every lag is
    /// compared over at least as many samples as it spans.
    pub fn lag_range(&self, sample_rate: u32, frame_len: usize) -> Option<(usize, usize)> {
        let sr = sample_rate as f64;
        let min_lag = ((sr / self.max_hz).floor() as usize).max(2);
        let max_lag = ((sr / self.min_hz).ceil() as usize).min(frame_len / 2);
        (min_lag < max_lag).then_some((min_lag, max_lag))
    }
}

impl Default for PitchSettings {
    fn default() -> Self {
        Self::from_tuning(&TuningConfig::default())
    }
}

/// Mean-removed frame and lag range, or the reason the frame cannot be voiced
pub(crate) fn prepare(
    frame: &AudioFrame,
    settings: &PitchSettings,
) -> Result<(Vec<f64>, usize, usize), FrameDegeneracy> {
    let x = dsp::remove_mean(&frame.samples);
    if dsp::rms(&x) < settings.silence_rms {
        return Err(FrameDegeneracy::Silent);
    }
    let (min_lag, max_lag) = settings
        .lag_range(frame.sample_rate, x.len())
        .ok_or(FrameDegeneracy::TooShort)?;
    Ok((x, min_lag, max_lag))
}

/// Correlation coefficient between `x[..n-τ]` and `x[τ..]`
pub(crate) fn correlation(x: &[f64], tau: usize) -> f64 {
    if tau >= x.len() {
        return 0.0;
    }
    let head = &x[..x.len() - tau];
    let tail = &x[tau..];
    let (mut cross, mut e_head, mut e_tail) = (0.0, 0.0, 0.0);
    for (a, b) in head.iter().zip(tail) {
        cross += a * b;
        e_head += a * a;
        e_tail += b * b;
    }
    let norm = (e_head * e_tail).sqrt();
    if norm > 1e-12 {
        cross / norm
    } else {
        0.0
    }
}

/// Correlation at a fractional lag, taken as the better of its two
/// neighbouring integer lags
fn correlation_near(x: &[f64], lag: f64) -> f64 {
    let below = lag.floor().max(0.0) as usize;
    correlation(x, below).max(correlation(x, below + 1))
}

/// Local maximum of the normalized autocorrelation within `reach` lags of
/// `around`, clipped to `[min_lag, max_lag]` and refined by parabolic
/// interpolation. Returns `(period, correlation)`.
///
/// `None` when the correlation still rises at the edge of the window, i.e.
/// the peak lies outside it.
pub(crate) fn refine_period(
    x: &[f64],
    around: usize,
    reach: usize,
    min_lag: usize,
    max_lag: usize,
) -> Option<(f64, f64)> {
    let lo = around.saturating_sub(reach).max(min_lag).max(1);
    let hi = (around + reach).min(max_lag);
    if lo > hi {
        return None;
    }

    // One lag of margin on each side for the peak test
    let curve: Vec<f64> = (lo - 1..=hi + 1).map(|t| correlation(x, t)).collect();
    let (best, _) = curve[1..curve.len() - 1]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    let i = best + 1;
    if curve[i] < curve[i - 1] || curve[i] < curve[i + 1] {
        return None;
    }

    let (position, value) = parabolic_peak(&curve, i);
    Some((position + (lo - 1) as f64, value))
}

/// Whether `period` is a multiple of a shorter period the search range
/// excluded: half of it correlates about as well as the whole.
pub(crate) fn is_sub_octave(x: &[f64], period: f64) -> bool {
    let half = period / 2.0;
    if half < 1.0 {
        return false;
    }
    let whole = correlation_near(x, period);
    whole > 0.0 && correlation_near(x, half) >= HALF_PERIOD_RATIO * whole
}

/// Voiced estimate for `period` samples, unless the pick is a sub-octave
pub(crate) fn voiced_or_sub_octave(
    algorithm: PitchAlgorithm,
    x: &[f64],
    sample_rate: u32,
    period: f64,
    confidence: f64,
) -> PitchEstimate {
    if period <= 0.0 || is_sub_octave(x, period) {
        return PitchEstimate::unvoiced(algorithm, FrameDegeneracy::NoPeriodicity);
    }
    PitchEstimate::voiced(algorithm, sample_rate as f64 / period, confidence)
}


#[cfg(test)]
mod tests {
    use super::test_signals::*;
    use super::*;
    use std::time::Duration;

    fn detectors(frame_len: usize) -> Vec<Box<dyn PitchDetector>> {
        let mut planner = FftPlanner::new();
        PitchAlgorithm::ALL
            .iter()
            .map(|alg| alg.detector(PitchSettings::default(), &mut planner, frame_len))
            .collect()
    }

    #[test]
    fn test_registry_order() {
        let names: Vec<&str> = PitchAlgorithm::ALL.iter().map(|a| a.name()).collect();
        assert_eq!(
            names,
            vec!["McLeod", "YIN", "AMDF", "Cepstrum", "Autocorrelation", "Wavelet"]
        );
        assert_eq!(PitchAlgorithm::default(), PitchAlgorithm::McLeod);
        assert_eq!(PitchAlgorithm::from_id(3), Ok(PitchAlgorithm::Cepstrum));
        assert_eq!(PitchAlgorithm::from_id(5), Ok(PitchAlgorithm::Wavelet));
        assert!(PitchAlgorithm::from_id(6).is_err());
        for (id, algorithm) in PitchAlgorithm::ALL.iter().enumerate() {
            assert_eq!(algorithm.id(), id);
        }
    }

    #[test]
    fn test_lag_range() {
        let settings = PitchSettings::default();
        // 60-500 Hz at 16 kHz over a 35 ms frame
        assert_eq!(settings.lag_range(16000, 560), Some((32, 267)));
        // 25 ms frame limits the longest period
        assert_eq!(settings.lag_range(16000, 400), Some((32, 200)));
        assert_eq!(settings.lag_range(16000, 40), None);
    }

    /// f0 from just above `pitch_min_hz` to just below `pitch_max_hz`
    fn sweep(settings: &PitchSettings) -> Vec<f64> {
        let mut f0 = settings.min_hz * 1.05;
        let mut out = Vec::new();
        while f0 < settings.max_hz * 0.97 {
            out.push(f0);
            f0 *= 1.07;
        }
        out
    }

    #[test]
    fn test_every_detector_tracks_the_search_range() {
        let settings = PitchSettings::default();
        for sample_rate in [16000u32, 44100, 48000] {
            // 35 ms frames
            let len = sample_rate as usize * 35 / 1000;
            let detectors = detectors(len);
            for f0 in sweep(&settings) {
                let frame = harmonic_frame(f0, sample_rate, len);
                for detector in &detectors {
                    let estimate = detector.detect(&frame);
                    assert_eq!(estimate.algorithm, detector.algorithm());
                    let hz = estimate.frequency().unwrap_or_else(|| {
                        panic!(
                            "{} found no pitch at {:.1} Hz ({} Hz): {:?}",
                            detector.algorithm(),
                            f0,
                            sample_rate,
                            estimate.degeneracy
                        )
                    });
                    assert!(
                        (hz - f0).abs() < f0 * 0.03,
                        "{} estimated {:.1} Hz for {:.1} Hz at {} Hz",
                        detector.algorithm(),
                        hz,
                        f0,
                        sample_rate
                    );
                    assert!(estimate.confidence > 0.0 && estimate.confidence <= 1.0);
                }
            }
        }
    }

    #[test]
    fn test_pitch_above_range_is_not_halved() {
        let settings = PitchSettings::default();
        let f0 = settings.max_hz * 1.01;
        for sample_rate in [44100u32, 48000] {
            let len = sample_rate as usize * 35 / 1000;
            let frame = harmonic_frame(f0, sample_rate, len);
            for detector in detectors(len) {
                let estimate = detector.detect(&frame);
                if let Some(hz) = estimate.frequency() {
                    assert!(
                        (hz - f0).abs() < f0 * 0.05,
                        "{} reported {:.1} Hz for {:.1} Hz at {} Hz",
                        detector.algorithm(),
                        hz,
                        f0,
                        sample_rate
                    );
                } else {
                    assert_eq!(estimate.degeneracy, Some(FrameDegeneracy::NoPeriodicity));
                    assert_eq!(estimate.confidence, 0.0);
                }
            }
        }
    }

    #[test]
    fn test_sub_octave_check() {
        // Period of 200 Hz at 16 kHz is 80 samples
        let frame = harmonic_frame(200.0, 16000, 640);
        let x = dsp::remove_mean(&frame.samples);
        assert!(!is_sub_octave(&x, 80.0));
        assert!(is_sub_octave(&x, 160.0));
    }

    #[test]
    fn test_refine_period() {
        let frame = harmonic_frame(200.0, 16000, 640);
        let x = dsp::remove_mean(&frame.samples);

        let (period, value) = refine_period(&x, 78, 4, 32, 267).unwrap();
        assert!((period - 80.0).abs() < 0.5, "refined to {}", period);
        assert!(value > 0.9);

        // Peak below the search range
        assert_eq!(refine_period(&x, 82, 4, 82, 267), None);
        // Window clipped away entirely
        assert_eq!(refine_period(&x, 20, 4, 32, 267), None);
    }

    #[test]
    fn test_zero_frame_is_unvoiced() {
        let frame = AudioFrame::new(0, Duration::ZERO, 16000, vec![0.0; 560]);
        for detector in detectors(560) {
            let estimate = detector.detect(&frame);
            assert_eq!(estimate.pitch, Pitch::Unvoiced);
            assert_eq!(estimate.confidence, 0.0);
            assert_eq!(estimate.degeneracy, Some(FrameDegeneracy::Silent));
        }
    }

    #[test]
    fn test_short_frame_is_unvoiced() {
        let frame = harmonic_frame(200.0, 16000, 48);
        for detector in detectors(48) {
            let estimate = detector.detect(&frame);
            assert!(!estimate.is_voiced());
            assert_eq!(estimate.degeneracy, Some(FrameDegeneracy::TooShort));
        }
    }

    #[test]
    fn test_noise_is_mostly_unvoiced() {
        let frame = noise_frame(16000, 640);
        let voiced = detectors(640)
            .iter()
            .filter(|d| d.detect(&frame).is_voiced())
            .count();
        // White noise has no period; allow one detector to be fooled
        assert!(voiced <= 1, "{} detectors voiced white noise", voiced);
    }
}
