//! Normalized autocorrelation peak picking

use super::{
    correlation, prepare, voiced_or_sub_octave, PitchAlgorithm, PitchDetector, PitchEstimate,
    PitchSettings, OCTAVE_RATIO,
};
use crate::audio::AudioFrame;
use crate::dsp::parabolic_peak;
use crate::error::FrameDegeneracy;

pub struct AutocorrelationDetector {
    settings: PitchSettings,
}

impl AutocorrelationDetector {
    pub fn new(settings: PitchSettings) -> Self {
        Self { settings }
    }
}

impl PitchDetector for AutocorrelationDetector {
    fn algorithm(&self) -> PitchAlgorithm {
        PitchAlgorithm::Autocorrelation
    }

    fn detect(&self, frame: &AudioFrame) -> PitchEstimate {
        let alg = self.algorithm();
        let (x, min_lag, max_lag) = match prepare(frame, &self.settings) {
            Ok(prepared) => prepared,
            Err(reason) => return PitchEstimate::unvoiced(alg, reason),
        };

        // Indexed by lag; one lag of margin on each side for peak tests
        let lo = min_lag - 1;
        let hi = max_lag + 1;
        let mut curve = vec![0.0; hi + 1];
        for (tau, value) in curve.iter_mut().enumerate().skip(lo) {
            *value = correlation(&x, tau);
        }

        let peaks: Vec<usize> = (min_lag..=max_lag)
            .filter(|&t| curve[t] > curve[t - 1] && curve[t] >= curve[t + 1])
            .collect();
        let best = peaks
            .iter()
            .map(|&t| curve[t])
            .fold(f64::NEG_INFINITY, f64::max);
        if best < self.settings.voicing_threshold {
            return PitchEstimate::unvoiced(alg, FrameDegeneracy::NoPeriodicity);
        }

        match peaks.into_iter().find(|&t| curve[t] >= OCTAVE_RATIO * best) {
            Some(tau) => {
                let (period, value) = parabolic_peak(&curve, tau);
                voiced_or_sub_octave(alg, &x, frame.sample_rate, period, value)
            }
            None => PitchEstimate::unvoiced(alg, FrameDegeneracy::NoPeriodicity),
        }
    }
}
