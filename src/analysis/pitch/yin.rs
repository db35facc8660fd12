//! YIN: cumulative mean normalized difference

use super::{
    prepare, voiced_or_sub_octave, PitchAlgorithm, PitchDetector, PitchEstimate, PitchSettings,
};
use crate::audio::AudioFrame;
use crate::dsp::parabolic_peak;
use crate::error::FrameDegeneracy;

pub struct YinDetector {
    settings: PitchSettings,
}

impl YinDetector {
    pub fn new(settings: PitchSettings) -> Self {
        Self { settings }
    }
}

/// CMND for lags `0..=max_lag` over a window of `x.len() - max_lag` samples
fn cmnd(x: &[f64], max_lag: usize) -> Vec<f64> {
    let window = x.len() - max_lag;
    let mut out = vec![1.0; max_lag + 1];
    let mut running = 0.0;
    for tau in 1..=max_lag {
        let d: f64 = (0..window)
            .map(|j| {
                let diff = x[j] - x[j + tau];
                diff * diff
            })
            .sum();
        running += d;
        out[tau] = if running > 0.0 {
            d * tau as f64 / running
        } else {
            1.0
        };
    }
    out
}

impl PitchDetector for YinDetector {
    fn algorithm(&self) -> PitchAlgorithm {
        PitchAlgorithm::Yin
    }

    fn detect(&self, frame: &AudioFrame) -> PitchEstimate {
        let alg = self.algorithm();
        let (x, min_lag, max_lag) = match prepare(frame, &self.settings) {
            Ok(prepared) => prepared,
            Err(reason) => return PitchEstimate::unvoiced(alg, reason),
        };

        let curve = cmnd(&x, max_lag);
        let threshold = self.settings.yin_threshold;

        let mut tau = match (min_lag..=max_lag).find(|&t| curve[t] < threshold) {
            Some(t) => t,
            None => return PitchEstimate::unvoiced(alg, FrameDegeneracy::NoPeriodicity),
        };
        while tau < max_lag && curve[tau + 1] < curve[tau] {
            tau += 1;
        }

        let negated: Vec<f64> = curve.iter().map(|v| -v).collect();
        let (period, _) = parabolic_peak(&negated, tau);
        voiced_or_sub_octave(alg, &x, frame.sample_rate, period, 1.0 - curve[tau])
    }
}
