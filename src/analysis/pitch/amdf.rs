//! Average magnitude difference function

use super::{
    prepare, voiced_or_sub_octave, PitchAlgorithm, PitchDetector, PitchEstimate, PitchSettings,
};
use crate::audio::AudioFrame;
use crate::dsp::parabolic_peak;
use crate::error::FrameDegeneracy;

/// Valleys within this fraction of the range above the deepest one are
/// period candidates
const VALLEY_TOLERANCE: f64 = 0.1;

pub struct AmdfDetector {
    settings: PitchSettings,
}

impl AmdfDetector {
    pub fn new(settings: PitchSettings) -> Self {
        Self { settings }
    }
}

/// AMDF for lags `0..=max_lag` over a window of `x.len() - max_lag` samples
fn amdf(x: &[f64], max_lag: usize) -> Vec<f64> {
    let window = x.len() - max_lag;
    (0..=max_lag)
        .map(|tau| {
            (0..window).map(|j| (x[j] - x[j + tau]).abs()).sum::<f64>() / window as f64
        })
        .collect()
}

impl PitchDetector for AmdfDetector {
    fn algorithm(&self) -> PitchAlgorithm {
        PitchAlgorithm::Amdf
    }

    fn detect(&self, frame: &AudioFrame) -> PitchEstimate {
        let alg = self.algorithm();
        let (x, min_lag, max_lag) = match prepare(frame, &self.settings) {
            Ok(prepared) => prepared,
            Err(reason) => return PitchEstimate::unvoiced(alg, reason),
        };

        let curve = amdf(&x, max_lag);
        let range = &curve[min_lag..=max_lag];
        let d_max = range.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let d_min = range.iter().copied().fold(f64::INFINITY, f64::min);
        if d_max <= 0.0 {
            return PitchEstimate::unvoiced(alg, FrameDegeneracy::NoPeriodicity);
        }

        let periodicity = 1.0 - d_min / d_max;
        if periodicity < self.settings.voicing_threshold {
            return PitchEstimate::unvoiced(alg, FrameDegeneracy::NoPeriodicity);
        }

        let limit = d_min + VALLEY_TOLERANCE * (d_max - d_min);
        let tau = (min_lag.max(1)..max_lag)
            .find(|&t| curve[t] <= limit && curve[t] <= curve[t - 1] && curve[t] <= curve[t + 1])
            .or_else(|| (min_lag..=max_lag).find(|&t| curve[t] == d_min));
        let tau = match tau {
            Some(t) => t,
            None => return PitchEstimate::unvoiced(alg, FrameDegeneracy::NoPeriodicity),
        };

        let negated: Vec<f64> = curve.iter().map(|v| -v).collect();
        let (period, _) = parabolic_peak(&negated, tau);
        voiced_or_sub_octave(alg, &x, frame.sample_rate, period, periodicity)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_signals::*;
    use super::*;

    #[test]
    fn test_amdf_zero_at_period() {
        let frame = harmonic_frame(160.0, 8000, 400);
        let x: Vec<f64> = frame.samples.iter().map(|&s| s as f64).collect();
        let curve = amdf(&x, 120);
        assert_eq!(curve[0], 0.0);
        assert!(curve[50] < 1e-6);
        assert!(curve[25] > 0.1);
    }

    #[test]
    fn test_picks_fundamental_not_multiple() {
        let detector = AmdfDetector::new(PitchSettings::default());
        // Periods at 80 and 160 samples both fit in the search range
        let frame = harmonic_frame(200.0, 16000, 640);
        assert_pitch_close(detector.detect(&frame).frequency().unwrap(), 200.0);
    }

    #[test]
    fn test_rejects_sub_octave_above_range() {
        let detector = AmdfDetector::new(PitchSettings::default());
        let estimate = detector.detect(&harmonic_frame(505.0, 48000, 1680));
        if let Some(hz) = estimate.frequency() {
            assert!((hz - 505.0).abs() < 25.0, "reported {:.1} Hz", hz);
        }
    }
}
