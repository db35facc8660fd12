//! Real cepstrum peak picking, verified in the time domain.
//!
//! The height of a cepstral peak depends on how many resolved harmonics the
//! frame holds, so low voices in short frames give weak peaks. Peaks only
//! nominate candidate periods here; the normalized autocorrelation at each
//! candidate decides voicing and refines the period.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use super::{
    prepare, refine_period, voiced_or_sub_octave, PitchAlgorithm, PitchDetector, PitchEstimate,
    PitchSettings, OCTAVE_RATIO,
};
use crate::audio::AudioFrame;
use crate::dsp::window;
use crate::error::FrameDegeneracy;

/// Magnitudes are floored this far below the spectral peak before the log
const DYNAMIC_RANGE: f32 = 1e-3;

/// Strongest cepstral peaks examined per frame
const MAX_CANDIDATES: usize = 12;

pub struct CepstrumDetector {
    settings: PitchSettings,
    fft_size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl CepstrumDetector {
    pub fn new(settings: PitchSettings, planner: &mut FftPlanner<f32>, frame_len: usize) -> Self {
        let fft_size = (2 * frame_len.max(1)).next_power_of_two();
        Self {
            settings,
            fft_size,
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
            window: window::hann(frame_len),
        }
    }

    /// Real cepstrum of `x`, `fft_size` quefrency bins
    fn cepstrum(&self, x: &[f64]) -> Vec<f64> {
        let fresh;
        let window = if x.len() == self.window.len() {
            &self.window
        } else {
            fresh = window::hann(x.len());
            &fresh
        };

        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.fft_size];
        for (slot, (&v, &w)) in buffer.iter_mut().zip(x.iter().zip(window.iter())) {
            *slot = Complex::new(v as f32 * w, 0.0);
        }
        self.forward.process(&mut buffer);

        let peak = buffer.iter().map(|c| c.norm()).fold(0.0f32, f32::max);
        let floor = peak * DYNAMIC_RANGE + f32::MIN_POSITIVE;
        for c in buffer.iter_mut() {
            *c = Complex::new((c.norm() + floor).ln(), 0.0);
        }
        self.inverse.process(&mut buffer);

        let scale = 1.0 / self.fft_size as f64;
        buffer.iter().map(|c| c.re as f64 * scale).collect()
    }
}

impl PitchDetector for CepstrumDetector {
    fn algorithm(&self) -> PitchAlgorithm {
        PitchAlgorithm::Cepstrum
    }

    fn detect(&self, frame: &AudioFrame) -> PitchEstimate {
        let alg = self.algorithm();
        let (x, min_lag, max_lag) = match prepare(frame, &self.settings) {
            Ok(prepared) => prepared,
            Err(reason) => return PitchEstimate::unvoiced(alg, reason),
        };

        let ceps = self.cepstrum(&x);
        let hi = max_lag.min(self.fft_size / 2 - 1);
        let mut peaks: Vec<usize> = (min_lag..hi)
            .filter(|&q| ceps[q] > ceps[q - 1] && ceps[q] >= ceps[q + 1])
            .collect();
        peaks.sort_by(|&a, &b| ceps[b].total_cmp(&ceps[a]));

        let strongest = match peaks.first() {
            Some(&q) if ceps[q] > 0.0 => ceps[q],
            _ => return PitchEstimate::unvoiced(alg, FrameDegeneracy::NoPeriodicity),
        };
        let floor = self.settings.cepstrum_candidate_ratio * strongest;

        let candidates: Vec<(f64, f64)> = peaks
            .iter()
            .take(MAX_CANDIDATES)
            .filter(|&&q| ceps[q] >= floor)
            .filter_map(|&q| refine_period(&x, q, (q / 20).max(2), min_lag, max_lag))
            .collect();

        let best = candidates
            .iter()
            .map(|&(_, value)| value)
            .fold(f64::NEG_INFINITY, f64::max);
        if best < self.settings.voicing_threshold {
            return PitchEstimate::unvoiced(alg, FrameDegeneracy::NoPeriodicity);
        }

        let shortest = candidates
            .iter()
            .filter(|&&(_, value)| value >= OCTAVE_RATIO * best)
            .min_by(|a, b| a.0.total_cmp(&b.0));
        match shortest {
            Some(&(period, value)) => {
                voiced_or_sub_octave(alg, &x, frame.sample_rate, period, value)
            }
            None => PitchEstimate::unvoiced(alg, FrameDegeneracy::NoPeriodicity),
        }
    }
}
