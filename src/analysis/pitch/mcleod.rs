//! McLeod pitch method: normalized square difference with key maxima

use super::{
    prepare, voiced_or_sub_octave, PitchAlgorithm, PitchDetector, PitchEstimate, PitchSettings,
};
use crate::audio::AudioFrame;
use crate::dsp::parabolic_peak;
use crate::error::FrameDegeneracy;

/// Key maxima below this are never period candidates
const SMALL_CUTOFF: f64 = 0.5;

pub struct McLeodDetector {
    settings: PitchSettings,
}

impl McLeodDetector {
    pub fn new(settings: PitchSettings) -> Self {
        Self { settings }
    }
}

/// NSDF for lags `0..=max_lag`
fn nsdf(x: &[f64], max_lag: usize) -> Vec<f64> {
    let n = x.len();
    let mut m: f64 = 2.0 * x.iter().map(|v| v * v).sum::<f64>();
    let mut out = Vec::with_capacity(max_lag + 1);
    for tau in 0..=max_lag.min(n - 1) {
        if tau > 0 {
            m -= x[tau - 1] * x[tau - 1] + x[n - tau] * x[n - tau];
        }
        let r: f64 = x.iter().zip(&x[tau..]).map(|(a, b)| a * b).sum();
        out.push(if m > 1e-12 { 2.0 * r / m } else { 0.0 });
    }
    out
}

/// Highest point of each positive lobe after the first negative-going
/// zero crossing
fn key_maxima(nsdf: &[f64]) -> Vec<usize> {
    let len = nsdf.len();
    let mut maxima = Vec::new();
    let mut pos = 1;

    while pos < len && nsdf[pos] > 0.0 {
        pos += 1;
    }

    let mut current: Option<usize> = None;
    while pos + 1 < len {
        if nsdf[pos] > 0.0 {
            if nsdf[pos] > nsdf[pos - 1]
                && nsdf[pos] >= nsdf[pos + 1]
                && current.map_or(true, |c| nsdf[pos] > nsdf[c])
            {
                current = Some(pos);
            }
        } else if let Some(c) = current.take() {
            maxima.push(c);
        }
        pos += 1;
    }
    maxima.extend(current);
    maxima
}

impl PitchDetector for McLeodDetector {
    fn algorithm(&self) -> PitchAlgorithm {
        PitchAlgorithm::McLeod
    }

    fn detect(&self, frame: &AudioFrame) -> PitchEstimate {
        let alg = self.algorithm();
        let (x, min_lag, max_lag) = match prepare(frame, &self.settings) {
            Ok(prepared) => prepared,
            Err(reason) => return PitchEstimate::unvoiced(alg, reason),
        };

        // One extra lag so a maximum at `max_lag` can be recognised
        let curve = nsdf(&x, max_lag + 1);
        let candidates: Vec<(f64, f64)> = key_maxima(&curve)
            .into_iter()
            .filter(|&i| i >= min_lag && i <= max_lag)
            .map(|i| parabolic_peak(&curve, i))
            .filter(|&(_, value)| value > SMALL_CUTOFF)
            .collect();

        let highest = candidates
            .iter()
            .map(|&(_, value)| value)
            .fold(f64::NEG_INFINITY, f64::max);
        let threshold = self.settings.mpm_cutoff * highest;

        match candidates.iter().find(|&&(_, value)| value >= threshold) {
            Some(&(period, clarity)) => {
                voiced_or_sub_octave(alg, &x, frame.sample_rate, period, clarity)
            }
            None => PitchEstimate::unvoiced(alg, FrameDegeneracy::NoPeriodicity),
        }
    }
}
