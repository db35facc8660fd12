//! Dynamic wavelet pitch: spacing of waveform minima across Haar
//! approximation levels.
//!
//! Each level halves the rate by averaging sample pairs. The most common
//! distance between nearby minima is taken at every level; once two
//! consecutive levels agree on it (allowing for the halving), that distance
//! is the period. The period is then refined on the normalized
//! autocorrelation of the full-rate frame, which also decides voicing.

use super::{
    prepare, refine_period, voiced_or_sub_octave, PitchAlgorithm, PitchDetector, PitchEstimate,
    PitchSettings,
};
use crate::audio::AudioFrame;
use crate::error::FrameDegeneracy;

/// Approximation levels tried before giving up
const MAX_LEVELS: i32 = 6;

/// Highest frequency whose minima are kept apart (Hz)
const MAX_FREQUENCY_HZ: f64 = 3000.0;

/// Each minimum is paired with this many following ones
const PAIRED_MINIMA: usize = 2;

/// Minima must reach this fraction of the frame's peak magnitude
const AMPLITUDE_RATIO: f64 = 0.75;

pub struct WaveletDetector {
    settings: PitchSettings,
}

impl WaveletDetector {
    pub fn new(settings: PitchSettings) -> Self {
        Self { settings }
    }
}

/// First local minimum after each downward zero crossing that reaches
/// `-threshold` and lies more than `spacing` samples past the previous one
fn minima(signal: &[f64], threshold: f64, spacing: usize) -> Vec<usize> {
    let mut found = Vec::new();
    let mut armed = false;
    let mut last: Option<usize> = None;

    for i in 2..signal.len() {
        if signal[i - 1] >= 0.0 && signal[i] < 0.0 {
            armed = true;
        }
        let falling = signal[i - 1] < signal[i - 2];
        let rising = signal[i] >= signal[i - 1];
        if armed && falling && rising {
            let at = i - 1;
            let spaced = last.map_or(true, |l| at > l + spacing);
            if signal[at].abs() >= threshold && spaced {
                found.push(at);
                last = Some(at);
                armed = false;
            }
        }
    }
    found
}

/// Weighted mean of the most common distance between nearby minima.
///
/// Distances are counted in a histogram and summed over a `±delta` window;
/// on a tie the window at twice the current best distance wins.
fn mode_distance(minima: &[usize], len: usize, delta: usize) -> Option<f64> {
    let mut histogram = vec![0usize; len];
    for (i, &a) in minima.iter().enumerate() {
        for &b in minima.iter().skip(i + 1).take(PAIRED_MINIMA) {
            histogram[b - a] += 1;
        }
    }

    let window = |centre: usize| centre.saturating_sub(delta)..=(centre + delta).min(len - 1);

    let mut best: Option<(usize, usize)> = None;
    for centre in 0..len {
        let summed: usize = histogram[window(centre)].iter().sum();
        best = match best {
            Some((distance, count)) if summed == count && centre == 2 * distance => {
                Some((centre, summed))
            }
            Some((_, count)) if summed <= count => best,
            _ => Some((centre, summed)),
        };
    }

    let (centre, count) = best?;
    if count == 0 {
        return None;
    }
    let (mut weighted, mut total) = (0.0, 0.0);
    for distance in window(centre) {
        weighted += (distance * histogram[distance]) as f64;
        total += histogram[distance] as f64;
    }
    (total > 0.0).then(|| weighted / total)
}

/// Period in full-rate samples from the level descent, if two levels agree
fn coarse_period(x: &[f64], sample_rate: f64) -> Option<f64> {
    let peak = x.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let threshold = AMPLITUDE_RATIO * peak;

    let mut buffer = x.to_vec();
    let mut previous: Option<f64> = None;

    for level in 0..MAX_LEVELS {
        if buffer.len() < 3 {
            return None;
        }
        let scale = 2f64.powi(level);
        let delta = (sample_rate / (scale * MAX_FREQUENCY_HZ)).floor() as usize;

        let found = minima(&buffer, threshold, delta);
        let distance = mode_distance(&found, buffer.len(), delta)?;

        if let Some(before) = previous {
            if (2.0 * distance - before).abs() <= 2.0 * delta as f64 {
                // `before` is in samples of the previous level
                return Some(before * scale / 2.0);
            }
        }
        previous = Some(distance);

        buffer = buffer
            .chunks_exact(2)
            .map(|pair| (pair[0] + pair[1]) / 2.0)
            .collect();
    }
    None
}

impl PitchDetector for WaveletDetector {
    fn algorithm(&self) -> PitchAlgorithm {
        PitchAlgorithm::Wavelet
    }

    fn detect(&self, frame: &AudioFrame) -> PitchEstimate {
        let alg = self.algorithm();
        let (x, min_lag, max_lag) = match prepare(frame, &self.settings) {
            Ok(prepared) => prepared,
            Err(reason) => return PitchEstimate::unvoiced(alg, reason),
        };

        let coarse = match coarse_period(&x, frame.sample_rate as f64) {
            Some(period) if period >= 1.0 => period,
            _ => return PitchEstimate::unvoiced(alg, FrameDegeneracy::NoPeriodicity),
        };

        let around = coarse.round() as usize;
        let reach = (around / 20).max(2);
        match refine_period(&x, around, reach, min_lag, max_lag) {
            Some((period, value)) if value >= self.settings.voicing_threshold => {
                voiced_or_sub_octave(alg, &x, frame.sample_rate, period, value)
            }
            _ => PitchEstimate::unvoiced(alg, FrameDegeneracy::NoPeriodicity),
        }
    }
}
