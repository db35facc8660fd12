//! Short-time magnitude spectrum of a frame

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::Serialize;
use std::sync::Arc;

use crate::audio::AudioFrame;
use crate::dsp::window;

/// Magnitude (and optionally phase) spectrum for bins `0..=fft_size/2`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectralSlice {
    pub fft_size: usize,
    pub sample_rate: u32,
    /// Linear magnitudes; a sine of amplitude A peaks near A
    pub magnitudes: Vec<f32>,
    /// Phases in radians, if requested
    pub phases: Option<Vec<f32>>,
    /// The frame was longer than `fft_size` and only its centre was analysed
    pub truncated: bool,
}

impl SpectralSlice {
    /// Width of one bin in Hz
    pub fn bin_width(&self) -> f64 {
        self.sample_rate as f64 / self.fft_size as f64
    }

    /// Centre frequency of bin `k` in Hz
    pub fn bin_frequency(&self, k: usize) -> f64 {
        k as f64 * self.bin_width()
    }

    /// Index of the largest magnitude, ignoring DC
    pub fn peak_bin(&self) -> Option<usize> {
        self.magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
    }

    /// Magnitudes in dB, floored at `floor_db`
    pub fn magnitudes_db(&self, floor_db: f32) -> Vec<f32> {
        self.magnitudes
            .iter()
            .map(|&m| (20.0 * m.max(1e-12).log10()).max(floor_db))
            .collect()
    }
}

/// Hann-windowed FFT analyzer for frames of one known length.
///
/// Frames shorter than `fft_size` are zero padded. Longer frames are cut to
/// their centred `fft_size` samples and the slice is flagged `truncated`.
pub struct SpectralAnalyzer {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    with_phase: bool,
}

impl SpectralAnalyzer {
    pub fn new(
        planner: &mut FftPlanner<f32>,
        fft_size: usize,
        frame_len: usize,
        with_phase: bool,
    ) -> Self {
        Self {
            fft_size,
            fft: planner.plan_fft_forward(fft_size),
            window: window::hann(frame_len.min(fft_size)),
            with_phase,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn analyze(&self, frame: &AudioFrame) -> SpectralSlice {
        let samples = &frame.samples;
        let truncated = samples.len() > self.fft_size;
        let segment = if truncated {
            let start = (samples.len() - self.fft_size) / 2;
            &samples[start..start + self.fft_size]
        } else {
            &samples[..]
        };

        let fresh;
        let window = if segment.len() == self.window.len() {
            &self.window
        } else {
            fresh = window::hann(segment.len());
            &fresh
        };

        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.fft_size];
        for (slot, (&s, &w)) in buffer.iter_mut().zip(segment.iter().zip(window.iter())) {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut buffer);

        let window_sum: f32 = window.iter().sum();
        let bins = self.fft_size / 2 + 1;
        let magnitudes = if window_sum > 0.0 {
            buffer[..bins]
                .iter()
                .enumerate()
                .map(|(k, c)| {
                    let one_sided = if k == 0 || k == self.fft_size / 2 { 1.0 } else { 2.0 };
                    c.norm() * one_sided / window_sum
                })
                .collect()
        } else {
            vec![0.0; bins]
        };

        let phases = self
            .with_phase
            .then(|| buffer[..bins].iter().map(|c| c.arg()).collect());

        SpectralSlice {
            fft_size: self.fft_size,
            sample_rate: frame.sample_rate,
            magnitudes,
            phases,
            truncated,
        }
    }
}
