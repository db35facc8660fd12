//! Block resampling by spectrum truncation or zero padding

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Resamples blocks of exactly `input_len` samples to `output_len` samples.
///
/// The forward transform of the block is cropped (downsampling) or padded
/// (upsampling) around the Nyquist bin and transformed back. Plans are built
/// once; `process` takes `&self` so one resampler can serve several threads.
pub struct FftResampler {
    input_len: usize,
    output_len: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl FftResampler {
    pub fn new(planner: &mut FftPlanner<f32>, input_len: usize, output_len: usize) -> Self {
        Self {
            input_len,
            output_len,
            forward: planner.plan_fft_forward(input_len.max(1)),
            inverse: planner.plan_fft_inverse(output_len.max(1)),
        }
    }

    /// Resample one block. Shorter input is zero padded, longer input truncated.
    pub fn process(&self, x: &[f32]) -> Vec<f32> {
        let (n_in, n_out) = (self.input_len, self.output_len);
        if n_in == 0 || n_out == 0 {
            return Vec::new();
        }

        let mut spectrum: Vec<Complex<f32>> = (0..n_in)
            .map(|i| Complex::new(x.get(i).copied().unwrap_or(0.0), 0.0))
            .collect();
        self.forward.process(&mut spectrum);

        let mut out = vec![Complex::new(0.0f32, 0.0); n_out];
        let shorter = n_in.min(n_out);
        let half = shorter / 2;
        // With an even shorter length, bin `half` is a Nyquist bin and is split
        let full = if shorter % 2 == 0 {
            half.saturating_sub(1)
        } else {
            half
        };

        out[0] = spectrum[0];
        for k in 1..=full {
            out[k] = spectrum[k];
            out[n_out - k] = spectrum[n_in - k];
        }
        if shorter % 2 == 0 && half > 0 {
            out[half] += spectrum[half] * 0.5;
            out[n_out - half] += spectrum[n_in - half] * 0.5;
        }

        self.inverse.process(&mut out);

        let scale = 1.0 / n_in as f32;
        out.iter().map(|c| c.re * scale).collect()
    }
}
