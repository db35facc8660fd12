//! Analysis windows

use std::f64::consts::PI;

/// Symmetric Hann window of length `n`
pub fn hann(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| (0.5 - 0.5 * ((2.0 * PI * i as f64) / (n as f64 - 1.0)).cos()) as f32)
        .collect()
}

/// Symmetric Hamming window of length `n`
pub fn hamming(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * ((2.0 * PI * i as f64) / (n as f64 - 1.0)).cos())
        .collect()
}
