//! Signal processing building blocks shared by the analyzers

pub mod lpc;
pub mod polynomial;
pub mod resample;
pub mod window;

pub use lpc::{burg, levinson_durbin, LpcMethod, LpcModel};
pub use resample::FftResampler;

/// Copy of `samples` in f64 with the mean removed
pub fn remove_mean(samples: &[f32]) -> Vec<f64> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64;
    samples.iter().map(|&s| s as f64 - mean).collect()
}

/// Root mean square of `x`
pub fn rms(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
}

/// Vertex of the parabola through `(i-1, y[i-1]), (i, y[i]), (i+1, y[i+1])`.
///
/// Returns `(position, value)`; falls back to `(i, y[i])` at the edges or on
/// a flat neighbourhood.
pub fn parabolic_peak(y: &[f64], i: usize) -> (f64, f64) {
    if i == 0 || i + 1 >= y.len() {
        return (i as f64, y.get(i).copied().unwrap_or(0.0));
    }
    let (a, b, c) = (y[i - 1], y[i], y[i + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() < 1e-12 {
        return (i as f64, b);
    }
    let delta = 0.5 * (a - c) / denom;
    (i as f64 + delta, b - 0.25 * (a - c) * delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_mean() {
        let x = remove_mean(&[1.0, 2.0, 3.0]);
        assert_eq!(x, vec![-1.0, 0.0, 1.0]);
        assert!(remove_mean(&[]).is_empty());
    }

    #[test]
    fn test_rms() {
        assert!((rms(&[3.0, -3.0]) - 3.0).abs() < 1e-12);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_parabolic_peak() {
        // y = -(x - 2.3)^2 sampled at 1, 2, 3
        let y: Vec<f64> = (0..5).map(|x| -((x as f64) - 2.3).powi(2)).collect();
        let (pos, value) = parabolic_peak(&y, 2);
        assert!((pos - 2.3).abs() < 1e-12);
        assert!(value.abs() < 1e-12);

        assert_eq!(parabolic_peak(&y, 0), (0.0, y[0]));
    }
}
