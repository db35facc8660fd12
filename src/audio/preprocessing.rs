//! Input conditioning applied to the capture stream before segmentation

use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type, Q_BUTTERWORTH_F32};
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Stateful high-pass filter that removes DC offset and low rumble.
///
/// The filter state carries across chunks, so the stream is filtered as one
/// continuous signal regardless of how the device splits it.
pub struct InputConditioner {
    high_pass_filter: Option<DirectForm1<f32>>,
}

impl InputConditioner {
    /// Create a conditioner; a cutoff of 0 disables filtering
    pub fn new(highpass_hz: f32, sample_rate: u32) -> Result<Self> {
        let high_pass_filter = if highpass_hz > 0.0 {
            let coeffs = Coefficients::<f32>::from_params(
                Type::HighPass,
                sample_rate.hz(),
                highpass_hz.hz(),
                Q_BUTTERWORTH_F32,
            )
            .map_err(|e| ConfigError::InvalidValue {
                field: "tuning.highpass_hz".to_string(),
                value: format!("{} ({:?})", highpass_hz, e),
            })?;

            debug!("High-pass filter: {} Hz @ {} Hz", highpass_hz, sample_rate);
            Some(DirectForm1::<f32>::new(coeffs))
        } else {
            None
        };

        Ok(Self { high_pass_filter })
    }

    /// Pass-through conditioner
    pub fn disabled() -> Self {
        Self {
            high_pass_filter: None,
        }
    }

    /// Filter a chunk in place
    pub fn process(&mut self, samples: &mut [f32]) {
        if let Some(ref mut filter) = self.high_pass_filter {
            for sample in samples.iter_mut() {
                *sample = filter.run(*sample);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.high_pass_filter.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_passes_through() {
        let mut conditioner = InputConditioner::new(0.0, 16000).unwrap();
        assert!(!conditioner.is_active());

        let mut samples = vec![0.25, -0.5, 1.0];
        conditioner.process(&mut samples);
        assert_eq!(samples, vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn test_removes_dc() {
        let mut conditioner = InputConditioner::new(40.0, 16000).unwrap();
        assert!(conditioner.is_active());

        let mut samples = vec![0.5f32; 16000];
        conditioner.process(&mut samples);

        // After settling the constant offset is gone
        let tail = &samples[8000..];
        let mean = tail.iter().sum::<f32>() / tail.len() as f32;
        assert!(mean.abs() < 0.01, "residual DC {}", mean);
    }

    #[test]
    fn test_state_carries_across_chunks() {
        let signal: Vec<f32> = (0..2048)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin() + 0.3)
            .collect();

        let mut whole = InputConditioner::new(60.0, 16000).unwrap();
        let mut expected = signal.clone();
        whole.process(&mut expected);

        let mut chunked = InputConditioner::new(60.0, 16000).unwrap();
        let mut actual = signal.clone();
        for chunk in actual.chunks_mut(100) {
            chunked.process(chunk);
        }

        for (a, b) in actual.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_fallback_is_pass_through() {
        let mut conditioner = InputConditioner::disabled();
        assert!(!conditioner.is_active());

        let mut samples = vec![0.5f32; 64];
        conditioner.process(&mut samples);
        assert!(samples.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_cutoff_above_nyquist_rejected() {
        assert!(InputConditioner::new(9000.0, 16000).is_err());
    }
}
