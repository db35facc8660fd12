//! Kalman smoothing of formant tracks across frames

use super::formant::{Formant, FormantEstimate};
use crate::config::TuningConfig;

/// Constant-velocity Kalman filter on one formant frequency
#[derive(Debug, Clone, Copy)]
struct Kalman1D {
    x: [f64; 2],
    p: [[f64; 2]; 2],
    initialized: bool,
}

impl Kalman1D {
    fn new() -> Self {
        Self {
            x: [0.0, 0.0],
            p: [[1.0, 0.0], [0.0, 1.0]],
            initialized: false,
        }
    }

    fn init(&mut self, position: f64) {
        self.x = [position, 0.0];
        self.p = [[1_000.0, 0.0], [0.0, 1_000.0]];
        self.initialized = true;
    }

    fn predict(&mut self, dt: f64, q: f64) {
        if !self.initialized {
            return;
        }
        let dt2 = dt * dt;
        let q11 = q * dt2 * dt2 / 4.0;
        let q12 = q * dt2 * dt / 2.0;
        let q22 = q * dt2;

        let p = self.p;
        self.x = [self.x[0] + dt * self.x[1], self.x[1]];
        self.p = [
            [
                p[0][0] + dt * (p[1][0] + p[0][1]) + dt2 * p[1][1] + q11,
                p[0][1] + dt * p[1][1] + q12,
            ],
            [p[1][0] + dt * p[1][1] + q12, p[1][1] + q22],
        ];
    }

    fn update(&mut self, z: f64, r: f64) {
        if !self.initialized {
            self.init(z);
            return;
        }
        let y = z - self.x[0];
        let s = self.p[0][0] + r;
        let k0 = self.p[0][0] / s;
        let k1 = self.p[1][0] / s;

        self.x[0] += k0 * y;
        self.x[1] += k1 * y;

        let p = self.p;
        self.p = [
            [(1.0 - k0) * p[0][0], (1.0 - k0) * p[0][1]],
            [p[1][0] - k1 * p[0][0], p[1][1] - k1 * p[0][1]],
        ];
    }

    fn position(&self) -> f64 {
        self.x[0]
    }
}

/// Sequential formant tracker.
///
/// Slot `i` follows the `i`-th lowest formant. It has to see frames in
/// sequence order, so it runs where results are emitted rather than in the
/// worker pool.
#[derive(Debug, Clone)]
pub struct FormantTracker {
    slots: Vec<Kalman1D>,
    process_noise: f64,
    measurement_noise: f64,
    silence_limit: usize,
    silence_frames: usize,
    max_freq: f64,
}

impl FormantTracker {
    pub fn new(tuning: &TuningConfig, max_freq: f64, max_formants: usize) -> Self {
        Self {
            slots: vec![Kalman1D::new(); max_formants],
            process_noise: tuning.kalman_process_noise.max(1.0),
            measurement_noise: tuning.kalman_measurement_noise.max(1.0),
            silence_limit: tuning.kalman_silence_frames.max(1),
            silence_frames: 0,
            max_freq,
        }
    }

    /// Forget all tracks
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = Kalman1D::new();
        }
        self.silence_frames = 0;
    }

    /// Smooth one frame's estimate; `dt` is the time since the previous frame (s)
    pub fn update(&mut self, estimate: &FormantEstimate, dt: f64) -> FormantEstimate {
        if estimate.is_empty() {
            self.silence_frames += 1;
            if self.silence_frames >= self.silence_limit {
                self.reset();
            }
            return estimate.clone();
        }
        self.silence_frames = 0;

        let mut formants: Vec<Formant> = estimate
            .formants
            .iter()
            .zip(self.slots.iter_mut())
            .map(|(measured, slot)| {
                slot.predict(dt, self.process_noise);
                slot.update(measured.frequency, self.measurement_noise);
                Formant {
                    frequency: slot.position().clamp(0.0, self.max_freq),
                    bandwidth: measured.bandwidth,
                }
            })
            .collect();
        formants.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));

        FormantEstimate {
            formants,
            degeneracy: None,
        }
    }
}
