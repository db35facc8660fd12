//! Getter/setter surface for front-ends (settings screens, foreign bindings).
//!
//! Every setter publishes a new configuration snapshot; a running session
//! picks it up at its next frame boundary. Range fields are clamped and the
//! applied value is returned; `fft_size` and algorithm ids are rejected when
//! invalid and leave the configuration untouched.

use std::sync::Arc;

use crate::analysis::{FormantAlgorithm, PitchAlgorithm};
use crate::config::{Color, FORMANT_COLOR_SLOTS};
use crate::engine::{ConfigHandle, ConfigSnapshot};
use crate::error::ConfigError;

/// Human-readable crate version
pub fn version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Monotonic integer version: `major * 10000 + minor * 100 + patch`
pub fn version_code() -> u32 {
    let part = |s: &str| s.parse::<u32>().unwrap_or(0);
    part(env!("CARGO_PKG_VERSION_MAJOR")) * 10_000
        + part(env!("CARGO_PKG_VERSION_MINOR")) * 100
        + part(env!("CARGO_PKG_VERSION_PATCH"))
}

/// Cheap, cloneable view of the engine configuration
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    handle: Arc<ConfigHandle>,
}

impl AnalysisSettings {
    pub fn new(handle: Arc<ConfigHandle>) -> Self {
        Self { handle }
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.handle.load()
    }

    pub fn fft_size(&self) -> usize {
        self.snapshot().config.fft_size
    }

    /// Rejects sizes that are not a power of two in 64..=2048
    pub fn set_fft_size(&self, size: usize) -> Result<usize, ConfigError> {
        self.handle.update(|c| c.set_fft_size(size))
    }

    pub fn lp_order(&self) -> usize {
        self.snapshot().config.lp_order
    }

    pub fn set_lp_order(&self, order: usize) -> Result<usize, ConfigError> {
        self.handle.update(|c| Ok(c.set_lp_order(order)))
    }

    pub fn max_freq(&self) -> u32 {
        self.snapshot().config.max_freq
    }

    pub fn set_max_freq(&self, hz: u32) -> Result<u32, ConfigError> {
        self.handle.update(|c| Ok(c.set_max_freq(hz)))
    }

    /// Frame length (ms)
    pub fn frame_length(&self) -> u32 {
        self.snapshot().config.frame_length_ms
    }

    pub fn set_frame_length(&self, ms: u32) -> Result<u32, ConfigError> {
        self.handle.update(|c| Ok(c.set_frame_length_ms(ms)))
    }

    /// Frame spacing (ms)
    pub fn frame_space(&self) -> u32 {
        self.snapshot().config.frame_space_ms
    }

    pub fn set_frame_space(&self, ms: u32) -> Result<u32, ConfigError> {
        self.handle.update(|c| Ok(c.set_frame_space_ms(ms)))
    }

    /// Display window (s)
    pub fn duration(&self) -> u32 {
        self.snapshot().config.duration_s
    }

    pub fn set_duration(&self, seconds: u32) -> Result<u32, ConfigError> {
        self.handle.update(|c| Ok(c.set_duration_s(seconds)))
    }

    /// Pitch algorithm names, indexed by id
    pub fn pitch_algorithms(&self) -> Vec<&'static str> {
        PitchAlgorithm::ALL.iter().map(|a| a.name()).collect()
    }

    pub fn pitch_algorithm(&self) -> usize {
        self.snapshot().config.pitch_algorithm
    }

    pub fn set_pitch_algorithm(&self, id: usize) -> Result<usize, ConfigError> {
        self.handle.update(|c| c.set_pitch_algorithm(id))
    }

    /// Formant algorithm names, indexed by id
    pub fn formant_algorithms(&self) -> Vec<&'static str> {
        FormantAlgorithm::ALL.iter().map(|a| a.name()).collect()
    }

    pub fn formant_algorithm(&self) -> usize {
        self.snapshot().config.formant_algorithm
    }

    pub fn set_formant_algorithm(&self, id: usize) -> Result<usize, ConfigError> {
        self.handle.update(|c| c.set_formant_algorithm(id))
    }

    /// Spectrum display floor (dB)
    pub fn min_gain(&self) -> i32 {
        self.snapshot().config.min_gain_db
    }

    pub fn set_min_gain(&self, db: i32) -> Result<i32, ConfigError> {
        self.handle.update(|c| Ok(c.set_min_gain_db(db)))
    }

    /// Spectrum display ceiling (dB)
    pub fn max_gain(&self) -> i32 {
        self.snapshot().config.max_gain_db
    }

    pub fn set_max_gain(&self, db: i32) -> Result<i32, ConfigError> {
        self.handle.update(|c| Ok(c.set_max_gain_db(db)))
    }

    pub fn pitch_color(&self) -> Color {
        self.snapshot().config.pitch_color
    }

    pub fn set_pitch_color(&self, color: Color) -> Result<(), ConfigError> {
        self.handle.update(|c| {
            c.pitch_color = color;
            Ok(())
        })
    }

    /// Number of formant color slots
    pub fn formant_count(&self) -> usize {
        FORMANT_COLOR_SLOTS
    }

    pub fn formant_color(&self, index: usize) -> Result<Color, ConfigError> {
        self.snapshot()
            .config
            .formant_colors
            .get(index)
            .copied()
            .ok_or(ConfigError::FormantIndexOutOfRange {
                index,
                count: FORMANT_COLOR_SLOTS,
            })
    }

    pub fn set_formant_color(&self, index: usize, color: Color) -> Result<(), ConfigError> {
        self.handle.update(|c| c.set_formant_color(index, color))
    }
}
