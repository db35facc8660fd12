//! Configuration structures for the analysis engine

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::analysis::formant::FormantAlgorithm;
use crate::analysis::pitch::PitchAlgorithm;
use crate::dsp::lpc::LpcMethod;
use crate::error::ConfigError;

/// Smallest accepted FFT size
pub const FFT_SIZE_MIN: usize = 64;
/// Largest accepted FFT size
pub const FFT_SIZE_MAX: usize = 2048;
pub const LP_ORDER_MIN: usize = 5;
pub const LP_ORDER_MAX: usize = 14;
pub const MAX_FREQ_MIN: u32 = 2500;
pub const MAX_FREQ_MAX: u32 = 7000;
pub const FRAME_LENGTH_MIN_MS: u32 = 25;
pub const FRAME_LENGTH_MAX_MS: u32 = 60;
pub const FRAME_SPACE_MIN_MS: u32 = 10;
pub const FRAME_SPACE_MAX_MS: u32 = 25;
pub const DURATION_MIN_S: u32 = 2;
pub const DURATION_MAX_S: u32 = 10;
pub const GAIN_MIN_DB: i32 = -80;
pub const GAIN_MAX_DB: i32 = 60;
/// Number of per-formant display color slots
pub const FORMANT_COLOR_SLOTS: usize = 4;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: CaptureConfig,
    pub analysis: AnalysisConfig,
    pub tuning: TuningConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// Range fields of `[analysis]` are clamped the same way the setters
    /// clamp them; an invalid FFT size or algorithm id is rejected.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: EngineConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.analysis = config.analysis.normalized()?;
        Ok(config)
    }
}

/// ARGB display color, in the packed `int` layout used by Android
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Color(0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    pub const fn argb(self) -> u32 {
        self.0
    }
}

/// The tunable analysis parameters.
///
/// A value of this type is never mutated while the engine reads it: the
/// engine holds it behind an `Arc`, and changes are made on a clone which then
/// replaces the shared value as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// FFT size for the spectral slice (power of two)
    pub fft_size: usize,
    /// Linear prediction order
    pub lp_order: usize,
    /// Highest formant frequency reported (Hz)
    pub max_freq: u32,
    /// Analysis frame length (ms)
    pub frame_length_ms: u32,
    /// Time between consecutive frame starts (ms)
    pub frame_space_ms: u32,
    /// Rolling display window (s); display-only
    pub duration_s: u32,
    /// Index into [`PitchAlgorithm::ALL`]
    pub pitch_algorithm: usize,
    /// Index into [`FormantAlgorithm::ALL`]
    pub formant_algorithm: usize,
    /// Spectrum display floor (dB); display-only
    pub min_gain_db: i32,
    /// Spectrum display ceiling (dB); display-only
    pub max_gain_db: i32,
    /// Pitch track color; display-only
    pub pitch_color: Color,
    /// Formant track colors; display-only
    pub formant_colors: [Color; FORMANT_COLOR_SLOTS],
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: 512,
            lp_order: 10,
            max_freq: 5000,
            frame_length_ms: 35,
            frame_space_ms: 15,
            duration_s: 5,
            pitch_algorithm: 0,
            formant_algorithm: 0,
            min_gain_db: -60,
            max_gain_db: 0,
            pitch_color: Color::from_rgb(0x00, 0xFF, 0xFF),
            formant_colors: [
                Color::from_rgb(0xFF, 0xA6, 0x00),
                Color::from_rgb(0x00, 0xFF, 0x00),
                Color::from_rgb(0x00, 0x80, 0xFF),
                Color::from_rgb(0xFF, 0x00, 0xFF),
            ],
        }
    }
}

fn clamp_field<T>(field: &str, value: T, min: T, max: T) -> T
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    if value < min {
        debug!("{} = {} clamped to {}", field, value, min);
        min
    } else if value > max {
        debug!("{} = {} clamped to {}", field, value, max);
        max
    } else {
        value
    }
}

fn check_range<T>(field: &str, value: T, min: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Check that `size` is an accepted FFT size.
pub fn check_fft_size(size: usize) -> Result<(), ConfigError> {
    if !size.is_power_of_two() {
        return Err(ConfigError::FftSizeNotPowerOfTwo(size));
    }
    if !(FFT_SIZE_MIN..=FFT_SIZE_MAX).contains(&size) {
        return Err(ConfigError::FftSizeOutOfRange {
            size,
            min: FFT_SIZE_MIN,
            max: FFT_SIZE_MAX,
        });
    }
    Ok(())
}

impl AnalysisConfig {
    /// Set the FFT size; anything but a power of two in range is rejected.
    pub fn set_fft_size(&mut self, size: usize) -> Result<usize, ConfigError> {
        check_fft_size(size)?;
        self.fft_size = size;
        Ok(size)
    }

    /// Set the LP order, clamped to its range. Returns the applied value.
    pub fn set_lp_order(&mut self, order: usize) -> usize {
        self.lp_order = clamp_field("lp_order", order, LP_ORDER_MIN, LP_ORDER_MAX);
        self.lp_order
    }

    pub fn set_max_freq(&mut self, hz: u32) -> u32 {
        self.max_freq = clamp_field("max_freq", hz, MAX_FREQ_MIN, MAX_FREQ_MAX);
        self.max_freq
    }

    pub fn set_frame_length_ms(&mut self, ms: u32) -> u32 {
        self.frame_length_ms =
            clamp_field("frame_length_ms", ms, FRAME_LENGTH_MIN_MS, FRAME_LENGTH_MAX_MS);
        self.frame_length_ms
    }

    pub fn set_frame_space_ms(&mut self, ms: u32) -> u32 {
        self.frame_space_ms =
            clamp_field("frame_space_ms", ms, FRAME_SPACE_MIN_MS, FRAME_SPACE_MAX_MS);
        self.frame_space_ms
    }

    pub fn set_duration_s(&mut self, seconds: u32) -> u32 {
        self.duration_s = clamp_field("duration_s", seconds, DURATION_MIN_S, DURATION_MAX_S);
        self.duration_s
    }

    /// Select a pitch algorithm by its index in [`PitchAlgorithm::ALL`]
    pub fn set_pitch_algorithm(&mut self, id: usize) -> Result<usize, ConfigError> {
        PitchAlgorithm::from_id(id)?;
        self.pitch_algorithm = id;
        Ok(id)
    }

    /// Select a formant algorithm by its index in [`FormantAlgorithm::ALL`]
    pub fn set_formant_algorithm(&mut self, id: usize) -> Result<usize, ConfigError> {
        FormantAlgorithm::from_id(id)?;
        self.formant_algorithm = id;
        Ok(id)
    }

    /// Set the display floor. It is kept strictly below the ceiling.
    pub fn set_min_gain_db(&mut self, db: i32) -> i32 {
        let db = clamp_field("min_gain_db", db, GAIN_MIN_DB, GAIN_MAX_DB - 1);
        self.min_gain_db = db.min(self.max_gain_db - 1);
        self.min_gain_db
    }

    /// Set the display ceiling. It is kept strictly above the floor.
    pub fn set_max_gain_db(&mut self, db: i32) -> i32 {
        let db = clamp_field("max_gain_db", db, GAIN_MIN_DB + 1, GAIN_MAX_DB);
        self.max_gain_db = db.max(self.min_gain_db + 1);
        self.max_gain_db
    }

    pub fn set_formant_color(&mut self, index: usize, color: Color) -> Result<(), ConfigError> {
        let slot = self
            .formant_colors
            .get_mut(index)
            .ok_or(ConfigError::FormantIndexOutOfRange {
                index,
                count: FORMANT_COLOR_SLOTS,
            })?;
        *slot = color;
        Ok(())
    }

    pub fn pitch_algorithm(&self) -> PitchAlgorithm {
        PitchAlgorithm::from_id(self.pitch_algorithm).unwrap_or_default()
    }

    pub fn formant_algorithm(&self) -> FormantAlgorithm {
        FormantAlgorithm::from_id(self.formant_algorithm).unwrap_or_default()
    }

    pub fn frame_length(&self) -> Duration {
        Duration::from_millis(self.frame_length_ms as u64)
    }

    pub fn frame_space(&self) -> Duration {
        Duration::from_millis(self.frame_space_ms as u64)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_s as u64)
    }

    /// Maximum number of formants an LP model of this order can yield
    pub fn max_formants(&self) -> usize {
        self.lp_order / 2
    }

    /// Whether formant tracks built under `other` stay valid under `self`.
    ///
    /// Display settings, the pitch algorithm and the FFT size do not touch
    /// formant estimates.
    pub fn keeps_formant_tracks(&self, other: &AnalysisConfig) -> bool {
        self.formant_algorithm == other.formant_algorithm
            && self.lp_order == other.lp_order
            && self.max_freq == other.max_freq
            && self.frame_length_ms == other.frame_length_ms
            && self.frame_space_ms == other.frame_space_ms
    }

    /// Strict check of every invariant; nothing is clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fft_size(self.fft_size)?;
        check_range("lp_order", self.lp_order, LP_ORDER_MIN, LP_ORDER_MAX)?;
        check_range("max_freq", self.max_freq, MAX_FREQ_MIN, MAX_FREQ_MAX)?;
        check_range(
            "frame_length_ms",
            self.frame_length_ms,
            FRAME_LENGTH_MIN_MS,
            FRAME_LENGTH_MAX_MS,
        )?;
        check_range(
            "frame_space_ms",
            self.frame_space_ms,
            FRAME_SPACE_MIN_MS,
            FRAME_SPACE_MAX_MS,
        )?;
        check_range("duration_s", self.duration_s, DURATION_MIN_S, DURATION_MAX_S)?;
        check_range("min_gain_db", self.min_gain_db, GAIN_MIN_DB, GAIN_MAX_DB)?;
        check_range("max_gain_db", self.max_gain_db, GAIN_MIN_DB, GAIN_MAX_DB)?;
        if self.min_gain_db >= self.max_gain_db {
            return Err(ConfigError::InvalidValue {
                field: "min_gain_db".to_string(),
                value: format!("{} (max_gain_db = {})", self.min_gain_db, self.max_gain_db),
            });
        }
        PitchAlgorithm::from_id(self.pitch_algorithm)?;
        FormantAlgorithm::from_id(self.formant_algorithm)?;
        Ok(())
    }

    /// Clamp range fields into their intervals, then validate the rest.
    pub fn normalized(mut self) -> Result<Self, ConfigError> {
        let (min_gain, max_gain) = (self.min_gain_db, self.max_gain_db);
        self.set_lp_order(self.lp_order);
        self.set_max_freq(self.max_freq);
        self.set_frame_length_ms(self.frame_length_ms);
        self.set_frame_space_ms(self.frame_space_ms);
        self.set_duration_s(self.duration_s);
        self.max_gain_db = clamp_field("max_gain_db", max_gain, GAIN_MIN_DB + 1, GAIN_MAX_DB);
        self.min_gain_db = GAIN_MIN_DB;
        self.set_min_gain_db(min_gain);
        self.validate()?;
        Ok(self)
    }
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Preferred capture sample rate (Hz)
    pub sample_rate: u32,
    /// Preferred channel count; input is always mixed down to mono
    pub channels: u16,
    /// Device buffer size in frames (None = device default)
    pub buffer_size: Option<u32>,
    /// Audio device name (None = default device)
    pub device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            buffer_size: None,
            device: None,
        }
    }
}

/// Algorithm constants that are not part of the collaborator surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// High-pass cutoff applied to the capture stream (Hz, 0 = off)
    pub highpass_hz: f32,
    /// Frames with RMS below this are treated as silence
    pub silence_rms: f32,
    /// Linear prediction solver for formant estimation
    pub lpc_method: LpcMethod,
    /// Pre-emphasis corner frequency before LP analysis (Hz, 0 = off).
    ///
    /// The first-order zero it adds costs the all-pole model a pole pair, so
    /// it is off unless the input needs its spectral tilt flattened.
    pub pre_emphasis_hz: f64,
    /// Formant candidates at or below this frequency are dropped (Hz)
    pub formant_min_hz: f64,
    /// Formant candidates with a wider bandwidth are dropped (Hz)
    pub formant_bandwidth_max_hz: f64,
    /// Lowest pitch searched (Hz)
    pub pitch_min_hz: f64,
    /// Highest pitch searched (Hz)
    pub pitch_max_hz: f64,
    /// YIN cumulative-mean-normalized-difference threshold
    pub yin_threshold: f64,
    /// McLeod key-maximum cutoff, relative to the highest maximum
    pub mpm_cutoff: f64,
    /// Minimum normalized periodicity for AMDF, and minimum correlation for
    /// the autocorrelation, cepstrum and wavelet detectors
    pub voicing_threshold: f64,
    /// Cepstral peaks below this fraction of the strongest one are not
    /// period candidates
    pub cepstrum_candidate_ratio: f64,
    /// Kalman process noise for the formant tracker
    pub kalman_process_noise: f64,
    /// Kalman measurement noise for the formant tracker
    pub kalman_measurement_noise: f64,
    /// Silent frames after which the formant tracker forgets its state
    pub kalman_silence_frames: usize,
    /// Also compute phases for the spectral slice
    pub spectrum_phase: bool,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            highpass_hz: 40.0,
            silence_rms: 1e-4,
            lpc_method: LpcMethod::Autocorrelation,
            pre_emphasis_hz: 0.0,
            formant_min_hz: 50.0,
            formant_bandwidth_max_hz: 700.0,
            pitch_min_hz: 60.0,
            pitch_max_hz: 500.0,
            yin_threshold: 0.15,
            mpm_cutoff: 0.93,
            voicing_threshold: 0.45,
            cepstrum_candidate_ratio: 0.1,
            kalman_process_noise: 2500.0,
            kalman_measurement_noise: 2000.0,
            kalman_silence_frames: 30,
            spectrum_phase: false,
        }
    }
}

/// Worker pool and queue sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Analysis worker threads
    pub workers: usize,
    /// Frames allowed in the worker pool before new frames are dropped
    pub max_in_flight: usize,
    /// Result queue capacity; the oldest result is dropped when full
    pub result_queue: usize,
    /// Capture chunks buffered between the device callback and the segmenter
    pub capture_queue: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            max_in_flight: 8,
            result_queue: 256,
            capture_queue: 100,
        }
    }
}

/// Output configuration for the command line front-end
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormat,
    /// Output file path (None = console only)
    pub output_path: Option<std::path::PathBuf>,
    /// Include timestamps in text output
    pub enable_timestamps: bool,
    /// Enable console output
    pub enable_console: bool,
    /// Include the full magnitude spectrum in JSON output
    pub include_spectrum: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            output_path: None,
            enable_timestamps: true,
            enable_console: true,
            include_spectrum: false,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One human-readable line per frame
    Text,
    /// One JSON object per frame
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
