//! Error types for the speech analysis engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Capture-related errors.
///
/// Any of these ends the current session. They are cloneable because the
/// session forwards the failure to the consumer as an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("No audio input device available")]
    NoInputDevice,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device configuration: {0}")]
    DeviceConfig(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("Stream playback error: {0}")]
    StreamPlay(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio stream failed: {0}")]
    Stream(String),

    #[error("Capture source disconnected")]
    Disconnected,
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("FFT size {0} is not a power of two")]
    FftSizeNotPowerOfTwo(usize),

    #[error("FFT size {size} outside [{min}, {max}]")]
    FftSizeOutOfRange { size: usize, min: usize, max: usize },

    #[error("{kind} algorithm id {id} out of range (0..{count})")]
    AlgorithmIdOutOfRange {
        kind: &'static str,
        id: usize,
        count: usize,
    },

    #[error("Formant color index {index} out of range (0..{count})")]
    FormantIndexOutOfRange { index: usize, count: usize },
}

/// Why a single frame produced an empty or sentinel estimate.
///
/// These are expected, per-frame outcomes and never abort a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDegeneracy {
    /// Frame energy below the silence gate
    Silent,
    /// Levinson-Durbin hit a reflection coefficient with |k| >= 1
    Unstable,
    /// No periodicity strong enough to call the frame voiced
    NoPeriodicity,
    /// Frame too short for the requested analysis
    TooShort,
}

impl std::fmt::Display for FrameDegeneracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameDegeneracy::Silent => write!(f, "silent"),
            FrameDegeneracy::Unstable => write!(f, "unstable"),
            FrameDegeneracy::NoPeriodicity => write!(f, "no-periodicity"),
            FrameDegeneracy::TooShort => write!(f, "too-short"),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
