//! Real-time speech analysis
//!
//! Captures a continuous audio stream and produces, for every analysis frame,
//! a magnitude spectrum, a set of formants and a pitch estimate. All analysis
//! parameters can be changed while a session is running; changes take effect
//! at the next frame boundary.
//!
//! # Architecture
//!
//! The system is organized into the following modules:
//!
//! - `audio`: Capture sources, input conditioning and frame segmentation
//! - `dsp`: Windows, FFT resampling, linear prediction and polynomial roots
//! - `analysis`: Spectral analyzer, formant estimators and pitch detectors
//! - `engine`: Configuration snapshots, sessions and result delivery
//! - `bridge`: Getter/setter surface for front-ends
//! - `output`: Output formatting and writing
//! - `config`: Configuration structures
//! - `error`: Error types
//!
//! # Example
//!
//! ```no_run
//! use speech_analysis::{AnalysisEngine, AnalysisEvent, EngineConfig};
//!
//! let engine = AnalysisEngine::new(EngineConfig::default()).unwrap();
//! let settings = engine.settings();
//! settings.set_pitch_algorithm(1).unwrap();
//!
//! let results = engine.results();
//! engine.toggle_analysis(true).unwrap();
//! for event in results.iter().take(100) {
//!     if let AnalysisEvent::Frame(frame) = event {
//!         println!("{:?} {:?}", frame.timestamp, frame.pitch.frequency());
//!     }
//! }
//! engine.toggle_analysis(false).unwrap();
//! ```

pub mod analysis;
pub mod audio;
pub mod bridge;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod output;

// Re-exports for convenience
pub use analysis::{
    AnalysisResult, Formant, FormantAlgorithm, FormantEstimate, FrameStages, Pitch,
    PitchAlgorithm, PitchEstimate, SpectralSlice,
};
pub use audio::{
    AudioFrame, AudioSource, CpalSource, FrameGeometry, FrameSegmenter, Signal, SyntheticSource,
};
pub use bridge::AnalysisSettings;
pub use config::{AnalysisConfig, Color, EngineConfig, OutputConfig, TuningConfig};
pub use engine::{AnalysisEngine, AnalysisEvent, ConfigHandle, ConfigSnapshot, SessionState};
pub use error::{AnalysisError, CaptureError, ConfigError, FrameDegeneracy, Result};
pub use output::OutputWriter;
