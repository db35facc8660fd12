//! Audio capture, conditioning and framing

pub mod buffer;
pub mod capture;
pub mod preprocessing;
pub mod segmenter;
pub mod synthetic;

pub use buffer::SampleBuffer;
pub use capture::{
    list_input_devices, ActiveCapture, AudioSample, AudioSource, CaptureEvent, CpalSource,
    SourceFactory,
};
pub use preprocessing::InputConditioner;
pub use segmenter::{AudioFrame, FrameGeometry, FrameSegmenter};
pub use synthetic::{Signal, SignalGenerator, SyntheticSource};
