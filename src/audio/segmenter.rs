//! Slicing of the continuous sample stream into overlapping analysis frames

use std::time::Duration;
use tracing::{debug, trace};

use super::buffer::SampleBuffer;
use crate::config::AnalysisConfig;

/// Frame length and hop, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub length_ms: u32,
    pub space_ms: u32,
}

impl FrameGeometry {
    pub fn new(length_ms: u32, space_ms: u32) -> Self {
        Self {
            length_ms,
            space_ms,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.frame_length_ms, config.frame_space_ms)
    }

    /// Frame length in samples at `sample_rate`
    pub fn length_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.length_ms as u64, sample_rate) as usize
    }

    /// Nominal hop in samples at `sample_rate`
    pub fn hop_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.space_ms as u64, sample_rate) as usize
    }
}

fn ms_to_samples(ms: u64, sample_rate: u32) -> u64 {
    ms * sample_rate as u64 / 1000
}

/// One analysis frame.
///
/// A frame is handed to the pipeline by value (or behind an `Arc` for the
/// parallel stages) and is never modified after it has been cut.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Position in the session's frame sequence, starting at 0
    pub sequence: u64,
    /// Start time relative to the start of the session
    pub timestamp: Duration,
    /// Absolute index of the first sample in the capture stream
    pub start_sample: u64,
    /// Sample rate of `samples`
    pub sample_rate: u32,
    /// Mono samples
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(sequence: u64, timestamp: Duration, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sequence,
            timestamp,
            start_sample: 0,
            sample_rate,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration covered by the frame
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// RMS level of the frame
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }
}

/// Cuts frames out of a sample stream.
///
/// Frame `i` starts `frame_space_ms` after frame `i - 1`. The geometry can be
/// changed between two calls to [`FrameSegmenter::next_frame`], which is the
/// only place a frame is cut, so a change always lands on a frame boundary.
pub struct FrameSegmenter {
    sample_rate: u32,
    buffer: SampleBuffer,
    geometry: FrameGeometry,
    next_sequence: u64,
    last_start_ms: Option<u64>,
}

impl FrameSegmenter {
    pub fn new(sample_rate: u32, geometry: FrameGeometry) -> Self {
        let capacity = geometry.length_samples(sample_rate) * 2;
        Self {
            sample_rate,
            buffer: SampleBuffer::with_capacity(capacity),
            geometry,
            next_sequence: 0,
            last_start_ms: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Replace the geometry; the next frame cut uses it
    pub fn set_geometry(&mut self, geometry: FrameGeometry) {
        if geometry != self.geometry {
            debug!(
                "Frame geometry {}ms/{}ms -> {}ms/{}ms at frame {}",
                self.geometry.length_ms,
                self.geometry.space_ms,
                geometry.length_ms,
                geometry.space_ms,
                self.next_sequence
            );
            self.geometry = geometry;
        }
    }

    /// Append captured samples
    pub fn push(&mut self, samples: &[f32]) {
        self.buffer.write(samples);
    }

    fn next_start_ms(&self) -> u64 {
        match self.last_start_ms {
            None => 0,
            Some(last) => last + self.geometry.space_ms as u64,
        }
    }

    /// Cut the next frame if enough samples have arrived
    pub fn next_frame(&mut self) -> Option<AudioFrame> {
        let start_ms = self.next_start_ms();
        let start_sample = ms_to_samples(start_ms, self.sample_rate);
        let length = self.geometry.length_samples(self.sample_rate);

        let samples = self.buffer.copy_range(start_sample, length)?;

        let frame = AudioFrame {
            sequence: self.next_sequence,
            timestamp: Duration::from_millis(start_ms),
            start_sample,
            sample_rate: self.sample_rate,
            samples,
        };
        trace!(
            "Cut frame {} at {}ms ({} samples)",
            frame.sequence,
            start_ms,
            length
        );

        self.next_sequence += 1;
        self.last_start_ms = Some(start_ms);
        // Later frames never start before this one
        self.buffer.discard_before(start_sample);

        Some(frame)
    }

    /// Lazily drain every frame that is currently complete
    pub fn frames(&mut self) -> impl Iterator<Item = AudioFrame> + '_ {
        std::iter::from_fn(move || self.next_frame())
    }

    /// Number of frames cut so far
    pub fn frames_emitted(&self) -> u64 {
        self.next_sequence
    }

    /// End of stream: drop the trailing partial frame.
    ///
    /// Returns how many buffered samples never became part of a frame.
    pub fn finish(&mut self) -> usize {
        let next_start = ms_to_samples(self.next_start_ms(), self.sample_rate);
        let leftover = self.buffer.end_index().saturating_sub(next_start) as usize;
        if leftover > 0 {
            debug!("Discarding {} trailing samples (partial frame)", leftover);
        }
        self.buffer.discard_before(self.buffer.end_index());
        leftover
    }

    /// Restart the sequence at frame 0, forgetting all buffered samples
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.next_sequence = 0;
        self.last_start_ms = None;
    }
}
