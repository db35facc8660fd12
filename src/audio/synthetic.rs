//! In-process signal generator usable as a capture source

use crossbeam_channel::{SendTimeoutError, Sender};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::capture::{ActiveCapture, AudioSource, CaptureEvent};
use crate::error::CaptureError;

/// Signal produced by a [`SyntheticSource`]
#[derive(Debug, Clone)]
pub enum Signal {
    Silence,
    /// Pure tone
    Sine { frequency: f64, amplitude: f32 },
    /// Harmonic series with 1/k amplitudes, a crude glottal source
    Harmonic {
        f0: f64,
        harmonics: usize,
        amplitude: f32,
    },
    /// Impulse train at `f0` through cascaded resonators at
    /// `(frequency, bandwidth)` pairs
    Vowel {
        f0: f64,
        formants: Vec<(f64, f64)>,
        amplitude: f32,
    },
    /// Fixed samples, played once
    Samples(Arc<Vec<f32>>),
}

/// Two-pole resonator (difference equation y = a·x + b·y1 + c·y2)
#[derive(Debug, Clone)]
struct Resonator {
    a: f64,
    b: f64,
    c: f64,
    y1: f64,
    y2: f64,
}

impl Resonator {
    fn new(frequency: f64, bandwidth: f64, sample_rate: f64) -> Self {
        let t = 1.0 / sample_rate;
        let c = -(-2.0 * PI * bandwidth * t).exp();
        let b = 2.0 * (-PI * bandwidth * t).exp() * (2.0 * PI * frequency * t).cos();
        Self {
            a: 1.0 - b - c,
            b,
            c,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn run(&mut self, x: f64) -> f64 {
        let y = self.a * x + self.b * self.y1 + self.c * self.y2;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// Sample-accurate generator for a [`Signal`]
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    signal: Signal,
    sample_rate: u32,
    position: u64,
    resonators: Vec<Resonator>,
    vowel_gain: f64,
}

impl SignalGenerator {
    pub fn new(signal: Signal, sample_rate: u32) -> Self {
        let (resonators, vowel_gain) = match &signal {
            Signal::Vowel { f0, formants, .. } => {
                let resonators: Vec<Resonator> = formants
                    .iter()
                    .map(|&(f, bw)| Resonator::new(f, bw, sample_rate as f64))
                    .collect();
                (resonators, Self::vowel_gain(*f0, formants, sample_rate))
            }
            _ => (Vec::new(), 1.0),
        };

        Self {
            signal,
            sample_rate,
            position: 0,
            resonators,
            vowel_gain,
        }
    }

    /// Normalization so the vowel peaks near its nominal amplitude
    fn vowel_gain(f0: f64, formants: &[(f64, f64)], sample_rate: u32) -> f64 {
        let period = (sample_rate as f64 / f0.max(1.0)).round().max(1.0) as usize;
        let mut chain: Vec<Resonator> = formants
            .iter()
            .map(|&(f, bw)| Resonator::new(f, bw, sample_rate as f64))
            .collect();
        let mut peak: f64 = 0.0;
        for n in 0..period * 8 {
            let mut y = if n % period == 0 { 1.0 } else { 0.0 };
            for r in chain.iter_mut() {
                y = r.run(y);
            }
            peak = peak.max(y.abs());
        }
        if peak > 1e-12 {
            1.0 / peak
        } else {
            1.0
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total samples the signal will produce (`None` for endless signals)
    pub fn total_len(&self) -> Option<u64> {
        match &self.signal {
            Signal::Samples(samples) => Some(samples.len() as u64),
            _ => None,
        }
    }

    /// Produce up to `count` samples; fewer only when a finite signal ends
    pub fn generate(&mut self, count: usize) -> Vec<f32> {
        let sr = self.sample_rate as f64;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let n = self.position;
            let t = n as f64 / sr;
            let value = match &self.signal {
                Signal::Silence => 0.0,
                Signal::Sine {
                    frequency,
                    amplitude,
                } => *amplitude * (2.0 * PI * frequency * t).sin() as f32,
                Signal::Harmonic {
                    f0,
                    harmonics,
                    amplitude,
                } => {
                    let mut sum = 0.0;
                    let mut norm = 0.0;
                    for k in 1..=*harmonics {
                        let freq = f0 * k as f64;
                        if freq >= sr / 2.0 {
                            break;
                        }
                        sum += (2.0 * PI * freq * t).sin() / k as f64;
                        norm += 1.0 / k as f64;
                    }
                    if norm > 0.0 {
                        *amplitude * (sum / norm) as f32
                    } else {
                        0.0
                    }
                }
                Signal::Vowel { f0, amplitude, .. } => {
                    // Impulse whenever the phase wraps
                    let phase_now = (n as f64 * f0 / sr).floor();
                    let phase_prev = if n == 0 {
                        -1.0
                    } else {
                        ((n - 1) as f64 * f0 / sr).floor()
                    };
                    let mut y = if phase_now != phase_prev { 1.0 } else { 0.0 };
                    for r in self.resonators.iter_mut() {
                        y = r.run(y);
                    }
                    *amplitude * (y * self.vowel_gain) as f32
                }
                Signal::Samples(samples) => match samples.get(n as usize) {
                    Some(&s) => s,
                    None => break,
                },
            };
            out.push(value);
            self.position += 1;
        }
        out
    }
}

/// Capture source backed by a [`SignalGenerator`] on its own thread
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    signal: Signal,
    sample_rate: u32,
    chunk_size: usize,
    realtime: bool,
    fail_after: Option<u64>,
}

impl SyntheticSource {
    /// Real-time paced source delivering 10 ms chunks
    pub fn new(signal: Signal, sample_rate: u32) -> Self {
        Self {
            signal,
            sample_rate,
            chunk_size: (sample_rate as usize / 100).max(1),
            realtime: true,
            fail_after: None,
        }
    }

    /// Pace delivery in real time (`true`) or as fast as the consumer drains
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn chunk_size(mut self, samples: usize) -> Self {
        self.chunk_size = samples.max(1);
        self
    }

    /// Simulate device loss after `samples` samples have been delivered
    pub fn fail_after(mut self, samples: u64) -> Self {
        self.fail_after = Some(samples);
        self
    }
}

impl AudioSource for SyntheticSource {
    fn describe(&self) -> String {
        let kind = match &self.signal {
            Signal::Silence => "silence".to_string(),
            Signal::Sine { frequency, .. } => format!("sine {} Hz", frequency),
            Signal::Harmonic { f0, harmonics, .. } => {
                format!("harmonic {} Hz x{}", f0, harmonics)
            }
            Signal::Vowel { f0, formants, .. } => {
                format!("vowel {} Hz, {} formants", f0, formants.len())
            }
            Signal::Samples(samples) => format!("{} samples", samples.len()),
        };
        format!("synthetic {} @ {} Hz", kind, self.sample_rate)
    }

    fn open(
        self: Box<Self>,
        sink: Sender<CaptureEvent>,
    ) -> Result<Box<dyn ActiveCapture>, CaptureError> {
        let running = Arc::new(AtomicBool::new(true));
        let sample_rate = self.sample_rate;
        let source = *self;
        let flag = running.clone();

        let handle = std::thread::Builder::new()
            .name("synthetic-source".to_string())
            .spawn(move || source.run(sink, flag))
            .map_err(|e| CaptureError::StreamBuild(e.to_string()))?;

        info!("Synthetic capture started @ {} Hz", sample_rate);
        Ok(Box::new(SyntheticCapture {
            running,
            handle: Some(handle),
            sample_rate,
        }))
    }
}

impl SyntheticSource {
    fn run(self, sink: Sender<CaptureEvent>, running: Arc<AtomicBool>) {
        let mut generator = SignalGenerator::new(self.signal, self.sample_rate);
        let chunk_period =
            Duration::from_secs_f64(self.chunk_size as f64 / self.sample_rate as f64);
        let mut deadline = Instant::now();
        let mut delivered: u64 = 0;

        while running.load(Ordering::Relaxed) {
            let mut want = self.chunk_size;
            if let Some(limit) = self.fail_after {
                if delivered >= limit {
                    warn!("Synthetic source failing after {} samples", delivered);
                    let _ = sink.send_timeout(
                        CaptureEvent::Failed(CaptureError::Disconnected),
                        Duration::from_millis(100),
                    );
                    return;
                }
                want = want.min((limit - delivered) as usize);
            }

            let chunk = generator.generate(want);
            if chunk.is_empty() {
                // Finite signal exhausted; idle until stopped
                std::thread::sleep(Duration::from_millis(5));
                continue;
            }
            delivered += chunk.len() as u64;

            if self.realtime {
                deadline += chunk_period;
                let now = Instant::now();
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
                if sink.try_send(CaptureEvent::Samples(chunk)).is_err() {
                    warn!("Capture queue full - dropping samples");
                }
            } else {
                let mut event = CaptureEvent::Samples(chunk);
                loop {
                    match sink.send_timeout(event, Duration::from_millis(10)) {
                        Ok(()) => break,
                        Err(SendTimeoutError::Timeout(e)) => {
                            if !running.load(Ordering::Relaxed) {
                                return;
                            }
                            event = e;
                        }
                        Err(SendTimeoutError::Disconnected(_)) => return,
                    }
                }
            }
        }
        debug!("Synthetic source delivered {} samples", delivered);
    }
}

struct SyntheticCapture {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl ActiveCapture for SyntheticCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Synthetic source thread panicked");
            }
            info!("Synthetic capture stopped");
        }
    }
}

impl Drop for SyntheticCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
