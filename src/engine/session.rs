//! One analysis session: capture thread, worker pool and in-order emitter

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use super::queue::ResultQueue;
use super::reorder::ReorderBuffer;
use super::snapshot::{ConfigHandle, ConfigSnapshot};
use super::AnalysisEvent;
use crate::analysis::{
    AnalysisResult, FormantAlgorithm, FormantEstimate, FormantTracker, FrameStages,
    PitchEstimate, SpectralSlice,
};
use crate::audio::{
    AudioFrame, AudioSource, CaptureEvent, FrameGeometry, FrameSegmenter, InputConditioner,
};
use crate::config::{AnalysisConfig, PipelineConfig, TuningConfig};
use crate::error::{AnalysisError, CaptureError};

/// Longest the capture thread waits for samples before checking for stop
const MAX_POLL: Duration = Duration::from_millis(25);

/// Everything a session needs from its engine
pub(crate) struct SessionContext {
    pub id: u64,
    pub config: Arc<ConfigHandle>,
    pub tuning: TuningConfig,
    pub pipeline: PipelineConfig,
    pub results: ResultQueue<AnalysisEvent>,
}

/// A frame in the worker pool, with the stages it was dispatched against
struct FrameJob {
    frame: AudioFrame,
    stages: Arc<FrameStages>,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Spectrum,
    Formants,
    Pitch,
}

const STAGES: [Stage; 3] = [Stage::Spectrum, Stage::Formants, Stage::Pitch];

enum StageOutput {
    Spectrum(SpectralSlice),
    Formants(FormantEstimate),
    Pitch(PitchEstimate),
}

/// Messages into the emitter thread
enum EmitterMessage {
    Done {
        job: Arc<FrameJob>,
        output: StageOutput,
    },
    /// Frame dropped under backpressure; never arrives
    Skipped(u64),
    Failed(CaptureError),
}

/// Stage outputs collected so far for one frame
struct Assembly {
    job: Arc<FrameJob>,
    spectrum: Option<SpectralSlice>,
    formants: Option<FormantEstimate>,
    pitch: Option<PitchEstimate>,
}

impl Assembly {
    fn new(job: Arc<FrameJob>) -> Self {
        Self {
            job,
            spectrum: None,
            formants: None,
            pitch: None,
        }
    }

    fn add(&mut self, output: StageOutput) {
        match output {
            StageOutput::Spectrum(s) => self.spectrum = Some(s),
            StageOutput::Formants(f) => self.formants = Some(f),
            StageOutput::Pitch(p) => self.pitch = Some(p),
        }
    }

    fn is_complete(&self) -> bool {
        self.spectrum.is_some() && self.formants.is_some() && self.pitch.is_some()
    }

    fn finish(self, session: u64) -> Option<(AnalysisResult, Arc<FrameJob>)> {
        let result = AnalysisResult {
            session,
            sequence: self.job.frame.sequence,
            timestamp: self.job.frame.timestamp,
            config_version: self.job.stages.config_version(),
            spectrum: self.spectrum?,
            formants: self.formants?,
            pitch: self.pitch?,
        };
        Some((result, self.job))
    }
}

/// A running session. Dropping it stops it.
pub(crate) struct Session {
    id: u64,
    running: Arc<AtomicBool>,
    driver: Option<JoinHandle<()>>,
    emitter: Option<JoinHandle<()>>,
}

impl Session {
    /// Open `source` and start analysing.
    ///
    /// Returns once the source is delivering samples, or with the error that
    /// kept it from opening.
    pub fn start(
        context: SessionContext,
        source: Box<dyn AudioSource>,
    ) -> Result<Self, AnalysisError> {
        let id = context.id;
        let running = Arc::new(AtomicBool::new(true));
        let (emit_tx, emit_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        info!("Starting session {} on {}", id, source.describe());

        let in_flight = Arc::new(AtomicUsize::new(0));

        let emitter = {
            let tuning = context.tuning.clone();
            let results = context.results.clone();
            let in_flight = in_flight.clone();
            thread::Builder::new()
                .name(format!("emitter-{}", id))
                .spawn(move || run_emitter(id, emit_rx, results, tuning, in_flight))?
        };

        let flag = running.clone();
        let driver = match thread::Builder::new()
            .name(format!("capture-{}", id))
            .spawn(move || run_driver(context, source, flag, emit_tx, ready_tx, in_flight))
        {
            Ok(driver) => driver,
            Err(e) => {
                // emit_tx went down with the closure, so the emitter exits
                let _ = emitter.join();
                return Err(e.into());
            }
        };

        let mut session = Self {
            id,
            running,
            driver: Some(driver),
            emitter: Some(emitter),
        };

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => {
                info!("Session {} running @ {} Hz", id, sample_rate);
                Ok(session)
            }
            Ok(Err(e)) => {
                session.join();
                Err(AnalysisError::Capture(e))
            }
            Err(_) => {
                session.join();
                Err(AnalysisError::Channel(
                    "capture thread exited before opening the source".to_string(),
                ))
            }
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the session ended by itself (capture failure)
    pub fn is_finished(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    /// Stop capture and wait for every thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join();
    }

    fn join(&mut self) {
        if self.driver.is_none() && self.emitter.is_none() {
            return;
        }
        if let Some(driver) = self.driver.take() {
            if driver.join().is_err() {
                error!("Capture thread of session {} panicked", self.id);
            }
        }
        if let Some(emitter) = self.emitter.take() {
            if emitter.join().is_err() {
                error!("Emitter thread of session {} panicked", self.id);
            }
        }
        debug!("Session {} joined", self.id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Capture thread: opens the source, segments frames and feeds the workers
fn run_driver(
    context: SessionContext,
    source: Box<dyn AudioSource>,
    running: Arc<AtomicBool>,
    emit_tx: Sender<EmitterMessage>,
    ready_tx: Sender<Result<u32, CaptureError>>,
    in_flight: Arc<AtomicUsize>,
) {
    let (capture_tx, capture_rx) = bounded(context.pipeline.capture_queue.max(1));
    let mut capture = match source.open(capture_tx) {
        Ok(capture) => capture,
        Err(e) => {
            error!("Failed to open capture source: {}", e);
            running.store(false, Ordering::SeqCst);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let sample_rate = capture.sample_rate();
    let _ = ready_tx.send(Ok(sample_rate));

    let mut conditioner = match InputConditioner::new(context.tuning.highpass_hz, sample_rate) {
        Ok(conditioner) => conditioner,
        Err(e) => {
            warn!("Input conditioning disabled: {}", e);
            InputConditioner::disabled()
        }
    };

    let mut snapshot = context.config.load();
    let mut stages = build_stages(&snapshot, &context.tuning, sample_rate);
    let mut segmenter =
        FrameSegmenter::new(sample_rate, FrameGeometry::from_config(&snapshot.config));

    let (job_tx, job_rx) = unbounded::<(Arc<FrameJob>, Stage)>();
    let workers: Vec<JoinHandle<()>> = (0..context.pipeline.workers.max(1))
        .filter_map(|i| {
            let job_rx = job_rx.clone();
            let emit_tx = emit_tx.clone();
            thread::Builder::new()
                .name(format!("analysis-{}-{}", context.id, i))
                .spawn(move || run_worker(job_rx, emit_tx))
                .map_err(|e| error!("Failed to spawn analysis worker: {}", e))
                .ok()
        })
        .collect();
    drop(job_rx);

    let max_in_flight = context.pipeline.max_in_flight.max(1);
    let mut stats = DriverStats::default();
    let mut failure = None;

    while running.load(Ordering::SeqCst) {
        let poll = snapshot.config.frame_space().min(MAX_POLL);
        let mut chunk = match capture_rx.recv_timeout(poll) {
            Ok(CaptureEvent::Samples(chunk)) => chunk,
            Ok(CaptureEvent::Failed(e)) => {
                error!("Capture failed in session {}: {}", context.id, e);
                failure = Some(e);
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                error!("Capture source of session {} went away", context.id);
                failure = Some(CaptureError::Disconnected);
                break;
            }
        };

        conditioner.process(&mut chunk);
        segmenter.push(&chunk);

        loop {
            // Configuration changes take effect at the next frame boundary
            let current = context.config.load();
            if current.version != snapshot.version {
                debug!(
                    "Session {} switching to config v{} at frame {}",
                    context.id,
                    current.version,
                    segmenter.frames_emitted()
                );
                segmenter.set_geometry(FrameGeometry::from_config(&current.config));
                stages = build_stages(&current, &context.tuning, sample_rate);
                snapshot = current;
            }

            let frame = match segmenter.next_frame() {
                Some(frame) => frame,
                None => break,
            };
            let sequence = frame.sequence;

            if in_flight.load(Ordering::SeqCst) >= max_in_flight {
                trace!("Worker pool saturated - dropping frame {}", sequence);
                stats.dropped += 1;
                let _ = emit_tx.send(EmitterMessage::Skipped(sequence));
                continue;
            }

            in_flight.fetch_add(1, Ordering::SeqCst);
            stats.dispatched += 1;
            let job = Arc::new(FrameJob {
                frame,
                stages: stages.clone(),
            });
            for stage in STAGES {
                let _ = job_tx.send((job.clone(), stage));
            }
        }
    }

    capture.stop();
    let discarded = segmenter.finish();
    if discarded > 0 {
        debug!("Discarded {} trailing samples", discarded);
    }

    // Let the workers finish what was dispatched before reporting a failure
    drop(job_tx);
    for worker in workers {
        if worker.join().is_err() {
            error!("Analysis worker panicked");
        }
    }

    if let Some(e) = failure {
        running.store(false, Ordering::SeqCst);
        let _ = emit_tx.send(EmitterMessage::Failed(e));
    }
    stats.log(context.id);
}

fn build_stages(
    snapshot: &ConfigSnapshot,
    tuning: &TuningConfig,
    sample_rate: u32,
) -> Arc<FrameStages> {
    Arc::new(FrameStages::build(
        snapshot.config.clone(),
        snapshot.version,
        tuning,
        sample_rate,
    ))
}

#[derive(Debug, Default)]
struct DriverStats {
    dispatched: u64,
    dropped: u64,
}

impl DriverStats {
    fn log(&self, session: u64) {
        info!(
            "Session {} capture stopped: {} frames analysed, {} dropped",
            session, self.dispatched, self.dropped
        );
    }
}

fn run_worker(jobs: Receiver<(Arc<FrameJob>, Stage)>, emit_tx: Sender<EmitterMessage>) {
    for (job, stage) in jobs.iter() {
        let output = match stage {
            Stage::Spectrum => StageOutput::Spectrum(job.stages.spectrum(&job.frame)),
            Stage::Formants => StageOutput::Formants(job.stages.formants(&job.frame)),
            Stage::Pitch => StageOutput::Pitch(job.stages.pitch(&job.frame)),
        };
        if emit_tx.send(EmitterMessage::Done { job, output }).is_err() {
            break;
        }
    }
}

/// Formant smoothing state, rebuilt when a setting that shapes formant
/// estimates changes
struct TrackerState {
    config: AnalysisConfig,
    tracker: FormantTracker,
}

/// Emitter thread: assembles stage outputs and publishes results in order
fn run_emitter(
    session: u64,
    messages: Receiver<EmitterMessage>,
    results: ResultQueue<AnalysisEvent>,
    tuning: TuningConfig,
    in_flight: Arc<AtomicUsize>,
) {
    let started = Instant::now();
    let mut assembling: HashMap<u64, Assembly> = HashMap::new();
    let mut reorder = ReorderBuffer::new();
    let mut tracker: Option<TrackerState> = None;
    let mut failure = None;
    let mut emitted: u64 = 0;

    for message in messages.iter() {
        match message {
            EmitterMessage::Done { job, output } => {
                let sequence = job.frame.sequence;
                let assembly = assembling
                    .entry(sequence)
                    .or_insert_with(|| Assembly::new(job));
                assembly.add(output);
                if assembly.is_complete() {
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    if let Some(done) = assembling
                        .remove(&sequence)
                        .and_then(|assembly| assembly.finish(session))
                    {
                        reorder.insert(sequence, done);
                    }
                }
            }
            EmitterMessage::Skipped(sequence) => reorder.skip(sequence),
            EmitterMessage::Failed(e) => failure = Some(e),
        }

        while let Some((mut result, job)) = reorder.pop() {
            smooth_formants(&mut tracker, &mut result, &job, &tuning);
            results.push(AnalysisEvent::Frame(result));
            emitted += 1;
        }
    }

    if !reorder.is_empty() || !assembling.is_empty() {
        warn!(
            "Session {} ended with {} frames unresolved",
            session,
            reorder.len() + assembling.len()
        );
    }

    if let Some(error) = failure {
        results.push(AnalysisEvent::SessionFailed { session, error });
    }

    debug!(
        "Session {} emitted {} results in {:.1}s",
        session,
        emitted,
        started.elapsed().as_secs_f32()
    );
}

fn smooth_formants(
    state: &mut Option<TrackerState>,
    result: &mut AnalysisResult,
    job: &FrameJob,
    tuning: &TuningConfig,
) {
    let config = job.stages.config();
    if config.formant_algorithm() != FormantAlgorithm::Kalman {
        *state = None;
        return;
    }

    let stale = state
        .as_ref()
        .map_or(true, |s| !config.keeps_formant_tracks(&s.config));
    if stale {
        trace!("Formant tracker reset at config v{}", result.config_version);
        *state = Some(TrackerState {
            config: config.clone(),
            tracker: FormantTracker::new(tuning, config.max_freq as f64, config.max_formants()),
        });
    }

    if let Some(state) = state.as_mut() {
        let dt = config.frame_space().as_secs_f64();
        result.formants = state.tracker.update(&result.formants, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Formant;

    fn job(config: &AnalysisConfig, version: u64) -> FrameJob {
        let stages = FrameStages::build(
            Arc::new(config.clone()),
            version,
            &TuningConfig::default(),
            16000,
        );
        FrameJob {
            frame: AudioFrame::new(0, Duration::ZERO, 16000, vec![0.0; 560]),
            stages: Arc::new(stages),
        }
    }

    /// Smooth one measured F1 under `job` and return the tracked value
    fn track(state: &mut Option<TrackerState>, job: &FrameJob, f1: f64) -> f64 {
        let mut result = job.stages.analyze(1, &job.frame);
        result.formants = FormantEstimate {
            formants: vec![Formant {
                frequency: f1,
                bandwidth: 80.0,
            }],
            degeneracy: None,
        };
        smooth_formants(state, &mut result, job, &TuningConfig::default());
        result.formants.formants[0].frequency
    }

    fn kalman_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config
            .set_formant_algorithm(FormantAlgorithm::Kalman.id())
            .unwrap();
        config
    }

    #[test]
    fn test_tracker_survives_display_changes() {
        let config = kalman_config();
        let mut state = None;
        assert_eq!(track(&mut state, &job(&config, 1), 700.0), 700.0);

        let mut recolored = config.clone();
        recolored.set_max_gain_db(-10);
        recolored.set_pitch_algorithm(1).unwrap();
        let smoothed = track(&mut state, &job(&recolored, 2), 900.0);
        assert!(smoothed > 700.0 && smoothed < 900.0, "tracked {}", smoothed);
    }

    #[test]
    fn test_tracker_resets_on_formant_changes() {
        let config = kalman_config();
        let mut state = None;
        track(&mut state, &job(&config, 1), 700.0);

        let mut reordered = config.clone();
        reordered.set_lp_order(12);
        assert_eq!(track(&mut state, &job(&reordered, 2), 900.0), 900.0);
    }

    #[test]
    fn test_tracker_dropped_without_kalman() {
        let mut state = None;
        let raw = AnalysisConfig::default();
        assert_eq!(track(&mut state, &job(&raw, 1), 700.0), 700.0);
        assert!(state.is_none());
    }
}
