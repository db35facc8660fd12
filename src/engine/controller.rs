//! Session lifecycle: start and stop analysis, hand out results

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use super::queue::ResultQueue;
use super::session::{Session, SessionContext};
use super::snapshot::ConfigHandle;
use super::{AnalysisEvent, SessionState};
use crate::audio::{AudioSource, CpalSource, SourceFactory};
use crate::bridge::AnalysisSettings;
use crate::config::{EngineConfig, PipelineConfig, TuningConfig};
use crate::error::Result;

/// Owns the configuration and at most one running analysis session.
///
/// Every method takes `&self`; the engine can be shared between a UI thread
/// toggling analysis and a consumer draining [`AnalysisEngine::results`].
pub struct AnalysisEngine {
    config: Arc<ConfigHandle>,
    tuning: TuningConfig,
    pipeline: PipelineConfig,
    sources: Box<dyn SourceFactory>,
    session: Mutex<Option<Session>>,
    sessions_started: Mutex<u64>,
    results: ResultQueue<AnalysisEvent>,
}

impl AnalysisEngine {
    /// Engine capturing from the configured cpal input device
    pub fn new(config: EngineConfig) -> Result<Self> {
        let capture = config.audio.clone();
        Self::with_sources(config, move || {
            Box::new(CpalSource::new(capture.clone())) as Box<dyn AudioSource>
        })
    }

    /// Engine capturing from sources made by `sources`, one per session
    pub fn with_sources<F>(config: EngineConfig, sources: F) -> Result<Self>
    where
        F: SourceFactory + 'static,
    {
        let analysis = config.analysis.normalized()?;
        let results = ResultQueue::new(config.pipeline.result_queue);
        Ok(Self {
            config: Arc::new(ConfigHandle::new(analysis)?),
            tuning: config.tuning,
            pipeline: config.pipeline,
            sources: Box::new(sources),
            session: Mutex::new(None),
            sessions_started: Mutex::new(0),
            results,
        })
    }

    /// Shared configuration; changes apply to running sessions at the next frame
    pub fn config(&self) -> &Arc<ConfigHandle> {
        &self.config
    }

    /// Getter/setter surface over the shared configuration
    pub fn settings(&self) -> AnalysisSettings {
        AnalysisSettings::new(self.config.clone())
    }

    /// Start (`true`) or stop (`false`) analysis.
    ///
    /// Both directions are idempotent. Starting discards any results still
    /// queued from an earlier session, and sequence numbers restart at 0.
    /// Stopping returns once every session thread has exited.
    pub fn toggle_analysis(&self, enabled: bool) -> Result<SessionState> {
        let mut slot = self.session.lock();

        if let Some(session) = slot.as_ref() {
            if session.is_finished() {
                debug!("Reaping finished session {}", session.id());
                if let Some(session) = slot.take() {
                    session.stop();
                }
            }
        }

        if enabled {
            if slot.is_some() {
                return Ok(SessionState::Running);
            }

            let discarded = self.results.clear();
            if discarded > 0 {
                debug!("Discarded {} results from the previous session", discarded);
            }

            let id = {
                let mut started = self.sessions_started.lock();
                *started += 1;
                *started
            };
            let context = SessionContext {
                id,
                config: self.config.clone(),
                tuning: self.tuning.clone(),
                pipeline: self.pipeline.clone(),
                results: self.results.clone(),
            };
            *slot = Some(Session::start(context, self.sources.create())?);
            Ok(SessionState::Running)
        } else {
            if let Some(session) = slot.take() {
                let id = session.id();
                session.stop();
                info!("Session {} stopped", id);
            }
            Ok(SessionState::Idle)
        }
    }

    /// `Running` while a session is capturing; a failed session reads `Idle`
    pub fn state(&self) -> SessionState {
        match self.session.lock().as_ref() {
            Some(session) if !session.is_finished() => SessionState::Running,
            _ => SessionState::Idle,
        }
    }

    /// Id of the current session, if one is running
    pub fn session_id(&self) -> Option<u64> {
        self.session
            .lock()
            .as_ref()
            .filter(|s| !s.is_finished())
            .map(|s| s.id())
    }

    /// Consumer end of the result queue
    pub fn results(&self) -> Receiver<AnalysisEvent> {
        self.results.receiver()
    }

    /// Results discarded because the consumer fell behind
    pub fn dropped_results(&self) -> u64 {
        self.results.dropped()
    }
}

impl Drop for AnalysisEngine {
    fn drop(&mut self) {
        if let Some(session) = self.session.lock().take() {
            session.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{Signal, SyntheticSource};
    use crate::error::{AnalysisError, CaptureError};
    use crossbeam_channel::Sender;
    use std::time::Duration;

    fn sine_engine() -> AnalysisEngine {
        AnalysisEngine::with_sources(EngineConfig::default(), || {
            Box::new(SyntheticSource::new(
                Signal::Sine {
                    frequency: 440.0,
                    amplitude: 0.5,
                },
                16000,
            )) as Box<dyn AudioSource>
        })
        .unwrap()
    }

    struct Unopenable;

    impl AudioSource for Unopenable {
        fn describe(&self) -> String {
            "unopenable".to_string()
        }

        fn open(
            self: Box<Self>,
            _sink: Sender<crate::audio::CaptureEvent>,
        ) -> std::result::Result<Box<dyn crate::audio::ActiveCapture>, CaptureError> {
            Err(CaptureError::NoInputDevice)
        }
    }

    #[test]
    fn test_toggle_is_idempotent() {
        let engine = sine_engine();
        assert_eq!(engine.state(), SessionState::Idle);
        assert_eq!(engine.toggle_analysis(false).unwrap(), SessionState::Idle);

        assert_eq!(engine.toggle_analysis(true).unwrap(), SessionState::Running);
        let id = engine.session_id();
        assert_eq!(engine.toggle_analysis(true).unwrap(), SessionState::Running);
        assert_eq!(engine.session_id(), id);

        assert_eq!(engine.toggle_analysis(false).unwrap(), SessionState::Idle);
        assert_eq!(engine.state(), SessionState::Idle);
        assert_eq!(engine.session_id(), None);
    }

    #[test]
    fn test_results_flow() {
        let engine = sine_engine();
        let results = engine.results();
        engine.toggle_analysis(true).unwrap();

        let event = results.recv_timeout(Duration::from_secs(5)).unwrap();
        match event {
            AnalysisEvent::Frame(result) => {
                assert_eq!(result.sequence, 0);
                assert_eq!(result.config_version, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        engine.toggle_analysis(false).unwrap();
    }

    #[test]
    fn test_open_failure_leaves_engine_idle() {
        let engine =
            AnalysisEngine::with_sources(EngineConfig::default(), || {
                Box::new(Unopenable) as Box<dyn AudioSource>
            })
            .unwrap();

        match engine.toggle_analysis(true) {
            Err(AnalysisError::Capture(CaptureError::NoInputDevice)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(engine.state(), SessionState::Idle);
        assert!(engine.results().try_recv().is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.analysis.fft_size = 100;
        assert!(AnalysisEngine::with_sources(config, || {
            Box::new(Unopenable) as Box<dyn AudioSource>
        })
        .is_err());
    }
}
