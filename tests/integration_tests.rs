//! Integration tests for speech-analysis

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use speech_analysis::audio::SignalGenerator;
use speech_analysis::config::{AnalysisConfig, TuningConfig};
use speech_analysis::{
    AnalysisEngine, AnalysisEvent, AnalysisResult, AudioFrame, AudioSource, CaptureError,
    ConfigError, EngineConfig, FrameDegeneracy, FrameGeometry, FrameSegmenter, FrameStages,
    Pitch, PitchAlgorithm, SessionState, Signal, SyntheticSource,
};

const SAMPLE_RATE: u32 = 16000;

fn generate(signal: Signal, sample_rate: u32, duration_secs: f64) -> Vec<f32> {
    let mut generator = SignalGenerator::new(signal, sample_rate);
    generator.generate((sample_rate as f64 * duration_secs) as usize)
}

fn frame_from(samples: &[f32], offset: usize, len: usize, sample_rate: u32) -> AudioFrame {
    AudioFrame::new(
        0,
        Duration::ZERO,
        sample_rate,
        samples[offset..offset + len].to_vec(),
    )
}

fn engine_with(signal: Signal, fail_after: Option<u64>) -> AnalysisEngine {
    AnalysisEngine::with_sources(EngineConfig::default(), move || {
        let source = SyntheticSource::new(signal.clone(), SAMPLE_RATE);
        let source = match fail_after {
            Some(samples) => source.fail_after(samples),
            None => source,
        };
        Box::new(source) as Box<dyn AudioSource>
    })
    .expect("Failed to create engine")
}

fn harmonic(f0: f64) -> Signal {
    Signal::Harmonic {
        f0,
        harmonics: 20,
        amplitude: 0.3,
    }
}

/// Collect frames until `count` arrived or the timeout expired
fn collect_frames(results: &Receiver<AnalysisEvent>, count: usize) -> Vec<AnalysisResult> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut frames = Vec::new();
    while frames.len() < count && Instant::now() < deadline {
        match results.recv_timeout(Duration::from_millis(200)) {
            Ok(AnalysisEvent::Frame(result)) => frames.push(result),
            Ok(AnalysisEvent::SessionFailed { error, .. }) => panic!("session failed: {}", error),
            Err(_) => {}
        }
    }
    assert_eq!(frames.len(), count, "timed out waiting for frames");
    frames
}

#[test]
fn test_config_from_toml() {
    let toml_str = r#"
        [audio]
        sample_rate = 44100

        [analysis]
        fft_size = 1024
        lp_order = 20
        frame_space_ms = 20
        pitch_algorithm = 3

        [pipeline]
        workers = 2
    "#;

    let config = EngineConfig::from_toml_str(toml_str).expect("Failed to parse TOML");

    assert_eq!(config.audio.sample_rate, 44100);
    assert_eq!(config.analysis.fft_size, 1024);
    assert_eq!(config.analysis.lp_order, 14);
    assert_eq!(config.analysis.frame_space_ms, 20);
    assert_eq!(config.analysis.pitch_algorithm(), PitchAlgorithm::Cepstrum);
    assert_eq!(config.pipeline.workers, 2);
    assert_eq!(config.tuning, TuningConfig::default());
}

#[test]
fn test_config_rejects_bad_values() {
    assert_eq!(
        EngineConfig::from_toml_str("[analysis]\nfft_size = 1000").err(),
        Some(ConfigError::FftSizeNotPowerOfTwo(1000))
    );
    assert!(matches!(
        EngineConfig::from_toml_str("[analysis]\nfft_size = 4096"),
        Err(ConfigError::FftSizeOutOfRange { .. })
    ));
    assert!(matches!(
        EngineConfig::from_toml_str("[analysis]\npitch_algorithm = 9"),
        Err(ConfigError::AlgorithmIdOutOfRange { kind: "pitch", .. })
    ));
}

#[test]
fn test_fft_size_acceptance() {
    let mut config = AnalysisConfig::default();
    for exponent in 0..16 {
        let size = 1usize << exponent;
        let accepted = config.set_fft_size(size).is_ok();
        assert_eq!(accepted, (64..=2048).contains(&size), "size {}", size);
    }
    assert!(config.set_fft_size(768).is_err());
    assert_eq!(config.fft_size, 2048);
}

#[test]
fn test_frame_timestamps_are_evenly_spaced() {
    let geometry = FrameGeometry::new(35, 15);
    let mut segmenter = FrameSegmenter::new(SAMPLE_RATE, geometry);
    let audio = generate(harmonic(150.0), SAMPLE_RATE, 1.0);

    let mut frames = Vec::new();
    for chunk in audio.chunks(160) {
        segmenter.push(chunk);
        frames.extend(segmenter.frames());
    }

    // (1000 - 35) / 15 + 1
    assert_eq!(frames.len(), 65);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.sequence, i as u64);
        assert_eq!(frame.timestamp, Duration::from_millis(15 * i as u64));
        assert_eq!(frame.start_sample, 240 * i as u64);
        assert_eq!(frame.len(), 560);
        let start = frame.start_sample as usize;
        assert_eq!(frame.samples, audio[start..start + 560].to_vec());
    }
    assert_eq!(segmenter.finish(), 16000 - 65 * 240);
}

#[test]
fn test_sine_peak_bin() {
    let audio = generate(
        Signal::Sine {
            frequency: 1000.0,
            amplitude: 0.8,
        },
        SAMPLE_RATE,
        0.1,
    );
    let mut config = AnalysisConfig::default();
    config.set_fft_size(512).unwrap();
    let stages = FrameStages::build(Arc::new(config), 1, &TuningConfig::default(), SAMPLE_RATE);

    let frame = frame_from(&audio, 0, 560, SAMPLE_RATE);
    let slice = stages.spectrum(&frame);
    assert!(slice.truncated);
    assert_eq!(slice.magnitudes.len(), 257);
    // 1000 Hz / (16000 / 512) = bin 32
    assert_eq!(slice.peak_bin(), Some(32));
    assert!((slice.magnitudes[32] - 0.8).abs() < 0.1);
}

#[test]
fn test_lpc_recovers_vowel_formants() {
    let audio = generate(
        Signal::Vowel {
            f0: 120.0,
            formants: vec![(700.0, 80.0), (1200.0, 90.0), (2600.0, 120.0)],
            amplitude: 0.3,
        },
        SAMPLE_RATE,
        0.5,
    );
    let mut config = AnalysisConfig::default();
    config.set_lp_order(12);
    config.set_max_freq(5000);
    let stages = FrameStages::build(Arc::new(config), 1, &TuningConfig::default(), SAMPLE_RATE);

    // Past the resonators' start-up transient
    let frame = frame_from(&audio, 3200, 560, SAMPLE_RATE);
    let estimate = stages.formants(&frame);

    assert!(estimate.degeneracy.is_none());
    assert!(estimate.len() <= 6);
    let frequencies = estimate.frequencies();
    assert!(frequencies.windows(2).all(|w| w[0] <= w[1]));
    assert!(frequencies.iter().all(|&f| f > 0.0 && f <= 5000.0));
    for expected in [700.0, 1200.0] {
        assert!(
            frequencies
                .iter()
                .any(|&f| (f - expected).abs() < expected * 0.12),
            "no formant near {} Hz in {:?}",
            expected,
            frequencies
        );
    }
}

/// Deterministic white noise through cascaded two-pole resonators
fn resonant_noise(resonances: &[(f64, f64)], sample_rate: u32, len: usize) -> Vec<f32> {
    let sr = sample_rate as f64;
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut signal: Vec<f64> = (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f64 / (1u64 << 52) as f64 - 1.0
        })
        .collect();
    for &(f, bw) in resonances {
        let r = (-std::f64::consts::PI * bw / sr).exp();
        let b = 2.0 * r * (2.0 * std::f64::consts::PI * f / sr).cos();
        let (mut y1, mut y2) = (0.0, 0.0);
        for v in signal.iter_mut() {
            let y = *v + b * y1 - r * r * y2;
            y2 = y1;
            y1 = y;
            *v = y;
        }
    }
    let peak = signal.iter().fold(0.0f64, |a, v| a.max(v.abs()));
    signal.iter().map(|v| (v / peak * 0.5) as f32).collect()
}

#[test]
fn test_lpc_yields_one_formant_per_resonance() {
    let resonances = [
        (500.0, 60.0),
        (1500.0, 80.0),
        (2500.0, 100.0),
        (3500.0, 110.0),
        (4500.0, 120.0),
    ];
    let config = AnalysisConfig::default();
    assert_eq!(config.lp_order / 2, resonances.len());

    for sample_rate in [10000u32, 16000] {
        let stages = FrameStages::build(
            Arc::new(config.clone()),
            1,
            &TuningConfig::default(),
            sample_rate,
        );
        let len = sample_rate as usize * 35 / 1000;
        let audio = resonant_noise(&resonances, sample_rate, len + 4000);
        let estimate = stages.formants(&frame_from(&audio, 4000, len, sample_rate));

        assert!(estimate.degeneracy.is_none());
        assert_eq!(
            estimate.len(),
            config.lp_order / 2,
            "{} Hz: {:?}",
            sample_rate,
            estimate.frequencies()
        );
        for (formant, &(want, _)) in estimate.formants.iter().zip(resonances.iter()) {
            assert!(
                (formant.frequency - want).abs() < (want * 0.08).max(80.0),
                "{} Hz: estimated {:.0} for {:.0}",
                sample_rate,
                formant.frequency,
                want
            );
        }
    }
}

#[test]
fn test_zero_frame_is_degenerate_for_every_algorithm() {
    let frame = AudioFrame::new(0, Duration::ZERO, SAMPLE_RATE, vec![0.0; 560]);
    for algorithm in PitchAlgorithm::ALL {
        let mut config = AnalysisConfig::default();
        config.set_pitch_algorithm(algorithm.id()).unwrap();
        let stages =
            FrameStages::build(Arc::new(config), 1, &TuningConfig::default(), SAMPLE_RATE);
        let result = stages.analyze(0, &frame);

        assert!(result.formants.is_empty());
        assert_eq!(result.formants.degeneracy, Some(FrameDegeneracy::Silent));
        assert_eq!(result.pitch.pitch, Pitch::Unvoiced);
        assert_eq!(result.pitch.confidence, 0.0);
        assert_eq!(result.pitch.algorithm, algorithm);
        assert!(result.spectrum.magnitudes.iter().all(|&m| m == 0.0));
    }
}

#[test]
fn test_pitch_switch_mid_stream() {
    let engine = engine_with(harmonic(150.0), None);
    let settings = engine.settings();
    let results = engine.results();
    engine.toggle_analysis(true).unwrap();

    let mut frames = collect_frames(&results, 10);
    // Both changes land in one snapshot
    engine
        .config()
        .update(|c| {
            c.set_pitch_algorithm(PitchAlgorithm::Yin.id())?;
            Ok(c.set_frame_space_ms(20))
        })
        .unwrap();
    assert_eq!(settings.frame_space(), 20);
    frames.extend(collect_frames(&results, 20));
    engine.toggle_analysis(false).unwrap();

    let mut switched = 0;
    for pair in frames.windows(2) {
        assert!(pair[0].sequence < pair[1].sequence);
        assert!(pair[0].timestamp < pair[1].timestamp);
        assert!(pair[0].config_version <= pair[1].config_version);
    }
    for frame in &frames {
        match frame.config_version {
            1 => assert_eq!(frame.pitch.algorithm, PitchAlgorithm::McLeod),
            _ => {
                assert_eq!(frame.pitch.algorithm, PitchAlgorithm::Yin);
                switched += 1;
            }
        }
    }
    assert!(switched >= 10);

    // Consecutive frames are spaced by the spacing in force for the later one
    for pair in frames.windows(2) {
        if pair[1].sequence == pair[0].sequence + 1 {
            let spacing = if pair[1].config_version == 1 { 15 } else { 20 };
            assert_eq!(
                pair[1].timestamp - pair[0].timestamp,
                Duration::from_millis(spacing)
            );
        }
    }
}

#[test]
fn test_restart_resets_sequence_numbers() {
    let engine = engine_with(harmonic(200.0), None);
    let results = engine.results();

    engine.toggle_analysis(true).unwrap();
    let first = collect_frames(&results, 5);
    engine.toggle_analysis(false).unwrap();
    assert_eq!(engine.state(), SessionState::Idle);

    engine.toggle_analysis(true).unwrap();
    let second = collect_frames(&results, 3);
    engine.toggle_analysis(false).unwrap();

    assert_eq!(first[0].sequence, 0);
    assert_eq!(second[0].sequence, 0);
    assert_eq!(second[0].timestamp, Duration::ZERO);
    assert_ne!(first[0].session, second[0].session);
    assert!(second.iter().all(|f| f.session == second[0].session));
}

#[test]
fn test_capture_failure_reported_once() {
    // 0.3 s of audio, then the device goes away
    let engine = engine_with(harmonic(150.0), Some(4800));
    let results = engine.results();
    engine.toggle_analysis(true).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut events = Vec::new();
    while Instant::now() < deadline {
        match results.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => {
                let failed = matches!(event, AnalysisEvent::SessionFailed { .. });
                events.push(event);
                if failed {
                    break;
                }
            }
            Err(_) => {}
        }
    }
    // Nothing follows the failure notice
    assert!(results.recv_timeout(Duration::from_millis(300)).is_err());

    let failures: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            AnalysisEvent::SessionFailed { error, .. } => Some(error.clone()),
            AnalysisEvent::Frame(_) => None,
        })
        .collect();
    assert_eq!(failures, vec![CaptureError::Disconnected]);
    assert!(matches!(
        events.last(),
        Some(AnalysisEvent::SessionFailed { .. })
    ));

    let frames: Vec<_> = events.iter().filter_map(|e| e.as_frame()).collect();
    assert!(!frames.is_empty());
    assert!(frames.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert_eq!(engine.state(), SessionState::Idle);

    // A failed session can be restarted
    assert_eq!(engine.toggle_analysis(true).unwrap(), SessionState::Running);
    engine.toggle_analysis(false).unwrap();
}
