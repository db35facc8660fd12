//! Benchmarks for formant estimation and pitch detection

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;

use speech_analysis::audio::SignalGenerator;
use speech_analysis::config::{AnalysisConfig, TuningConfig};
use speech_analysis::{AudioFrame, FrameStages, PitchAlgorithm, Signal};

fn vowel_frame(sample_rate: u32) -> AudioFrame {
    let mut generator = SignalGenerator::new(
        Signal::Vowel {
            f0: 120.0,
            formants: vec![(700.0, 80.0), (1200.0, 90.0), (2600.0, 120.0)],
            amplitude: 0.3,
        },
        sample_rate,
    );
    let len = sample_rate as usize * 35 / 1000;
    let audio = generator.generate(len * 4);
    AudioFrame::new(0, Duration::ZERO, sample_rate, audio[len * 3..].to_vec())
}

fn bench_formants(c: &mut Criterion) {
    let mut group = c.benchmark_group("formants");

    for sample_rate in [16000, 48000] {
        let frame = vowel_frame(sample_rate);
        for lp_order in [8, 14] {
            let mut config = AnalysisConfig::default();
            config.set_lp_order(lp_order);
            let stages =
                FrameStages::build(Arc::new(config), 1, &TuningConfig::default(), sample_rate);

            group.bench_with_input(
                BenchmarkId::new(format!("lpc{}", lp_order), sample_rate),
                &frame,
                |b, frame| b.iter(|| black_box(stages.formants(frame))),
            );
        }
    }

    group.finish();
}

fn bench_pitch(c: &mut Criterion) {
    let mut group = c.benchmark_group("pitch");

    let frame = vowel_frame(16000);
    for algorithm in PitchAlgorithm::ALL {
        let mut config = AnalysisConfig::default();
        config.set_pitch_algorithm(algorithm.id()).unwrap();
        let stages = FrameStages::build(Arc::new(config), 1, &TuningConfig::default(), 16000);

        group.bench_with_input(
            BenchmarkId::new(algorithm.name(), 16000),
            &frame,
            |b, frame| b.iter(|| black_box(stages.pitch(frame))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_formants, bench_pitch);
criterion_main!(benches);
