//! Speech analysis CLI application

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::RecvTimeoutError;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use speech_analysis::audio::list_input_devices;
use speech_analysis::config::OutputFormat;
use speech_analysis::{
    AnalysisEngine, AnalysisEvent, AnalysisSettings, AudioSource, EngineConfig,
    FormantAlgorithm, OutputWriter, PitchAlgorithm, Signal, SyntheticSource,
};

/// Real-time speech analysis
#[derive(Parser)]
#[command(name = "speech-analysis")]
#[command(about = "Live spectrum, formant and pitch analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

/// Overrides shared by every analysing command
#[derive(clap::Args)]
struct AnalysisArgs {
    /// Output file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Disable console output
    #[arg(long)]
    no_console: bool,

    /// FFT size (power of two, 64-2048)
    #[arg(long)]
    fft_size: Option<usize>,

    /// Linear prediction order
    #[arg(long)]
    lp_order: Option<usize>,

    /// Pitch algorithm id (see `algorithms`)
    #[arg(long)]
    pitch: Option<usize>,

    /// Formant algorithm id (see `algorithms`)
    #[arg(long)]
    formant: Option<usize>,

    /// Stop after this many seconds
    #[arg(short, long)]
    seconds: Option<f32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DemoSignal {
    Sine,
    Harmonic,
    Vowel,
    Silence,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse live input
    Run {
        /// Audio input device name (uses default if not specified)
        #[arg(short, long)]
        device: Option<String>,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Analyse a generated test signal
    Demo {
        /// Signal to generate
        #[arg(long, value_enum, default_value = "vowel")]
        signal: DemoSignal,

        /// Fundamental or tone frequency (Hz)
        #[arg(long, default_value = "140")]
        frequency: f64,

        /// Sample rate of the generated signal (Hz)
        #[arg(long, default_value = "16000")]
        sample_rate: u32,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// List available audio input devices
    Devices,

    /// List pitch and formant algorithms with their ids
    Algorithms,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging - quiet by default, use -v for more
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    // Load configuration
    let mut config = if let Some(ref config_path) = cli.config {
        EngineConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        EngineConfig::default()
    };

    match cli.command {
        Commands::Run { device, analysis } => {
            if let Some(device) = device {
                config.audio.device = Some(device);
            }
            apply_output_args(&mut config, &analysis);
            let engine = AnalysisEngine::new(config.clone())
                .context("Failed to create analysis engine")?;
            apply_analysis_args(&engine.settings(), &analysis)?;
            run_analysis(&engine, config, analysis.seconds)
        }
        Commands::Demo {
            signal,
            frequency,
            sample_rate,
            analysis,
        } => {
            apply_output_args(&mut config, &analysis);
            let signal = demo_signal(signal, frequency);
            let engine = AnalysisEngine::with_sources(config.clone(), move || {
                Box::new(SyntheticSource::new(signal.clone(), sample_rate)) as Box<dyn AudioSource>
            })
            .context("Failed to create analysis engine")?;
            apply_analysis_args(&engine.settings(), &analysis)?;
            run_analysis(&engine, config, analysis.seconds.or(Some(3.0)))
        }
        Commands::Devices => list_devices(),
        Commands::Algorithms => {
            list_algorithms();
            Ok(())
        }
    }
}

fn apply_output_args(config: &mut EngineConfig, args: &AnalysisArgs) {
    if let Some(ref output) = args.output {
        config.output.output_path = Some(output.clone());
    }
    config.output.format = match args.format.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Text,
    };
    config.output.enable_console = !args.no_console;
}

fn apply_analysis_args(settings: &AnalysisSettings, args: &AnalysisArgs) -> Result<()> {
    if let Some(size) = args.fft_size {
        settings.set_fft_size(size).context("Invalid FFT size")?;
    }
    if let Some(order) = args.lp_order {
        let applied = settings.set_lp_order(order)?;
        if applied != order {
            warn!("LP order {} clamped to {}", order, applied);
        }
    }
    if let Some(id) = args.pitch {
        settings
            .set_pitch_algorithm(id)
            .context("Invalid pitch algorithm")?;
    }
    if let Some(id) = args.formant {
        settings
            .set_formant_algorithm(id)
            .context("Invalid formant algorithm")?;
    }
    Ok(())
}

fn demo_signal(kind: DemoSignal, frequency: f64) -> Signal {
    match kind {
        DemoSignal::Sine => Signal::Sine {
            frequency,
            amplitude: 0.5,
        },
        DemoSignal::Harmonic => Signal::Harmonic {
            f0: frequency,
            harmonics: 30,
            amplitude: 0.3,
        },
        DemoSignal::Vowel => Signal::Vowel {
            f0: frequency,
            formants: vec![(730.0, 90.0), (1090.0, 110.0), (2440.0, 170.0)],
            amplitude: 0.3,
        },
        DemoSignal::Silence => Signal::Silence,
    }
}

/// Statistics for one analysis run
struct RunStats {
    frames: u64,
    voiced: u64,
    failures: u64,
    start_time: Instant,
}

impl RunStats {
    fn new() -> Self {
        Self {
            frames: 0,
            voiced: 0,
            failures: 0,
            start_time: Instant::now(),
        }
    }

    fn log_summary(&self, dropped: u64) {
        info!(
            "Run complete: {} frames ({} voiced), {} capture failures, {} results dropped, duration: {:.1}s",
            self.frames,
            self.voiced,
            self.failures,
            dropped,
            self.start_time.elapsed().as_secs_f32()
        );
    }
}

/// Drive a session until Ctrl+C, the time limit, or repeated capture failure
fn run_analysis(engine: &AnalysisEngine, config: EngineConfig, seconds: Option<f32>) -> Result<()> {
    // Setup signal handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut output =
        OutputWriter::new(config.output.clone()).context("Failed to create output writer")?;
    let results = engine.results();
    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs_f32(s.max(0.0)));
    let mut stats = RunStats::new();

    // Device reconnection loop
    let mut reconnect_attempts = 0;
    const MAX_RECONNECT_ATTEMPTS: u32 = 5;
    const RECONNECT_DELAY: Duration = Duration::from_secs(2);

    engine
        .toggle_analysis(true)
        .context("Failed to start analysis")?;
    info!("Analysing... Press Ctrl+C to stop");

    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }

        let event = match results.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        output.write(&event)?;

        match event {
            AnalysisEvent::Frame(result) => {
                reconnect_attempts = 0;
                stats.frames += 1;
                if result.pitch.is_voiced() {
                    stats.voiced += 1;
                }
            }
            AnalysisEvent::SessionFailed { error, .. } => {
                stats.failures += 1;
                reconnect_attempts += 1;
                if reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
                    anyhow::bail!("Max reconnection attempts exceeded: {}", error);
                }
                warn!(
                    "Capture failed (attempt {}/{}): {}. Retrying in {:?}...",
                    reconnect_attempts, MAX_RECONNECT_ATTEMPTS, error, RECONNECT_DELAY
                );
                std::thread::sleep(RECONNECT_DELAY);
                if let Err(e) = engine.toggle_analysis(true) {
                    warn!("Restart failed: {}", e);
                }
            }
        }
    }

    engine.toggle_analysis(false)?;
    output.flush()?;
    stats.log_summary(engine.dropped_results());

    Ok(())
}

/// List available audio input devices
fn list_devices() -> Result<()> {
    let devices = list_input_devices()?;

    if devices.is_empty() {
        println!("No audio input devices found");
    } else {
        println!("Available audio input devices:");
        for (i, name) in devices.iter().enumerate() {
            println!("  {}. {}", i + 1, name);
        }
    }

    Ok(())
}

fn list_algorithms() {
    println!("Pitch algorithms:");
    for algorithm in PitchAlgorithm::ALL {
        println!("  {}. {}", algorithm.id(), algorithm.name());
    }
    println!("Formant algorithms:");
    for algorithm in FormantAlgorithm::ALL {
        println!("  {}. {}", algorithm.id(), algorithm.name());
    }
    println!();
    println!("speech-analysis {}", speech_analysis::bridge::version_string());
}
