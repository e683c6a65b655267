//! # DualSense Collector
//!
//! Record PS5 DualSense telemetry for research sessions.
//!
//! This application samples controller buttons, gyroscope and accelerometer
//! at ~250Hz into a CSV file per session, optionally capturing the controller
//! microphone into a companion WAV file. It can also generate chirp test
//! signals for the controller speaker.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tokio::time::{interval, sleep, Duration, Instant};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use dualsense_collector::audio::{playback, CpalAudioSource};
use dualsense_collector::chirp::{self, ChirpParams};
use dualsense_collector::config::{ChirpConfig, Config, LoggingConfig, RecorderConfig};
use dualsense_collector::controller::ps5::DualSenseNodes;
use dualsense_collector::controller::{
    Button, ButtonEdge, DualSenseSource, EdgeDetector, SensorSource,
};
use dualsense_collector::recorder::{Recorder, SessionSummary};
use dualsense_collector::sequence::{self, ButtonSequence, Progress};

/// Configuration file used when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// How often the CLI polls the controller for sequence prompts
const POLL_INTERVAL_MS: u64 = 50;

/// Seconds between status log messages while recording
const STATUS_INTERVAL_SECS: u64 = 5;

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "dualsense-collector.log";

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (built-in defaults apply when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record controller telemetry to CSV, and optionally microphone audio to WAV
    Record(RecordArgs),

    /// Write a linear chirp test signal to a WAV file, and optionally play it
    Chirp(ChirpArgs),
}

#[derive(Debug, Args)]
struct RecordArgs {
    /// Session id used in file names and every row
    #[arg(short, long)]
    session: Option<String>,

    /// Output directory for session files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Capture the controller microphone alongside the telemetry
    #[arg(long)]
    audio: bool,

    /// Prompt a button sequence and stop when it is complete
    /// (comma-separated, defaults to cross,circle,triangle,square)
    #[arg(long, num_args = 0..=1, default_missing_value = "cross,circle,triangle,square")]
    sequence: Option<ButtonSequence>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,
}

#[derive(Debug, Args)]
struct ChirpArgs {
    /// Start frequency in Hz
    #[arg(long)]
    start: Option<f64>,

    /// End frequency in Hz
    #[arg(long)]
    end: Option<f64>,

    /// Sweep length in milliseconds
    #[arg(long = "duration-ms")]
    duration_ms: Option<u64>,

    /// Sample rate in Hz
    #[arg(long)]
    rate: Option<u32>,

    /// Duplicate the signal to two channels for the controller speakers
    #[arg(long)]
    stereo: bool,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Play the chirp after writing it
    #[arg(long)]
    play: bool,

    /// Output device name to play on, e.g. "dualsense" (default device otherwise)
    #[arg(long, requires = "play")]
    device: Option<String>,
}

/// Main entry point for DualSense Collector
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Parse the command line and load configuration
///    - Set up console and rolling file logging
///
/// 2. **`record`**
///    - Open the DualSense gamepad and motion nodes
///    - Start a recording session (CSV, plus WAV with `--audio`)
///    - Poll the controller for sequence prompts and log status
///    - Stop on Ctrl+C, when `--duration` expires, or when the sequence
///      completes
///
/// 3. **`chirp`**
///    - Generate the sweep and write it as 16-bit PCM
///    - With `--play`, play it on the default output or the `--device` match
///
/// # Examples
///
/// ```bash
/// dualsense-collector record --session participant_01 --audio --sequence
/// dualsense-collector chirp --start 200 --end 4000 --stereo
/// dualsense-collector chirp --play --device dualsense
/// ```
///
/// Expected output:
/// ```text
/// INFO dualsense_collector: DualSense Collector v0.1.0 starting...
/// INFO dualsense_collector::recorder::csv_sink: CSV file created at: data/controller_data_...
/// INFO dualsense_collector::recorder: Recording started for session participant_01: ...
/// INFO dualsense_collector: Please press cross button
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let _log_guard = init_logging(&config.logging)?;

    info!("DualSense Collector v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Record(args) => record(&config, args).await,
        Command::Chirp(args) => {
            tokio::task::block_in_place(|| write_chirp(&config.chirp, &args))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load configuration from {}", DEFAULT_CONFIG_PATH)),
        None => Ok(Config::default()),
    }
}

/// Console logging plus an optional daily-rolling log file.
///
/// `RUST_LOG` overrides the configured level. The returned guard must live
/// until exit so buffered file output is written.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    if !logging.file_enabled {
        registry.init();
        return Ok(None);
    }

    fs::create_dir_all(&logging.dir)
        .with_context(|| format!("Failed to create log directory {}", logging.dir.display()))?;
    let appender = tracing_appender::rolling::daily(&logging.dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    registry
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}

/// Recorder settings with command line overrides applied.
fn recorder_config(base: &RecorderConfig, args: &RecordArgs) -> Result<RecorderConfig> {
    let mut config = base.clone();
    if let Some(session) = &args.session {
        config.session_id = session.clone();
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    config.validate()?;
    Ok(config)
}

fn chirp_params(base: &ChirpConfig, args: &ChirpArgs) -> ChirpParams {
    let mut params = ChirpParams::from(base);
    if let Some(start) = args.start {
        params.start_hz = start;
    }
    if let Some(end) = args.end {
        params.end_hz = end;
    }
    if let Some(duration_ms) = args.duration_ms {
        params.duration_ms = duration_ms;
    }
    if let Some(rate) = args.rate {
        params.sample_rate = rate;
    }
    params
}

/// What the record loop should do after a batch of button edges.
#[derive(Debug, PartialEq, Eq)]
enum SequenceStep {
    Waiting,
    PromptNext(Button),
    Completed,
}

fn advance_sequence(sequence: &mut ButtonSequence, edges: &[ButtonEdge]) -> SequenceStep {
    let mut step = SequenceStep::Waiting;
    for edge in edges.iter().filter(|edge| edge.is_press()) {
        match sequence.on_press(edge.button) {
            Progress::Advanced { next } => {
                info!("{} pressed", edge.button);
                step = SequenceStep::PromptNext(next);
            }
            Progress::Completed => {
                info!("{} pressed, sequence complete", edge.button);
                return SequenceStep::Completed;
            }
            Progress::Ignored => {}
        }
    }
    step
}

/// Logs the prompt and records it as an event row.
///
/// The event flush writes to disk, so it runs outside the async executor.
fn prompt(recorder: &Recorder, button: Button) {
    info!("Please press {} button", button);
    let event = sequence::prompt_event(button);
    if let Err(e) = tokio::task::block_in_place(|| recorder.record_event(&event)) {
        warn!("Failed to record prompt for {}: {}", button, e);
    }
}

async fn record(config: &Config, args: RecordArgs) -> Result<()> {
    let recorder_config = recorder_config(&config.recorder, &args)?;

    let nodes = DualSenseNodes::resolve(
        &config.controller.device_path,
        &config.controller.motion_device_path,
    )
    .context("Failed to locate the DualSense controller")?;
    let source = Arc::new(DualSenseSource::open(nodes)?);

    let recorder = Recorder::new(recorder_config);
    recorder.attach_source(source.clone());
    if args.audio || config.audio.enabled {
        recorder.attach_audio(Arc::new(CpalAudioSource::new(&config.audio)));
    }

    let mut sequence = args.sequence;
    if sequence.is_some() {
        for remaining in (1..=sequence::COUNTDOWN_SECS).rev() {
            info!("Starting in {}...", remaining);
            sleep(Duration::from_secs(1)).await;
        }
    }

    let session = tokio::task::block_in_place(|| recorder.start())?;
    info!("Press Ctrl+C to stop");
    if let Some(first) = sequence.as_ref().and_then(ButtonSequence::target) {
        prompt(&recorder, first);
    }

    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut poll = interval(Duration::from_millis(POLL_INTERVAL_MS));
    let mut edges = EdgeDetector::new();
    let mut pending_prompt: Option<(Instant, Button)> = None;
    let mut last_status = Instant::now();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = poll.tick() => {
                let now = Instant::now();
                if deadline.map_or(false, |deadline| now >= deadline) {
                    info!("Recording duration reached");
                    break;
                }

                if now.duration_since(last_status) >= Duration::from_secs(STATUS_INTERVAL_SECS) {
                    if let Some(sample) = recorder.latest_sample() {
                        info!(
                            "Recording {}: buttons={} gyro=({:.1}, {:.1}, {:.1}) \
                             acc=({:.2}, {:.2}, {:.2})",
                            session.session_id,
                            sample.label,
                            sample.gyro.pitch,
                            sample.gyro.yaw,
                            sample.gyro.roll,
                            sample.accel.x,
                            sample.accel.y,
                            sample.accel.z
                        );
                    }
                    last_status = now;
                }

                if let Some((at, button)) = pending_prompt {
                    if now >= at {
                        prompt(&recorder, button);
                        pending_prompt = None;
                    }
                }

                let sequence = match sequence.as_mut() {
                    Some(sequence) => sequence,
                    None => continue,
                };
                let reading = match source.read() {
                    Ok(reading) => reading,
                    Err(e) => {
                        warn!("Controller read failed: {}", e);
                        continue;
                    }
                };

                match advance_sequence(sequence, &edges.update(reading.buttons)) {
                    SequenceStep::Waiting => {}
                    SequenceStep::PromptNext(next) => {
                        pending_prompt = Some((now + sequence::PROMPT_DELAY, next));
                    }
                    SequenceStep::Completed => break,
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    // Joins the sampler and audio threads
    if let Some(summary) = tokio::task::block_in_place(|| recorder.stop()) {
        log_summary(&summary);
    }
    Ok(())
}

fn log_summary(summary: &SessionSummary) {
    info!(
        "Session {} complete: {} rows in {}",
        summary.session_id,
        summary.rows_written,
        summary.csv_path.display()
    );
    if let Some(wav_path) = &summary.wav_path {
        info!(
            "Audio: {} ({} samples)",
            wav_path.display(),
            summary.audio_samples.unwrap_or(0)
        );
    }
    for (button, count) in &summary.presses {
        info!("  {}: {} presses", button, count);
    }
    if summary.samples_dropped > 0 {
        warn!("{} samples were dropped", summary.samples_dropped);
    }
}

fn write_chirp(config: &ChirpConfig, args: &ChirpArgs) -> Result<()> {
    let params = chirp_params(config, args);
    let dir = args.output.clone().unwrap_or_else(|| config.output_dir.clone());
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let path = dir.join(chirp::chirp_file_name(&Local::now()));
    let channels = if args.stereo { 2 } else { 1 };
    chirp::write_wav(&path, &params, channels)?;

    if args.play {
        let signal = chirp::generate(&params)?;
        playback::play(&signal, params.sample_rate, args.device.as_deref())
            .context("Failed to play chirp")?;
    }
    Ok(())
}
