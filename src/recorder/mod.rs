//! # Buffered Sensor Recorder
//!
//! Samples a [`SensorSource`] at roughly 250 Hz on a background thread and
//! persists the samples to one CSV file per session.
//!
//! ## Architecture
//!
//! ```text
//! SensorSource --read--> sampler thread --push--> SampleBuffer
//!                                                     |
//!             record_event() --push + flush--+        | drain
//!                                            v        v
//!                                           CsvSink (one file per session)
//! ```
//!
//! A flush happens when the buffer holds `flush_threshold` samples, when
//! `flush_interval` has passed since the last one, when an event is recorded,
//! and once more on stop. Every flush appends the drained batch and flushes
//! the file to the OS.
//!
//! With an [`AudioSource`] attached, each session also runs an
//! [`AudioSidecar`] that writes a companion WAV file whose name appears in
//! every CSV row.
//!
//! ## Thread Safety
//!
//! All methods take `&self`; a `Recorder` can be shared through an `Arc` and
//! stopped from any thread. At most one session is active at a time.

mod buffer;
mod csv_sink;
pub mod files;
pub mod sample;
mod sampler;
mod session;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{error, info, warn};

use crate::audio::{AudioSidecar, AudioSink, AudioSource};
use crate::config::{validate_session_id, RecorderConfig};
use crate::controller::buttons::Button;
use crate::controller::source::SensorSource;
use crate::error::{CollectorError, Result};
use crate::sync::lock;

use csv_sink::CsvSink;
use files::{create_session_files, file_name_of, SessionFiles};
use session::SessionCore;

pub use sample::{Label, Sample};
pub use sampler::SAMPLER_THREAD;
pub use session::FlushOutcome;

/// Files and identity of a running session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub session_id: String,
    pub started_at: DateTime<Local>,
    pub csv_path: PathBuf,
    pub wav_path: Option<PathBuf>,
}

/// What a finished session produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub csv_path: PathBuf,
    pub wav_path: Option<PathBuf>,
    /// Data rows in the CSV file
    pub rows_written: u64,
    /// Samples discarded because the buffer was full
    pub samples_dropped: u64,
    /// Interleaved samples in the WAV file
    pub audio_samples: Option<u64>,
    /// Presses per button, in canonical order
    pub presses: Vec<(Button, u64)>,
}

struct Settings {
    config: RecorderConfig,
    source: Option<Arc<dyn SensorSource>>,
    audio: Option<Arc<dyn AudioSource>>,
}

struct ActiveSession {
    core: Arc<SessionCore>,
    sampler: Option<JoinHandle<()>>,
    sampler_done: Receiver<()>,
    audio: Option<AudioSidecar>,
    info: SessionInfo,
}

impl ActiveSession {
    fn shutdown(mut self) -> SessionSummary {
        let core = Arc::clone(&self.core);
        core.running.store(false, Ordering::Release);

        let timeout = core.config.join_timeout();
        match self.sampler_done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Sampling thread did not stop within {:?}; detaching it",
                    timeout
                );
                self.sampler.take();
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.sampler.take() {
                    if handle.join().is_err() {
                        error!("Sampling thread panicked");
                    }
                }
            }
        }

        let audio_samples = self.audio.take().and_then(|sidecar| {
            match sidecar.stop(timeout) {
                Ok(samples) => Some(samples),
                Err(e) => {
                    error!("Failed to finalize audio file: {}", e);
                    None
                }
            }
        });

        core.flush();
        core.close();

        let summary = SessionSummary {
            session_id: self.info.session_id,
            csv_path: self.info.csv_path,
            wav_path: self.info.wav_path,
            rows_written: core.rows_written(),
            samples_dropped: core.buffer.dropped(),
            audio_samples,
            presses: core.press_counts(),
        };

        info!(
            "Recording stopped: {} rows written to {}",
            summary.rows_written,
            summary.csv_path.display()
        );
        if summary.samples_dropped > 0 {
            warn!(
                "{} samples were dropped during the session",
                summary.samples_dropped
            );
        }

        summary
    }
}

/// Session-oriented sensor recorder.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use dualsense_collector::config::RecorderConfig;
/// use dualsense_collector::controller::ps5::DualSenseNodes;
/// use dualsense_collector::controller::source::DualSenseSource;
/// use dualsense_collector::recorder::Recorder;
///
/// let recorder = Recorder::new(RecorderConfig::default());
/// recorder.configure("data", "participant_01")?;
/// recorder.attach_source(Arc::new(DualSenseSource::open(DualSenseNodes::detect()?)?));
///
/// let info = recorder.start()?;
/// println!("Recording to {}", info.csv_path.display());
/// recorder.record_event("pin_entered")?;
/// let summary = recorder.stop();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Recorder {
    settings: Mutex<Settings>,
    active: Mutex<Option<ActiveSession>>,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            settings: Mutex::new(Settings {
                config,
                source: None,
                audio: None,
            }),
            active: Mutex::new(None),
        }
    }

    /// Sets the output directory and session id used by the next session.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an id that is not a single path component and
    /// `Io` if the directory cannot be created.
    pub fn configure(&self, output_dir: impl Into<PathBuf>, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;

        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;

        let mut settings = lock(&self.settings);
        settings.config.output_dir = output_dir;
        settings.config.session_id = session_id.to_string();
        info!(
            "Recorder configured: session {} in {}",
            session_id,
            settings.config.output_dir.display()
        );
        Ok(())
    }

    pub fn attach_source(&self, source: Arc<dyn SensorSource>) {
        lock(&self.settings).source = Some(source);
    }

    /// Enables the audio sidecar for subsequent sessions.
    pub fn attach_audio(&self, source: Arc<dyn AudioSource>) {
        lock(&self.settings).audio = Some(source);
    }

    pub fn detach_audio(&self) {
        lock(&self.settings).audio = None;
    }

    /// Opens a new session file and starts sampling.
    ///
    /// Calling `start` while a session is active logs a warning and returns
    /// that session's info.
    ///
    /// # Errors
    ///
    /// - `NoSensorSource` if no source is attached
    /// - `Io`/`Csv` if the output directory or files cannot be created
    /// - `AudioDeviceNotFound`/`Audio`/`Wav` if audio is attached and cannot
    ///   be set up
    ///
    /// No session exists after a failed start.
    pub fn start(&self) -> Result<SessionInfo> {
        let mut active = lock(&self.active);
        if let Some(session) = active.as_ref() {
            warn!("Already recording session {}", session.info.session_id);
            return Ok(session.info.clone());
        }

        let (config, source, audio) = {
            let settings = lock(&self.settings);
            (
                settings.config.clone(),
                settings.source.clone(),
                settings.audio.clone(),
            )
        };
        let source = source.ok_or(CollectorError::NoSensorSource)?;

        let session = open_session(config, source, audio).map_err(|e| {
            error!("Failed to start recording: {}", e);
            e
        })?;
        let info = session.info.clone();
        *active = Some(session);

        info!(
            "Recording started for session {}: {}",
            info.session_id,
            info.csv_path.display()
        );
        Ok(info)
    }

    /// Ends the active session and returns its summary.
    ///
    /// Remaining samples are flushed and the files are closed. Returns `None`
    /// (with a warning) when nothing is recording, so repeated calls are safe.
    pub fn stop(&self) -> Option<SessionSummary> {
        let session = lock(&self.active).take();
        match session {
            Some(session) => Some(session.shutdown()),
            None => {
                warn!("Stop requested but no recording is active");
                None
            }
        }
    }

    /// Records one row labeled `EVENT:<name>` and flushes it immediately.
    ///
    /// Without an active session this logs a warning and returns
    /// [`FlushOutcome::Inactive`].
    ///
    /// # Errors
    ///
    /// Returns `SensorRead` if the current sensor state cannot be read; no
    /// row is recorded in that case.
    pub fn record_event(&self, name: &str) -> Result<FlushOutcome> {
        let active = lock(&self.active);
        let core = match active.as_ref() {
            Some(session) => &session.core,
            None => {
                warn!("Event '{}' ignored: no recording is active", name);
                return Ok(FlushOutcome::Inactive);
            }
        };

        let reading = core.source.read()?;
        core.record(Sample::capture(
            &reading,
            Label::Event(name.to_string()),
            &core.session_id,
            core.audio_file.as_ref(),
        ));

        let outcome = core.flush();
        info!("Event recorded: {} ({:?})", name, outcome);
        Ok(outcome)
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.active).is_some()
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        lock(&self.active).as_ref().map(|session| session.info.clone())
    }

    /// Samples waiting for the next flush.
    pub fn buffered_len(&self) -> usize {
        lock(&self.active)
            .as_ref()
            .map_or(0, |session| session.core.buffer.len())
    }

    /// Most recent sample of the active session, for live readouts.
    pub fn latest_sample(&self) -> Option<Sample> {
        lock(&self.active)
            .as_ref()
            .and_then(|session| session.core.latest())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(session) = lock(&self.active).take() {
            session.shutdown();
        }
    }
}

fn open_session(
    config: RecorderConfig,
    source: Arc<dyn SensorSource>,
    audio: Option<Arc<dyn AudioSource>>,
) -> Result<ActiveSession> {
    fs::create_dir_all(&config.output_dir)?;

    // Resolve the capture device before creating any file
    let audio = match audio {
        Some(audio) => {
            let spec = audio.open()?;
            Some((audio, spec))
        }
        None => None,
    };

    let started_at = Local::now();
    let SessionFiles { csv, csv_path, wav } = create_session_files(
        &config.output_dir,
        &config.session_id,
        &started_at,
        audio.is_some(),
    )?;
    let info = SessionInfo {
        session_id: config.session_id.clone(),
        started_at,
        csv_path,
        wav_path: wav.as_ref().map(|(_, path)| path.clone()),
    };

    let csv_sink = match CsvSink::new(csv, info.csv_path.clone(), audio.is_some()) {
        Ok(sink) => sink,
        Err(e) => {
            drop(wav);
            abandon(None, &info);
            return Err(e);
        }
    };

    let audio = match (audio, wav) {
        (Some((audio, spec)), Some((file, path))) => {
            match AudioSink::new(file, path, spec, audio.segment_ms()) {
                Ok(sink) => Some((audio, sink)),
                Err(e) => {
                    drop(csv_sink);
                    abandon(None, &info);
                    return Err(e);
                }
            }
        }
        _ => None,
    };

    let session_id: Arc<str> = Arc::from(config.session_id.as_str());
    let audio_file: Option<Arc<str>> = info
        .wav_path
        .as_deref()
        .map(|path| Arc::from(file_name_of(path).as_str()));
    let core = Arc::new(SessionCore::new(config, session_id, audio_file, source, csv_sink));

    let sidecar = match audio {
        Some((audio, sink)) => match AudioSidecar::spawn(audio, sink.clone()) {
            Ok(sidecar) => Some(sidecar),
            Err(e) => {
                if let Err(finish_error) = sink.finish() {
                    warn!("Failed to finalize audio file: {}", finish_error);
                }
                abandon(Some(&core), &info);
                return Err(e);
            }
        },
        None => None,
    };

    let (sampler, sampler_done) = match sampler::spawn(Arc::clone(&core)) {
        Ok(spawned) => spawned,
        Err(e) => {
            if let Some(sidecar) = sidecar {
                if let Err(stop_error) = sidecar.stop(core.config.join_timeout()) {
                    warn!("Failed to stop audio capture: {}", stop_error);
                }
            }
            abandon(Some(&core), &info);
            return Err(e);
        }
    };

    Ok(ActiveSession {
        core,
        sampler: Some(sampler),
        sampler_done,
        audio: sidecar,
        info,
    })
}

/// Closes and removes the files of a session that failed to start.
fn abandon(core: Option<&SessionCore>, info: &SessionInfo) {
    if let Some(core) = core {
        core.close();
    }
    discard(&info.csv_path);
    if let Some(wav_path) = &info.wav_path {
        discard(wav_path);
    }
}

/// Removes a file left behind by a failed start.
fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}
