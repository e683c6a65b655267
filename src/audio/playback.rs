//! Test signal playback through cpal.
//!
//! The signal is duplicated to every channel of the output device and played
//! once; the device receives silence after the last sample.

use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use tracing::{error, info};

use super::capture::matches_hint;
use crate::error::{CollectorError, Result};

/// Wait beyond the signal length before playback counts as stalled.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Lets the device emit its last buffer before the stream is dropped.
const TAIL: Duration = Duration::from_millis(100);

/// Duplicates a mono signal to `channels` interleaved channels.
pub fn interleave(signal: &[f32], channels: u16) -> Vec<f32> {
    let channels = usize::from(channels.max(1));
    signal
        .iter()
        .flat_map(|&sample| std::iter::repeat(sample).take(channels))
        .collect()
}

/// Read position in an interleaved signal that is played once.
#[derive(Debug)]
struct PlaybackCursor {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

impl PlaybackCursor {
    fn new(samples: Vec<f32>) -> Self {
        Self { samples, position: 0, finished: false }
    }

    /// Fills `out` with the next samples, then silence.
    ///
    /// Returns `true` only on the call that reaches the end of the signal.
    fn fill<T>(&mut self, out: &mut [T]) -> bool
    where
        T: Sample + FromSample<f32>,
    {
        for slot in out.iter_mut() {
            *slot = match self.samples.get(self.position) {
                Some(&sample) => {
                    self.position += 1;
                    sample.to_sample::<T>()
                }
                None => T::EQUILIBRIUM,
            };
        }

        if self.finished || self.position < self.samples.len() {
            return false;
        }
        self.finished = true;
        true
    }
}

/// Plays a mono `signal` at `sample_rate` and blocks until it has been sent
/// to the device.
///
/// Uses the default output device, or the first one whose name contains
/// `device_hint`, e.g. the controller speaker.
///
/// # Errors
///
/// Returns `AudioDeviceNotFound` if no output device matches, and `Audio` if
/// the stream cannot be built or does not finish in time.
pub fn play(signal: &[f32], sample_rate: u32, device_hint: Option<&str>) -> Result<()> {
    if signal.is_empty() || sample_rate == 0 {
        return Err(CollectorError::Audio("Nothing to play".to_string()));
    }

    let device = find_output_device(device_hint)?;
    let default = device
        .default_output_config()
        .map_err(|e| CollectorError::Audio(format!("No supported output config: {}", e)))?;
    let config = StreamConfig {
        channels: default.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let samples = interleave(signal, config.channels);
    let (done_tx, done_rx) = bounded::<()>(1);
    let stream = match default.sample_format() {
        SampleFormat::F32 => build_output::<f32>(&device, &config, samples, done_tx)?,
        SampleFormat::I16 => build_output::<i16>(&device, &config, samples, done_tx)?,
        SampleFormat::U16 => build_output::<u16>(&device, &config, samples, done_tx)?,
        other => {
            return Err(CollectorError::Audio(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    let length = Duration::from_secs_f64(signal.len() as f64 / f64::from(sample_rate));
    stream
        .play()
        .map_err(|e| CollectorError::Audio(format!("Failed to start output stream: {}", e)))?;
    info!(
        "Playing {:.3}s signal on {} channels at {} Hz",
        length.as_secs_f64(),
        config.channels,
        sample_rate
    );

    let finished = done_rx.recv_timeout(length + DRAIN_GRACE);
    thread::sleep(TAIL);
    drop(stream);

    match finished {
        Ok(()) => {
            info!("Playback finished");
            Ok(())
        }
        Err(_) => Err(CollectorError::Audio(format!(
            "Playback did not finish within {:?}",
            length + DRAIN_GRACE
        ))),
    }
}

fn find_output_device(device_hint: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    let hint = match device_hint {
        Some(hint) => hint,
        None => {
            let device = host.default_output_device().ok_or_else(|| {
                CollectorError::AudioDeviceNotFound("default output".to_string())
            })?;
            info!(
                "Using default audio output device: {}",
                device.name().unwrap_or_else(|_| "Unknown".to_string())
            );
            return Ok(device);
        }
    };

    let devices = host
        .output_devices()
        .map_err(|e| CollectorError::Audio(format!("Failed to list output devices: {}", e)))?;

    let mut seen = Vec::new();
    for device in devices {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        if matches_hint(&name, hint) {
            info!("Using audio output device: {}", name);
            return Ok(device);
        }
        seen.push(name);
    }

    info!("Available output devices: {:?}", seen);
    Err(CollectorError::AudioDeviceNotFound(hint.to_string()))
}

fn build_output<T>(
    device: &Device,
    config: &StreamConfig,
    samples: Vec<f32>,
    done: Sender<()>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let mut cursor = PlaybackCursor::new(samples);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if cursor.fill(data) {
                    // Disconnected once play() has given up waiting
                    done.try_send(()).ok();
                }
            },
            |err| error!("Audio output error: {}", err),
            None,
        )
        .map_err(|e| CollectorError::Audio(format!("Failed to create output stream: {}", e)))
}
