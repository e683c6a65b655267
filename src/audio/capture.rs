//! Microphone capture through cpal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use tracing::{debug, error, info};

use super::{AudioSink, AudioSource, AudioSpec};
use crate::config::AudioConfig;
use crate::error::{CollectorError, Result};

/// How often the capture thread checks for a stop request.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Case-insensitive device name match.
pub fn matches_hint(device_name: &str, hint: &str) -> bool {
    device_name.to_lowercase().contains(&hint.to_lowercase())
}

/// Input device selected by name, e.g. the controller's built-in microphone.
#[derive(Debug, Clone)]
pub struct CpalAudioSource {
    device_hint: String,
    sample_rate: u32,
    channels: u16,
    segment_ms: u64,
}

impl CpalAudioSource {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device_hint: config.device_hint.clone(),
            sample_rate: config.sample_rate,
            channels: config.channels,
            segment_ms: config.segment_ms,
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        }
    }

    fn find_device(&self) -> Result<Device> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| CollectorError::Audio(format!("Failed to list input devices: {}", e)))?;

        let mut seen = Vec::new();
        for device in devices {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            if matches_hint(&name, &self.device_hint) {
                info!("Using audio input device: {}", name);
                return Ok(device);
            }
            seen.push(name);
        }

        info!("Available input devices: {:?}", seen);
        Err(CollectorError::AudioDeviceNotFound(self.device_hint.clone()))
    }
}

impl AudioSource for CpalAudioSource {
    fn open(&self) -> Result<AudioSpec> {
        let device = self.find_device()?;
        if let Ok(default) = device.default_input_config() {
            debug!(
                "Device default: {} Hz, {} channels, {:?}",
                default.sample_rate().0,
                default.channels(),
                default.sample_format()
            );
        }

        Ok(AudioSpec {
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }

    fn capture(&self, sink: AudioSink, running: Arc<AtomicBool>) -> Result<()> {
        let device = self.find_device()?;
        let sample_format = device
            .default_input_config()
            .map_err(|e| CollectorError::Audio(format!("No supported input config: {}", e)))?
            .sample_format();
        let config = self.stream_config();

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, sink)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, sink)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, sink)?,
            other => {
                return Err(CollectorError::Audio(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| CollectorError::Audio(format!("Failed to start stream: {}", e)))?;
        info!("Audio capture started");

        // The stream stays on this thread and is dropped when capture ends
        while running.load(Ordering::Acquire) {
            thread::sleep(POLL_INTERVAL);
        }

        drop(stream);
        info!("Audio capture stopped");
        Ok(())
    }

    fn segment_ms(&self) -> u64 {
        self.segment_ms
    }
}

fn build_stream<T>(device: &Device, config: &StreamConfig, sink: AudioSink) -> Result<Stream>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                scratch.extend(data.iter().map(|&sample| sample.to_sample::<f32>()));
                sink.push(&scratch);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| CollectorError::Audio(format!("Failed to create audio stream: {}", e)))
}
