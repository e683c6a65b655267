//! # Chirp Generator
//!
//! Linear frequency sweeps used as test signals for the controller speaker
//! and microphone.
//!
//! The sweep is `cos(2π(f0·t + (f1 − f0)/(2T)·t²))` sampled at `n = rate·T`
//! points spaced evenly from `0` to `T` inclusive, so the first and last
//! samples sit exactly at the start and end of the sweep.

use std::f64::consts::PI;
use std::path::Path;

use chrono::{DateTime, Local};
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::info;

use crate::audio::sink::to_pcm16;
use crate::config::ChirpConfig;
use crate::error::{CollectorError, Result};
use crate::recorder::files::FILE_STAMP_FORMAT;

/// Sweep parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChirpParams {
    pub start_hz: f64,
    pub end_hz: f64,
    pub duration_ms: u64,
    pub sample_rate: u32,
}

impl From<&ChirpConfig> for ChirpParams {
    fn from(config: &ChirpConfig) -> Self {
        Self {
            start_hz: config.start_hz,
            end_hz: config.end_hz,
            duration_ms: config.duration_ms,
            sample_rate: config.sample_rate,
        }
    }
}

impl ChirpParams {
    /// Check that the sweep is representable at the sample rate.
    ///
    /// # Errors
    ///
    /// Returns `Chirp` if:
    /// - the sample rate or duration is zero
    /// - either frequency is not positive or not below Nyquist
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(CollectorError::Chirp("sample rate must be positive".to_string()));
        }

        if self.duration_ms == 0 {
            return Err(CollectorError::Chirp("duration must be positive".to_string()));
        }

        let nyquist = f64::from(self.sample_rate) / 2.0;
        for (name, hz) in [("start", self.start_hz), ("end", self.end_hz)] {
            if !(hz > 0.0 && hz < nyquist) {
                return Err(CollectorError::Chirp(format!(
                    "{} frequency {} Hz must be between 0 and {} Hz",
                    name, hz, nyquist
                )));
            }
        }

        Ok(())
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// Number of points in the sweep.
    pub fn sample_count(&self) -> usize {
        (f64::from(self.sample_rate) * self.duration_secs()) as usize
    }
}

/// Generate the sweep as samples in `[-1, 1]`.
pub fn generate(params: &ChirpParams) -> Result<Vec<f32>> {
    params.validate()?;

    let n = params.sample_count();
    let duration = params.duration_secs();
    let sweep_rate = (params.end_hz - params.start_hz) / (2.0 * duration);
    let step = if n > 1 { duration / (n - 1) as f64 } else { 0.0 };

    info!(
        "Generating chirp: f0={}Hz, f1={}Hz, duration={}ms, fs={}Hz",
        params.start_hz, params.end_hz, params.duration_ms, params.sample_rate
    );

    Ok((0..n)
        .map(|i| {
            let t = i as f64 * step;
            (2.0 * PI * (params.start_hz * t + sweep_rate * t * t)).cos() as f32
        })
        .collect())
}

/// Write the sweep to `path` as 16-bit PCM.
///
/// With two channels the same signal is written to both, which is what the
/// controller speakers expect. Returns the number of frames written.
pub fn write_wav(path: &Path, params: &ChirpParams, channels: u16) -> Result<usize> {
    if !(1..=2).contains(&channels) {
        return Err(CollectorError::Chirp(format!(
            "channels must be 1 or 2, got {}",
            channels
        )));
    }

    let signal = generate(params)?;
    let spec = WavSpec {
        channels,
        sample_rate: params.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &signal {
        let pcm = to_pcm16(sample);
        for _ in 0..channels {
            writer.write_sample(pcm)?;
        }
    }
    writer.finalize()?;

    info!("Chirp saved to {} ({} frames)", path.display(), signal.len());
    Ok(signal.len())
}

/// `chirp_<YYYYMMDD_HHMMSS>.wav`
pub fn chirp_file_name(at: &DateTime<Local>) -> String {
    format!("chirp_{}.wav", at.format(FILE_STAMP_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params() -> ChirpParams {
        ChirpParams::from(&ChirpConfig::default())
    }

    #[test]
    fn test_defaults_from_config() {
        let params = params();
        assert_eq!(params.start_hz, 100.0);
        assert_eq!(params.end_hz, 1000.0);
        assert_eq!(params.duration_ms, 1000);
        assert_eq!(params.sample_rate, 48_000);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_sample_count() {
        assert_eq!(params().sample_count(), 48_000);

        let short = ChirpParams { duration_ms: 250, sample_rate: 8000, ..params() };
        assert_eq!(short.sample_count(), 2000);
    }

    #[test]
    fn test_sweep_endpoints() {
        let signal = generate(&params()).unwrap();
        assert_eq!(signal.len(), 48_000);

        // cos(0) at t = 0
        assert!((signal[0] - 1.0).abs() < 1e-6);

        // Phase at t = T is 2π·T·(f0 + f1)/2 = 2π·550, a whole number of turns
        assert!((signal[47_999] - 1.0).abs() < 1e-3);
        assert!(signal.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_sweep_matches_formula() {
        let params = ChirpParams {
            start_hz: 200.0,
            end_hz: 2000.0,
            duration_ms: 100,
            sample_rate: 8000,
        };
        let signal = generate(&params).unwrap();
        let n = signal.len();
        assert_eq!(n, 800);

        let duration = 0.1;
        let i = 321;
        let t = i as f64 * duration / (n - 1) as f64;
        let expected = (2.0 * PI * (200.0 * t + (1800.0 / (2.0 * duration)) * t * t)).cos();
        assert!((f64::from(signal[i]) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_frequency_rises() {
        let params = ChirpParams {
            start_hz: 100.0,
            end_hz: 3000.0,
            duration_ms: 1000,
            sample_rate: 8000,
        };
        let signal = generate(&params).unwrap();

        let crossings = |window: &[f32]| {
            window
                .windows(2)
                .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
                .count()
        };
        let tenth = signal.len() / 10;
        assert!(crossings(&signal[signal.len() - tenth..]) > 5 * crossings(&signal[..tenth]));
    }

    #[test]
    fn test_validation() {
        assert!(ChirpParams { end_hz: 24_000.0, ..params() }.validate().is_err());
        assert!(ChirpParams { start_hz: 0.0, ..params() }.validate().is_err());
        assert!(ChirpParams { start_hz: -5.0, ..params() }.validate().is_err());
        assert!(ChirpParams { duration_ms: 0, ..params() }.validate().is_err());
        assert!(ChirpParams { sample_rate: 0, ..params() }.validate().is_err());

        // Downward sweeps are fine
        assert!(ChirpParams { start_hz: 1000.0, end_hz: 100.0, ..params() }.validate().is_ok());
    }

    #[test]
    fn test_generate_rejects_invalid_params() {
        let result = generate(&ChirpParams { end_hz: f64::NAN, ..params() });
        assert!(matches!(result, Err(CollectorError::Chirp(_))));
    }

    #[test]
    fn test_write_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chirp.wav");
        let params = ChirpParams { duration_ms: 50, sample_rate: 8000, ..params() };

        assert_eq!(write_wav(&path, &params, 1).unwrap(), 400);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 400);
        assert_eq!(samples[0], 32767);
    }

    #[test]
    fn test_write_stereo_duplicates_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chirp_stereo.wav");
        let params = ChirpParams { duration_ms: 20, sample_rate: 8000, ..params() };

        assert_eq!(write_wav(&path, &params, 2).unwrap(), 160);

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 320);
        assert!(samples.chunks(2).all(|frame| frame[0] == frame[1]));
    }

    #[test]
    fn test_write_rejects_channel_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chirp.wav");
        assert!(write_wav(&path, &params(), 6).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_chirp_file_name() {
        let at = Local.with_ymd_and_hms(2024, 6, 1, 8, 5, 9).unwrap();
        assert_eq!(chirp_file_name(&at), "chirp_20240601_080509.wav");
    }
}
