//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section is optional; missing sections and keys fall back to the
//! defaults below, so an empty file is a valid configuration.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CollectorError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub chirp: ChirpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sensor recorder configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RecorderConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_session_id")]
    pub session_id: String,

    /// Buffered samples that trigger a flush
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Elapsed time since the last flush that triggers a flush
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Sleep between sampling iterations (4000us targets ~250Hz)
    #[serde(default = "default_sample_interval_us")]
    pub sample_interval_us: u64,

    /// Sleep after a failed sampling iteration
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Bounded wait for the buffer/file locks during a flush
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Bounded wait for the sampling thread on stop
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Buffer cap; the oldest samples are dropped beyond it
    #[serde(default = "default_max_buffered_samples")]
    pub max_buffered_samples: usize,

    /// Records between live readout log lines
    #[serde(default = "default_log_every_records")]
    pub log_every_records: u64,
}

/// Controller configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ControllerConfig {
    /// Gamepad evdev node; empty means auto-detect
    #[serde(default)]
    pub device_path: String,

    /// Motion sensor evdev node; empty means auto-detect
    #[serde(default)]
    pub motion_device_path: String,
}

/// Microphone sidecar configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AudioConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Case-insensitive substring of the capture device name
    #[serde(default = "default_device_hint")]
    pub device_hint: String,

    #[serde(default = "default_audio_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_audio_channels")]
    pub channels: u16,

    /// Audio accumulated before each WAV append
    #[serde(default = "default_segment_ms")]
    pub segment_ms: u64,
}

/// Chirp generator configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChirpConfig {
    #[serde(default = "default_chirp_start_hz")]
    pub start_hz: f64,

    #[serde(default = "default_chirp_end_hz")]
    pub end_hz: f64,

    #[serde(default = "default_chirp_duration_ms")]
    pub duration_ms: u64,

    #[serde(default = "default_chirp_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_chirp_output_dir")]
    pub output_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_file_enabled")]
    pub file_enabled: bool,

    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

// Default value functions
fn default_output_dir() -> PathBuf { PathBuf::from("data") }
fn default_session_id() -> String { "unknown".to_string() }
fn default_flush_threshold() -> usize { 20 }
fn default_flush_interval_ms() -> u64 { 1000 }
fn default_sample_interval_us() -> u64 { 4000 }
fn default_error_backoff_ms() -> u64 { 100 }
fn default_lock_timeout_ms() -> u64 { 1000 }
fn default_join_timeout_ms() -> u64 { 2000 }
fn default_max_buffered_samples() -> usize { 15_000 }
fn default_log_every_records() -> u64 { 50 }

fn default_device_hint() -> String { "dualsense".to_string() }
fn default_audio_sample_rate() -> u32 { 48_000 }
fn default_audio_channels() -> u16 { 2 }
fn default_segment_ms() -> u64 { 1000 }

fn default_chirp_start_hz() -> f64 { 100.0 }
fn default_chirp_end_hz() -> f64 { 1000.0 }
fn default_chirp_duration_ms() -> u64 { 1000 }
fn default_chirp_sample_rate() -> u32 { 48_000 }
fn default_chirp_output_dir() -> PathBuf { PathBuf::from(".") }

fn default_log_level() -> String { "info".to_string() }
fn default_log_file_enabled() -> bool { true }
fn default_log_dir() -> PathBuf { PathBuf::from("logs") }

const MAX_TIMEOUT_MS: u64 = 60_000;
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            session_id: default_session_id(),
            flush_threshold: default_flush_threshold(),
            flush_interval_ms: default_flush_interval_ms(),
            sample_interval_us: default_sample_interval_us(),
            error_backoff_ms: default_error_backoff_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            max_buffered_samples: default_max_buffered_samples(),
            log_every_records: default_log_every_records(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device_hint: default_device_hint(),
            sample_rate: default_audio_sample_rate(),
            channels: default_audio_channels(),
            segment_ms: default_segment_ms(),
        }
    }
}

impl Default for ChirpConfig {
    fn default() -> Self {
        Self {
            start_hz: default_chirp_start_hz(),
            end_hz: default_chirp_end_hz(),
            duration_ms: default_chirp_duration_ms(),
            sample_rate: default_chirp_sample_rate(),
            output_dir: default_chirp_output_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_enabled: default_log_file_enabled(),
            dir: default_log_dir(),
        }
    }
}

impl RecorderConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_micros(self.sample_interval_us)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Validate recorder values
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of its valid range
    pub fn validate(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(invalid("recorder output_dir cannot be empty"));
        }

        validate_session_id(&self.session_id)?;

        if self.flush_threshold == 0 {
            return Err(invalid("flush_threshold must be greater than 0"));
        }

        for (name, value) in [
            ("flush_interval_ms", self.flush_interval_ms),
            ("error_backoff_ms", self.error_backoff_ms),
            ("lock_timeout_ms", self.lock_timeout_ms),
            ("join_timeout_ms", self.join_timeout_ms),
        ] {
            if value == 0 || value > MAX_TIMEOUT_MS {
                return Err(invalid(format!(
                    "{} must be between 1 and {}",
                    name, MAX_TIMEOUT_MS
                )));
            }
        }

        if self.sample_interval_us == 0 || self.sample_interval_us > 1_000_000 {
            return Err(invalid("sample_interval_us must be between 1 and 1000000"));
        }

        if self.max_buffered_samples < self.flush_threshold {
            return Err(invalid(
                "max_buffered_samples must be at least flush_threshold",
            ));
        }

        if self.log_every_records == 0 {
            return Err(invalid("log_every_records must be greater than 0"));
        }

        Ok(())
    }
}

/// Session ids end up in file names, so they must be a single path component.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(invalid("session_id cannot be empty"));
    }

    if session_id.contains(['/', '\\']) || session_id == "." || session_id == ".." {
        return Err(invalid(format!(
            "session_id '{}' must not contain path separators",
            session_id
        )));
    }

    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dualsense_collector::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        self.recorder.validate()?;

        // Audio stream parameters
        if !(1..=2).contains(&self.audio.channels) {
            return Err(invalid("audio channels must be 1 or 2"));
        }

        if !(8_000..=192_000).contains(&self.audio.sample_rate) {
            return Err(invalid("audio sample_rate must be between 8000 and 192000"));
        }

        if self.audio.segment_ms == 0 || self.audio.segment_ms > MAX_TIMEOUT_MS {
            return Err(invalid("audio segment_ms must be between 1 and 60000"));
        }

        if self.audio.enabled && self.audio.device_hint.trim().is_empty() {
            return Err(invalid("audio device_hint cannot be empty when enabled"));
        }

        // Chirp parameters
        if !(8_000..=192_000).contains(&self.chirp.sample_rate) {
            return Err(invalid("chirp sample_rate must be between 8000 and 192000"));
        }

        let nyquist = f64::from(self.chirp.sample_rate) / 2.0;
        for (name, value) in [("start_hz", self.chirp.start_hz), ("end_hz", self.chirp.end_hz)] {
            if !(value > 0.0 && value < nyquist) {
                return Err(invalid(format!(
                    "chirp {} must be between 0 and {} (Nyquist)",
                    name, nyquist
                )));
            }
        }

        if self.chirp.duration_ms == 0 || self.chirp.duration_ms > MAX_TIMEOUT_MS {
            return Err(invalid("chirp duration_ms must be between 1 and 60000"));
        }

        // Logging
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "log level must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.logging.file_enabled && self.logging.dir.as_os_str().is_empty() {
            return Err(invalid("logging dir cannot be empty when file logging is enabled"));
        }

        Ok(())
    }
}

fn invalid(message: impl std::fmt::Display) -> CollectorError {
    CollectorError::Config(toml::de::Error::custom(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recorder, RecorderConfig::default());
        assert!(!config.audio.enabled);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.recorder.flush_threshold, 20);
        assert_eq!(config.recorder.session_id, "unknown");
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = Config::from_toml(include_str!("../config/default.toml")).unwrap();
        assert_eq!(config.recorder, RecorderConfig::default());
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.chirp, ChirpConfig::default());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[recorder]
output_dir = "/tmp/sessions"
session_id = "participant_07"
flush_threshold = 50

[audio]
enabled = true
channels = 1

[logging]
level = "debug"
file_enabled = false
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.recorder.output_dir, PathBuf::from("/tmp/sessions"));
        assert_eq!(config.recorder.session_id, "participant_07");
        assert_eq!(config.recorder.flush_threshold, 50);
        assert_eq!(config.recorder.flush_interval_ms, 1000);
        assert!(config.audio.enabled);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/collector.toml");
        assert!(matches!(result, Err(CollectorError::Io(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::from_toml("[recorder\nflush_threshold = ");
        assert!(matches!(result, Err(CollectorError::Config(_))));
    }

    #[test]
    fn test_duration_helpers() {
        let config = RecorderConfig::default();
        assert_eq!(config.flush_interval(), Duration::from_secs(1));
        assert_eq!(config.sample_interval(), Duration::from_millis(4));
        assert_eq!(config.error_backoff(), Duration::from_millis(100));
        assert_eq!(config.lock_timeout(), Duration::from_secs(1));
        assert_eq!(config.join_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_empty_session_id() {
        let mut config = Config::default();
        config.recorder.session_id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_id_with_separator() {
        assert!(validate_session_id("../escape").is_err());
        assert!(validate_session_id("a\\b").is_err());
        assert!(validate_session_id("..").is_err());
        assert!(validate_session_id("test_user").is_ok());
    }

    #[test]
    fn test_empty_output_dir() {
        let mut config = Config::default();
        config.recorder.output_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_flush_threshold_zero() {
        let mut config = Config::default();
        config.recorder.flush_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeouts_out_of_range() {
        let mut config = Config::default();
        config.recorder.lock_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.recorder.join_timeout_ms = 60_001;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.recorder.flush_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_interval_zero() {
        let mut config = Config::default();
        config.recorder.sample_interval_us = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_cap_below_threshold() {
        let mut config = Config::default();
        config.recorder.flush_threshold = 100;
        config.recorder.max_buffered_samples = 99;
        assert!(config.validate().is_err());

        config.recorder.max_buffered_samples = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_audio_channels() {
        for channels in [0, 3] {
            let mut config = Config::default();
            config.audio.channels = channels;
            assert!(config.validate().is_err(), "{} channels should be rejected", channels);
        }
        for channels in [1, 2] {
            let mut config = Config::default();
            config.audio.channels = channels;
            assert!(config.validate().is_ok(), "{} channels should be valid", channels);
        }
    }

    #[test]
    fn test_audio_sample_rate() {
        let mut config = Config::default();
        config.audio.sample_rate = 4000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_device_hint_when_enabled() {
        let mut config = Config::default();
        config.audio.enabled = true;
        config.audio.device_hint = String::new();
        assert!(config.validate().is_err());

        config.audio.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chirp_above_nyquist() {
        let mut config = Config::default();
        config.chirp.sample_rate = 8000;
        config.chirp.end_hz = 4000.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chirp_non_positive_frequency() {
        let mut config = Config::default();
        config.chirp.start_hz = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chirp_zero_duration() {
        let mut config = Config::default();
        config.chirp.duration_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_output_dir(), PathBuf::from("data"));
        assert_eq!(default_session_id(), "unknown");
        assert_eq!(default_flush_threshold(), 20);
        assert_eq!(default_flush_interval_ms(), 1000);
        assert_eq!(default_sample_interval_us(), 4000);
        assert_eq!(default_error_backoff_ms(), 100);
        assert_eq!(default_lock_timeout_ms(), 1000);
        assert_eq!(default_join_timeout_ms(), 2000);
        assert_eq!(default_max_buffered_samples(), 15_000);
        assert_eq!(default_device_hint(), "dualsense");
        assert_eq!(default_audio_channels(), 2);
        assert_eq!(default_segment_ms(), 1000);
        assert_eq!(default_chirp_start_hz(), 100.0);
        assert_eq!(default_chirp_end_hz(), 1000.0);
    }
}
