//! # Error Types
//!
//! Custom error types for DualSense Collector using `thiserror`.

use thiserror::Error;

/// Main error type for DualSense Collector
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// WAV encoding errors
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Controller device access errors
    #[error("Controller error: {0}")]
    Controller(String),

    /// No DualSense controller present on the system
    #[error("No DualSense controller found")]
    ControllerNotFound,

    /// `start` was called before a sensor source was attached
    #[error("No sensor source attached")]
    NoSensorSource,

    /// Reading the current sensor state failed
    #[error("Sensor read failed: {0}")]
    SensorRead(String),

    /// No capture device matched the configured hint
    #[error("No audio capture device matching '{0}'")]
    AudioDeviceNotFound(String),

    /// Audio stream setup or runtime errors
    #[error("Audio error: {0}")]
    Audio(String),

    /// Invalid chirp generator parameters
    #[error("Invalid chirp parameters: {0}")]
    Chirp(String),
}

/// Result type alias for DualSense Collector
pub type Result<T> = std::result::Result<T, CollectorError>;
