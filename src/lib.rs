//! # DualSense Collector Library
//!
//! Record synchronized DualSense telemetry for research sessions.
//!
//! This library provides a buffered, timestamped sensor-to-disk recorder that
//! samples controller button and motion state at ~250Hz into a CSV file, with
//! an optional sidecar capturing the controller microphone into a WAV file.

pub mod audio;
pub mod chirp;
pub mod config;
pub mod controller;
pub mod error;
pub mod recorder;
pub mod sequence;

mod sync;
