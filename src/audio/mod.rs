//! # Audio Sidecar
//!
//! Optional microphone capture that runs alongside a recording session and
//! writes a companion WAV file.
//!
//! An [`AudioSource`] produces interleaved `f32` samples. It feeds them into an
//! [`AudioSink`], which accumulates fixed-length segments and appends each one
//! to the WAV file as 16-bit PCM. The [`AudioSidecar`] owns the capture thread
//! for one session.
//!
//! [`playback`] plays generated test signals on an output device.

pub mod capture;
pub mod playback;
pub mod sink;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::error::Result;

pub use capture::CpalAudioSource;
pub use sink::{AudioSidecar, AudioSink};

/// Audio appended to the WAV file per segment unless a source says otherwise.
pub const DEFAULT_SEGMENT_MS: u64 = 1000;

/// Stream parameters of a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioSpec {
    /// Interleaved samples in `millis` of audio.
    pub fn samples_for(&self, millis: u64) -> usize {
        let per_second = u64::from(self.sample_rate) * u64::from(self.channels);
        (per_second * millis / 1000) as usize
    }
}

/// Capture device that feeds an [`AudioSink`].
pub trait AudioSource: Send + Sync {
    /// Resolves the device and reports its stream parameters.
    ///
    /// Called by the recorder before any session file is created, so a missing
    /// device fails the session start.
    fn open(&self) -> Result<AudioSpec>;

    /// Captures into `sink` until `running` clears.
    ///
    /// Runs on the sidecar thread; blocks for the whole session.
    fn capture(&self, sink: AudioSink, running: Arc<AtomicBool>) -> Result<()>;

    /// Milliseconds of audio per WAV append.
    fn segment_ms(&self) -> u64 {
        DEFAULT_SEGMENT_MS
    }
}
