//! WAV output and the capture thread that feeds it.

use std::fs::File;
use std::io::BufWriter;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, error, info, warn};

use super::{AudioSource, AudioSpec};
use crate::error::Result;
use crate::sync::lock;

type Writer = WavWriter<BufWriter<File>>;

/// Convert a float sample to 16-bit PCM, clamping out-of-range input.
pub fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

struct Shared {
    segment: Mutex<Vec<f32>>,
    writer: Mutex<Option<Writer>>,
    segment_len: usize,
    samples_written: AtomicU64,
    spec: AudioSpec,
    path: PathBuf,
}

/// Segmenting WAV writer shared between a capture callback and its owner.
///
/// Samples accumulate until one segment is buffered; the segment is then
/// appended to the file and the writer flushed, so the WAV header is valid
/// after every segment. Clones share the same file.
#[derive(Clone)]
pub struct AudioSink {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AudioSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSink")
            .field("path", &self.shared.path)
            .field("spec", &self.shared.spec)
            .field("segment_len", &self.shared.segment_len)
            .finish_non_exhaustive()
    }
}

impl AudioSink {
    /// Starts a 16-bit PCM WAV file on `file`.
    ///
    /// # Errors
    ///
    /// Returns `Wav` if the header cannot be written.
    pub fn new(file: File, path: PathBuf, spec: AudioSpec, segment_ms: u64) -> Result<Self> {
        let wav_spec = WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::new(BufWriter::new(file), wav_spec)?;
        let segment_len = spec.samples_for(segment_ms).max(1);

        info!(
            "Audio file created at: {} ({} Hz, {} ch)",
            path.display(),
            spec.sample_rate,
            spec.channels
        );

        Ok(Self {
            shared: Arc::new(Shared {
                segment: Mutex::new(Vec::with_capacity(segment_len)),
                writer: Mutex::new(Some(writer)),
                segment_len,
                samples_written: AtomicU64::new(0),
                spec,
                path,
            }),
        })
    }

    /// Buffers interleaved samples, appending a segment once one is full.
    pub fn push(&self, samples: &[f32]) {
        let full = {
            let mut segment = lock(&self.shared.segment);
            segment.extend_from_slice(samples);
            if segment.len() >= self.shared.segment_len {
                Some(mem::replace(
                    &mut *segment,
                    Vec::with_capacity(self.shared.segment_len),
                ))
            } else {
                None
            }
        };

        if let Some(segment) = full {
            self.append(&segment);
        }
    }

    fn append(&self, segment: &[f32]) {
        let mut guard = lock(&self.shared.writer);
        let writer = match guard.as_mut() {
            Some(writer) => writer,
            None => return,
        };

        let result = segment
            .iter()
            .try_for_each(|&sample| writer.write_sample(to_pcm16(sample)))
            .and_then(|()| writer.flush());

        match result {
            Ok(()) => {
                self.shared
                    .samples_written
                    .fetch_add(segment.len() as u64, Ordering::Relaxed);
            }
            Err(e) => error!(
                "Failed to write audio segment to {}: {}",
                self.shared.path.display(),
                e
            ),
        }
    }

    /// Writes the partial segment and finalizes the file.
    ///
    /// Returns the number of samples in the file. Later pushes are ignored.
    pub fn finish(&self) -> Result<u64> {
        let remainder = mem::take(&mut *lock(&self.shared.segment));
        if !remainder.is_empty() {
            self.append(&remainder);
        }

        if let Some(writer) = lock(&self.shared.writer).take() {
            writer.finalize()?;
            let written = self.samples_written();
            let frames = written / u64::from(self.shared.spec.channels.max(1));
            info!(
                "Audio file finalized: {} ({:.1}s)",
                self.shared.path.display(),
                frames as f64 / f64::from(self.shared.spec.sample_rate)
            );
        }

        Ok(self.samples_written())
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn spec(&self) -> AudioSpec {
        self.shared.spec
    }

    /// Interleaved samples per appended segment.
    pub fn segment_len(&self) -> usize {
        self.shared.segment_len
    }

    pub fn samples_written(&self) -> u64 {
        self.shared.samples_written.load(Ordering::Relaxed)
    }
}

/// Capture thread for one session.
pub struct AudioSidecar {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    done: Receiver<()>,
    sink: AudioSink,
}

impl AudioSidecar {
    /// Starts `source` capturing into `sink` on a dedicated thread.
    pub fn spawn(source: Arc<dyn AudioSource>, sink: AudioSink) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        // Never sent on; disconnects when the thread exits
        let (done_tx, done) = bounded::<()>(0);

        let handle = thread::Builder::new().name("audio-capture".to_string()).spawn({
            let running = Arc::clone(&running);
            let sink = sink.clone();
            move || {
                let _done = done_tx;
                if let Err(e) = source.capture(sink, running) {
                    error!("Audio capture failed: {}", e);
                }
                debug!("Audio capture thread exiting");
            }
        })?;

        Ok(Self {
            running,
            handle: Some(handle),
            done,
            sink,
        })
    }

    pub fn path(&self) -> &Path {
        self.sink.path()
    }

    /// Stops capture, waiting at most `timeout`, and finalizes the WAV file.
    ///
    /// A thread that does not stop in time is detached; the file is finalized
    /// regardless and any samples it pushes afterwards are discarded.
    pub fn stop(mut self, timeout: Duration) -> Result<u64> {
        self.running.store(false, Ordering::Release);

        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Audio capture thread did not stop within {:?}; detaching it",
                    timeout
                );
                self.handle.take();
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        error!("Audio capture thread panicked");
                    }
                }
            }
        }

        self.sink.finish()
    }
}

impl Drop for AudioSidecar {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectorError;
    use std::time::Instant;

    fn sink_in(dir: &Path, spec: AudioSpec, segment_ms: u64) -> AudioSink {
        let path = dir.join("audio_test.wav");
        let file = File::create(&path).unwrap();
        AudioSink::new(file, path, spec, segment_ms).unwrap()
    }

    fn read_samples(path: &Path) -> (WavSpec, Vec<i16>) {
        let mut reader = hound::WavReader::open(path).unwrap();
        let spec = reader.spec();
        let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    /// Pushes fixed chunks until told to stop.
    struct ToneSource {
        chunk: Vec<f32>,
    }

    impl AudioSource for ToneSource {
        fn open(&self) -> Result<AudioSpec> {
            Ok(AudioSpec { sample_rate: 8000, channels: 1 })
        }

        fn capture(&self, sink: AudioSink, running: Arc<AtomicBool>) -> Result<()> {
            while running.load(Ordering::Acquire) {
                sink.push(&self.chunk);
                thread::sleep(Duration::from_millis(2));
            }
            Ok(())
        }
    }

    /// Ignores the stop flag for a while.
    struct StuckSource;

    impl AudioSource for StuckSource {
        fn open(&self) -> Result<AudioSpec> {
            Ok(AudioSpec { sample_rate: 8000, channels: 1 })
        }

        fn capture(&self, sink: AudioSink, _running: Arc<AtomicBool>) -> Result<()> {
            thread::sleep(Duration::from_millis(400));
            sink.push(&[0.5; 16]);
            Ok(())
        }
    }

    struct BrokenSource;

    impl AudioSource for BrokenSource {
        fn open(&self) -> Result<AudioSpec> {
            Ok(AudioSpec { sample_rate: 8000, channels: 1 })
        }

        fn capture(&self, _sink: AudioSink, _running: Arc<AtomicBool>) -> Result<()> {
            Err(CollectorError::Audio("device vanished".to_string()))
        }
    }

    #[test]
    fn test_to_pcm16() {
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(1.0), 32767);
        assert_eq!(to_pcm16(-1.0), -32767);
        assert_eq!(to_pcm16(0.5), 16383);

        // Out of range input is clamped rather than wrapped
        assert_eq!(to_pcm16(2.5), 32767);
        assert_eq!(to_pcm16(-7.0), -32767);
    }

    #[test]
    fn test_segment_len_includes_channels() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), AudioSpec { sample_rate: 8000, channels: 2 }, 1000);
        assert_eq!(sink.segment_len(), 16_000);
    }

    #[test]
    fn test_segments_appended_when_full() {
        let dir = tempfile::tempdir().unwrap();
        // 100ms at 8kHz mono = 800 samples per segment
        let sink = sink_in(dir.path(), AudioSpec { sample_rate: 8000, channels: 1 }, 100);

        sink.push(&[0.25; 500]);
        assert_eq!(sink.samples_written(), 0);

        sink.push(&[0.25; 500]);
        assert_eq!(sink.samples_written(), 1000);

        // Header is kept valid between segments
        let (_, samples) = read_samples(sink.path());
        assert_eq!(samples.len(), 1000);
    }

    #[test]
    fn test_finish_writes_partial_segment() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), AudioSpec { sample_rate: 8000, channels: 1 }, 100);

        sink.push(&[-0.5; 900]);
        sink.push(&[0.5; 50]);
        assert_eq!(sink.finish().unwrap(), 950);

        let (spec, samples) = read_samples(sink.path());
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.channels, 1);
        assert_eq!(samples.len(), 950);
        assert_eq!(samples[0], to_pcm16(-0.5));
        assert_eq!(samples[949], to_pcm16(0.5));
    }

    #[test]
    fn test_push_after_finish_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), AudioSpec { sample_rate: 8000, channels: 1 }, 10);

        sink.push(&[0.1; 80]);
        sink.finish().unwrap();
        sink.push(&[0.1; 800]);

        assert_eq!(sink.finish().unwrap(), 80);
        assert_eq!(read_samples(sink.path()).1.len(), 80);
    }

    #[test]
    fn test_stereo_interleaving_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), AudioSpec { sample_rate: 8000, channels: 2 }, 1);

        let frames: Vec<f32> = (0..8).flat_map(|_| [1.0, -1.0]).collect();
        sink.push(&frames);
        sink.finish().unwrap();

        let (spec, samples) = read_samples(sink.path());
        assert_eq!(spec.channels, 2);
        assert_eq!(samples.len(), 16);
        assert!(samples.chunks(2).all(|frame| frame == [32767, -32767]));
    }

    #[test]
    fn test_sidecar_records_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), AudioSpec { sample_rate: 8000, channels: 1 }, 10);
        let path = sink.path().to_path_buf();

        let source: Arc<dyn AudioSource> = Arc::new(ToneSource { chunk: vec![0.3; 40] });
        let sidecar = AudioSidecar::spawn(source, sink).unwrap();
        thread::sleep(Duration::from_millis(50));

        let written = sidecar.stop(Duration::from_secs(1)).unwrap();
        assert!(written > 0);
        assert_eq!(written % 40, 0);

        let (_, samples) = read_samples(&path);
        assert_eq!(samples.len() as u64, written);
        assert!(samples.iter().all(|&s| s == to_pcm16(0.3)));
    }

    #[test]
    fn test_sidecar_stop_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), AudioSpec { sample_rate: 8000, channels: 1 }, 10);
        let path = sink.path().to_path_buf();

        let sidecar = AudioSidecar::spawn(Arc::new(StuckSource), sink).unwrap();

        let started = Instant::now();
        let written = sidecar.stop(Duration::from_millis(20)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(written, 0);

        // File is finalized even though the thread was detached
        assert!(read_samples(&path).1.is_empty());
    }

    #[test]
    fn test_failed_capture_leaves_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), AudioSpec { sample_rate: 8000, channels: 1 }, 10);
        let path = sink.path().to_path_buf();

        let sidecar = AudioSidecar::spawn(Arc::new(BrokenSource), sink).unwrap();
        assert_eq!(sidecar.stop(Duration::from_secs(1)).unwrap(), 0);
        assert!(read_samples(&path).1.is_empty());
    }
}
