//! State shared between a session's sampling thread and its callers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

use super::buffer::SampleBuffer;
use super::csv_sink::CsvSink;
use super::sample::Sample;
use crate::config::RecorderConfig;
use crate::controller::buttons::Button;
use crate::controller::edge::{ButtonEdge, PressCounter};
use crate::controller::source::SensorSource;
use crate::sync::{lock, lock_with_timeout};

/// Result of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Rows appended and flushed to the OS
    Written(usize),
    /// Nothing was buffered
    Empty,
    /// The session file is already closed
    Closed,
    /// A lock could not be taken in time; samples stay buffered
    LockTimeout,
    /// The write failed; the drained batch is lost
    Failed,
    /// No session is active
    Inactive,
}

pub(crate) struct SessionCore {
    pub(crate) config: RecorderConfig,
    pub(crate) session_id: Arc<str>,
    pub(crate) audio_file: Option<Arc<str>>,
    pub(crate) source: Arc<dyn SensorSource>,
    pub(crate) running: AtomicBool,
    pub(crate) buffer: SampleBuffer,
    sink: Mutex<Option<CsvSink>>,
    latest: Mutex<Option<Sample>>,
    presses: Mutex<PressCounter>,
    rows_written: AtomicU64,
}

impl SessionCore {
    pub(crate) fn new(
        config: RecorderConfig,
        session_id: Arc<str>,
        audio_file: Option<Arc<str>>,
        source: Arc<dyn SensorSource>,
        sink: CsvSink,
    ) -> Self {
        let buffer = SampleBuffer::new(config.max_buffered_samples);
        Self {
            config,
            session_id,
            audio_file,
            source,
            running: AtomicBool::new(true),
            buffer,
            sink: Mutex::new(Some(sink)),
            latest: Mutex::new(None),
            presses: Mutex::new(PressCounter::new()),
            rows_written: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Buffers `sample` and returns the buffered count.
    pub(crate) fn record(&self, sample: Sample) -> usize {
        *lock(&self.latest) = Some(sample.clone());
        self.buffer.push(sample)
    }

    pub(crate) fn record_presses(&self, edges: &[ButtonEdge]) {
        lock(&self.presses).record(edges);
    }

    pub(crate) fn latest(&self) -> Option<Sample> {
        lock(&self.latest).clone()
    }

    pub(crate) fn press_counts(&self) -> Vec<(Button, u64)> {
        lock(&self.presses).nonzero()
    }

    pub(crate) fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    /// Writes everything buffered to the session file.
    ///
    /// Flushes are serialized by the file lock. The buffer lock is only held
    /// while draining, never during the write.
    pub(crate) fn flush(&self) -> FlushOutcome {
        let timeout = self.config.lock_timeout();

        let mut guard = match lock_with_timeout(&self.sink, timeout) {
            Some(guard) => guard,
            None => {
                warn!("CSV file busy for {:?}; skipping flush", timeout);
                return FlushOutcome::LockTimeout;
            }
        };
        let sink = match guard.as_mut() {
            Some(sink) => sink,
            None => return FlushOutcome::Closed,
        };

        let batch = match self.buffer.drain(timeout) {
            Some(batch) => batch,
            None => {
                warn!("Sample buffer busy for {:?}; skipping flush", timeout);
                return FlushOutcome::LockTimeout;
            }
        };
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        match sink.write_batch(&batch) {
            Ok(written) => {
                self.rows_written.fetch_add(written as u64, Ordering::Relaxed);
                debug!("Flushed {} samples to {}", written, sink.path().display());
                FlushOutcome::Written(written)
            }
            Err(e) => {
                error!(
                    "Failed to write {} samples to {}: {}",
                    batch.len(),
                    sink.path().display(),
                    e
                );
                FlushOutcome::Failed
            }
        }
    }

    /// Closes the session file. Later flushes report [`FlushOutcome::Closed`].
    ///
    /// Gives up after the lock timeout if a stuck writer still holds the file;
    /// the file then stays open and `None` is returned.
    pub(crate) fn close(&self) -> Option<PathBuf> {
        let timeout = self.config.lock_timeout();
        let sink = match lock_with_timeout(&self.sink, timeout) {
            Some(mut guard) => guard.take()?,
            None => {
                error!("CSV file still busy after {:?}; leaving it open", timeout);
                return None;
            }
        };
        let path = sink.path().to_path_buf();

        match sink.close() {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Failed to close {}: {}", path.display(), e);
                Some(path)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::source::{MockSensorSource, SensorReading};
    use crate::recorder::csv_sink::testing::FlakyFile;
    use crate::recorder::csv_sink::SessionFile;
    use crate::recorder::sample::Label;
    use std::fs::File;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn core_with(dir: &Path, file: impl SessionFile + 'static) -> SessionCore {
        let config = RecorderConfig {
            output_dir: dir.to_path_buf(),
            lock_timeout_ms: 20,
            ..RecorderConfig::default()
        };
        let sink = CsvSink::new(file, dir.join("core_test.csv"), false).unwrap();
        SessionCore::new(
            config,
            Arc::from("core_test"),
            None,
            Arc::new(MockSensorSource::new()),
            sink,
        )
    }

    fn core_in(dir: &Path) -> SessionCore {
        core_with(dir, File::create(dir.join("core_test.csv")).unwrap())
    }

    fn rows_in(dir: &Path) -> Vec<csv::StringRecord> {
        let mut reader = csv::Reader::from_path(dir.join("core_test.csv")).unwrap();
        reader.records().map(|r| r.unwrap()).collect()
    }

    fn event(core: &SessionCore, name: &str) -> Sample {
        Sample::capture(
            &SensorReading::default(),
            Label::Event(name.to_string()),
            &core.session_id,
            None,
        )
    }

    #[test]
    fn test_flush_writes_buffered_samples() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_in(dir.path());

        core.record(event(&core, "a"));
        core.record(event(&core, "b"));
        assert_eq!(core.flush(), FlushOutcome::Written(2));
        assert_eq!(core.rows_written(), 2);
        assert!(core.buffer.is_empty());

        assert_eq!(core.flush(), FlushOutcome::Empty);
    }

    #[test]
    fn test_flush_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_in(dir.path());

        assert!(core.close().is_some());
        core.record(event(&core, "late"));
        assert_eq!(core.flush(), FlushOutcome::Closed);

        // Nothing lost: the sample is still buffered
        assert_eq!(core.buffer.len(), 1);
        assert!(core.close().is_none());
    }

    #[test]
    fn test_flush_skipped_while_file_locked() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_in(dir.path());
        core.record(event(&core, "a"));

        let held = core.sink.lock().unwrap();
        assert_eq!(core.flush(), FlushOutcome::LockTimeout);
        drop(held);

        assert_eq!(core.buffer.len(), 1);
        assert_eq!(core.flush(), FlushOutcome::Written(1));
    }

    #[test]
    fn test_close_gives_up_while_file_locked() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_in(dir.path());
        core.record(event(&core, "a"));

        let held = core.sink.lock().unwrap();
        let started = Instant::now();
        assert_eq!(core.flush(), FlushOutcome::LockTimeout);
        assert!(core.close().is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
        drop(held);

        // Still open; a later close succeeds
        assert!(core.close().is_some());
    }

    #[test]
    fn test_failed_write_drops_batch_and_session_continues() {
        let dir = tempfile::tempdir().unwrap();
        let failures = Arc::new(AtomicUsize::new(0));
        let file = FlakyFile::new(
            File::create(dir.path().join("core_test.csv")).unwrap(),
            Arc::clone(&failures),
        );
        let core = core_with(dir.path(), file);

        failures.store(1, Ordering::SeqCst);
        core.record(event(&core, "lost_1"));
        core.record(event(&core, "lost_2"));
        assert_eq!(core.flush(), FlushOutcome::Failed);
        assert!(core.buffer.is_empty());
        assert_eq!(core.rows_written(), 0);

        core.record(event(&core, "kept"));
        assert_eq!(core.flush(), FlushOutcome::Written(1));
        assert_eq!(core.rows_written(), 1);

        let rows = rows_in(dir.path());
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][1], "EVENT:kept");
    }

    #[test]
    fn test_latest_sample_tracks_last_record() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_in(dir.path());
        assert!(core.latest().is_none());

        core.record(event(&core, "first"));
        core.record(event(&core, "second"));
        assert_eq!(core.latest().unwrap().label.to_string(), "EVENT:second");

        // Flushing does not clear the live readout
        core.flush();
        assert!(core.latest().is_some());
    }

    #[test]
    fn test_press_counts() {
        use crate::controller::edge::EdgeDetector;

        let dir = tempfile::tempdir().unwrap();
        let core = core_in(dir.path());
        let mut detector = EdgeDetector::new();

        for held in [vec![Button::Cross], vec![], vec![Button::Cross, Button::L1]] {
            let edges = detector.update(held.into_iter().collect());
            core.record_presses(&edges);
        }

        assert_eq!(core.press_counts(), vec![(Button::Cross, 2), (Button::L1, 1)]);
    }
}
