//! Background sampling loop.
//!
//! Each iteration reads the sensor source, buffers one sample labeled with the
//! held buttons and flushes when either the buffer reaches the size threshold
//! or the flush interval has elapsed. Failures are logged and followed by a
//! back-off sleep; the interval flush still runs on failed iterations. The
//! loop only exits when the session's running flag clears.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver};
use tracing::{debug, info, warn};

use super::sample::{Label, Sample};
use super::session::{FlushOutcome, SessionCore};
use crate::controller::edge::EdgeDetector;
use crate::error::Result;

/// Name of the sampling thread.
pub const SAMPLER_THREAD: &str = "sensor-sampler";

/// Starts the loop for `core`.
///
/// The returned receiver disconnects when the thread exits, which lets the
/// caller bound its wait with `recv_timeout`.
pub(crate) fn spawn(core: Arc<SessionCore>) -> Result<(JoinHandle<()>, Receiver<()>)> {
    let (done_tx, done_rx) = bounded::<()>(0);

    let handle = thread::Builder::new()
        .name(SAMPLER_THREAD.to_string())
        .spawn(move || {
            let _done = done_tx;
            run(&core);
        })?;

    Ok((handle, done_rx))
}

fn run(core: &SessionCore) {
    let config = &core.config;
    let mut edges = EdgeDetector::new();
    let mut last_flush = Instant::now();
    let mut records: u64 = 0;

    info!("Sampling started for session {}", core.session_id);

    while core.is_running() {
        let reading = match core.source.read() {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Sampling iteration failed: {}", e);
                // Samples already buffered still age out on the interval
                if last_flush.elapsed() >= config.flush_interval() {
                    core.flush();
                    last_flush = Instant::now();
                }
                thread::sleep(config.error_backoff());
                continue;
            }
        };

        let changes = edges.update(reading.buttons);
        if !changes.is_empty() {
            core.record_presses(&changes);
        }

        let sample = Sample::capture(
            &reading,
            Label::Buttons(reading.buttons),
            &core.session_id,
            core.audio_file.as_ref(),
        );
        let buffered = core.record(sample);
        records += 1;

        if records % config.log_every_records.max(1) == 0 {
            debug!(
                "Gyro: P={:.2}, Y={:.2}, R={:.2} | Acc: X={:.2}, Y={:.2}, Z={:.2} | \
                 Records: {} | Presses: {:?}",
                reading.gyro.pitch,
                reading.gyro.yaw,
                reading.gyro.roll,
                reading.accel.x,
                reading.accel.y,
                reading.accel.z,
                records,
                core.press_counts()
            );
        }

        if buffered >= config.flush_threshold || last_flush.elapsed() >= config.flush_interval() {
            let outcome = core.flush();
            last_flush = Instant::now();
            if outcome == FlushOutcome::Failed {
                thread::sleep(config.error_backoff());
                continue;
            }
        }

        thread::sleep(config.sample_interval());
    }

    debug!(
        "Sampling loop for session {} exited after {} samples",
        core.session_id, records
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecorderConfig;
    use crate::controller::source::{MockSensorSource, SensorReading};
    use crate::recorder::csv_sink::testing::FlakyFile;
    use crate::recorder::csv_sink::CsvSink;
    use crossbeam_channel::RecvTimeoutError;
    use std::fs::File;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_sampling_continues_after_failed_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sampler.csv");
        let failures = Arc::new(AtomicUsize::new(0));
        let file = FlakyFile::new(File::create(&path).unwrap(), Arc::clone(&failures));
        let sink = CsvSink::new(file, path.clone(), false).unwrap();

        let mut source = MockSensorSource::new();
        source.expect_read().returning(|| Ok(SensorReading::default()));

        let config = RecorderConfig {
            output_dir: dir.path().to_path_buf(),
            flush_threshold: 5,
            sample_interval_us: 100,
            error_backoff_ms: 1,
            flush_interval_ms: 60_000,
            ..RecorderConfig::default()
        };
        let core = Arc::new(SessionCore::new(
            config,
            Arc::from("sampler_test"),
            None,
            Arc::new(source),
            sink,
        ));

        // The first two batches hit a full disk
        failures.store(2, Ordering::SeqCst);
        let (handle, done) = spawn(Arc::clone(&core)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while core.rows_written() < 10 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        core.running.store(false, Ordering::Release);
        assert!(matches!(
            done.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        ));
        handle.join().unwrap();

        assert_eq!(failures.load(Ordering::SeqCst), 0);
        assert!(core.rows_written() >= 10);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows = reader.records().count() as u64;
        assert_eq!(rows, core.rows_written());
    }
}
