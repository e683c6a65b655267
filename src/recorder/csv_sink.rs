//! CSV output for one recording session.
//!
//! Each batch is encoded in memory and appended with a single write, so a
//! failed append loses exactly that batch and nothing is left queued for the
//! next one.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use super::sample::{header, Sample};
use crate::error::{CollectorError, Result};

/// Destination of session rows.
pub trait SessionFile: Write + Send {
    /// Forces written data to durable storage.
    fn sync(&mut self) -> io::Result<()>;
}

impl SessionFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Open session file.
pub struct CsvSink {
    file: Box<dyn SessionFile>,
    path: PathBuf,
}

impl fmt::Debug for CsvSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvSink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CsvSink {
    /// Writes the header row to a freshly created session file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the header cannot be written.
    pub fn new(file: impl SessionFile + 'static, path: PathBuf, with_audio: bool) -> Result<Self> {
        let mut sink = Self {
            file: Box::new(file),
            path,
        };

        let header = encode([header(with_audio)])?;
        sink.append(&header)?;

        info!("CSV file created at: {}", sink.path.display());
        Ok(sink)
    }

    /// Appends `samples` in order and flushes them to the OS.
    pub fn write_batch(&mut self, samples: &[Sample]) -> Result<usize> {
        let rows = encode(samples.iter().map(Sample::to_record))?;
        self.append(&rows)?;
        Ok(samples.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes, syncs and closes the file.
    pub fn close(mut self) -> Result<PathBuf> {
        self.file.flush()?;
        self.file.sync()?;
        Ok(self.path)
    }

    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.flush()
    }
}

fn encode<I, R>(records: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.write_record(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| CollectorError::from(e.into_error()))
}
