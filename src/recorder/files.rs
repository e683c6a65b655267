//! Session file naming.
//!
//! Files are named `<prefix>_<sessionId>_<YYYYMMDD_HHMMSS>.<ext>`. A second
//! session started within the same second gets a `_<n>` suffix, so a new
//! session never reopens an earlier session's file.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::warn;

/// Timestamp part of session file names.
pub const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Prefix of the tabular telemetry file.
pub const CSV_PREFIX: &str = "controller_data";

/// Prefix of the companion audio file.
pub const WAV_PREFIX: &str = "audio";

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// File name for attempt `n` (0 = no suffix).
pub fn session_file_name(
    prefix: &str,
    session_id: &str,
    started_at: &DateTime<Local>,
    extension: &str,
    attempt: u32,
) -> String {
    let stamp = started_at.format(FILE_STAMP_FORMAT);
    if attempt == 0 {
        format!("{}_{}_{}.{}", prefix, session_id, stamp, extension)
    } else {
        format!("{}_{}_{}_{}.{}", prefix, session_id, stamp, attempt, extension)
    }
}

/// Open files of one session.
#[derive(Debug)]
pub struct SessionFiles {
    pub csv: File,
    pub csv_path: PathBuf,
    pub wav: Option<(File, PathBuf)>,
}

/// Creates the CSV file, plus the WAV file when `with_wav` is set, for a
/// session in `dir`.
///
/// Both names use the same suffix, so a session's files always pair up by
/// name. Existing files are never reopened.
pub fn create_session_files(
    dir: &Path,
    session_id: &str,
    started_at: &DateTime<Local>,
    with_wav: bool,
) -> io::Result<SessionFiles> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = |prefix, extension| {
            dir.join(session_file_name(prefix, session_id, started_at, extension, attempt))
        };

        let csv_path = name(CSV_PREFIX, "csv");
        let csv = match create_new(&csv_path)? {
            Some(file) => file,
            None => continue,
        };
        if !with_wav {
            return Ok(SessionFiles { csv, csv_path, wav: None });
        }

        let wav_path = name(WAV_PREFIX, "wav");
        match create_new(&wav_path) {
            Ok(Some(wav)) => {
                return Ok(SessionFiles {
                    csv,
                    csv_path,
                    wav: Some((wav, wav_path)),
                })
            }
            Ok(None) => {
                drop(csv);
                fs::remove_file(&csv_path)?;
            }
            Err(e) => {
                drop(csv);
                if let Err(cleanup) = fs::remove_file(&csv_path) {
                    warn!("Failed to remove {}: {}", csv_path.display(), cleanup);
                }
                return Err(e);
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for session {} in {}", session_id, dir.display()),
    ))
}

/// `None` if `path` already exists.
fn create_new(path: &Path) -> io::Result<Option<File>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}

/// Final path component as a string, for the audio reference column.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
