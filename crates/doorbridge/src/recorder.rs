//! Session log files.
//!
//! One CSV file per session:
//! ```text
//! {sessions_dir}/
//! ├── session_20261016_071502.csv
//! └── session_20261016_071502_1.csv   # second session within the same second
//! ```
//!
//! Each sample is flushed as soon as it is written. The device stream cannot
//! be replayed, so a crash may lose at most the line being written.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::classify::Sample;

/// First line of every session log.
pub const HEADER: &str = "delta_ms,adc1_v,adc2_v";

/// File extension for session logs.
pub const EXTENSION: &str = "csv";

/// Upper bound on `_N` suffixes tried for one timestamp.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Errors from creating or writing a session log.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to create sessions directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to create session log {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("failed to write session log {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("no free session log name for {stem} in {dir}")]
    NameExhausted { dir: PathBuf, stem: String },
}

/// Base file name (without extension) for a session started at `started_at`.
pub fn session_stem(started_at: &DateTime<Local>) -> String {
    format!("session_{}", started_at.format("%Y%m%d_%H%M%S"))
}

/// Summary returned when a session log is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedLog {
    pub path: PathBuf,
    pub samples: u64,
}

/// Destination for session log lines.
pub trait LogSink: Write + Send {
    /// Push written data to durable storage.
    fn sync(&mut self) -> io::Result<()>;
}

impl LogSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// An open, append-only session log.
pub struct SessionLog {
    path: PathBuf,
    sink: Box<dyn LogSink>,
    samples: u64,
}

impl fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLog")
            .field("path", &self.path)
            .field("samples", &self.samples)
            .finish_non_exhaustive()
    }
}

impl SessionLog {
    /// Create a new log in `dir` named after `started_at` and write the header.
    ///
    /// Existing files are never truncated; a numeric suffix is added instead.
    pub fn create(dir: &Path, started_at: &DateTime<Local>) -> Result<Self, SessionError> {
        let stem = session_stem(started_at);

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{stem}.{EXTENSION}")
            } else {
                format!("{stem}_{attempt}.{EXTENSION}")
            };
            let path = dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Self::with_sink(path, Box::new(file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(SessionError::Create { path, source: e }),
            }
        }

        Err(SessionError::NameExhausted {
            dir: dir.to_path_buf(),
            stem,
        })
    }

    /// Start a log at `path` on an already-open sink and write the header.
    pub(crate) fn with_sink(path: PathBuf, sink: Box<dyn LogSink>) -> Result<Self, SessionError> {
        let mut log = Self {
            path,
            sink,
            samples: 0,
        };
        log.write_line(HEADER)?;
        Ok(log)
    }

    /// Append one sample and flush it.
    pub fn append(&mut self, sample: &Sample) -> Result<(), SessionError> {
        self.write_line(&sample.to_csv_row())?;
        self.samples += 1;
        Ok(())
    }

    /// Flush, sync, and release the file.
    pub fn close(mut self) -> Result<ClosedLog, SessionError> {
        let path = self.path.clone();
        self.sink
            .flush()
            .and_then(|()| self.sink.sync())
            .map_err(|e| SessionError::Write {
                path: path.clone(),
                source: e,
            })?;

        Ok(ClosedLog {
            path,
            samples: self.samples,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Samples written so far (header excluded).
    pub fn samples(&self) -> u64 {
        self.samples
    }

    fn write_line(&mut self, line: &str) -> Result<(), SessionError> {
        // Line and newline go out in a single write_all
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        self.sink
            .write_all(buf.as_bytes())
            .and_then(|()| self.sink.flush())
            .map_err(|e| SessionError::Write {
                path: self.path.clone(),
                source: e,
            })
    }
}

/// Accepts a fixed number of writes, then fails every write.
#[cfg(test)]
pub(crate) struct FailAfter {
    writes_left: usize,
}

#[cfg(test)]
impl FailAfter {
    pub(crate) fn writes(n: usize) -> Self {
        Self { writes_left: n }
    }
}

#[cfg(test)]
impl Write for FailAfter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.writes_left == 0 {
            return Err(io::Error::other("no space left on device"));
        }
        self.writes_left -= 1;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
impl LogSink for FailAfter {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn started_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 16, 7, 15, 2).unwrap()
    }

    #[test]
    fn test_session_stem() {
        assert_eq!(session_stem(&started_at()), "session_20261016_071502");
    }

    #[test]
    fn test_create_writes_header() {
        let temp_dir = TempDir::new().unwrap();
        let log = SessionLog::create(temp_dir.path(), &started_at()).unwrap();

        assert_eq!(
            log.path(),
            temp_dir.path().join("session_20261016_071502.csv")
        );
        let closed = log.close().unwrap();
        assert_eq!(closed.samples, 0);
        assert_eq!(
            std::fs::read_to_string(&closed.path).unwrap(),
            "delta_ms,adc1_v,adc2_v\n"
        );
    }

    #[test]
    fn test_append_is_visible_before_close() {
        let temp_dir = TempDir::new().unwrap();
        let mut log = SessionLog::create(temp_dir.path(), &started_at()).unwrap();

        log.append(&Sample::new(10, 1.0, 0.5).unwrap()).unwrap();
        log.append(&Sample::new(20, 1.1, 0.6).unwrap()).unwrap();
        assert_eq!(log.samples(), 2);

        // Flushed per line, so a reader sees both rows while the log is open
        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents, "delta_ms,adc1_v,adc2_v\n10,1.0,0.5\n20,1.1,0.6\n");

        let closed = log.close().unwrap();
        assert_eq!(closed.samples, 2);
    }

    #[test]
    fn test_same_second_gets_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let first = SessionLog::create(temp_dir.path(), &started_at()).unwrap();
        let second = SessionLog::create(temp_dir.path(), &started_at()).unwrap();
        let third = SessionLog::create(temp_dir.path(), &started_at()).unwrap();

        assert!(first.path().ends_with("session_20261016_071502.csv"));
        assert!(second.path().ends_with("session_20261016_071502_1.csv"));
        assert!(third.path().ends_with("session_20261016_071502_2.csv"));
    }

    #[test]
    fn test_existing_file_is_not_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let existing = temp_dir.path().join("session_20261016_071502.csv");
        std::fs::write(&existing, "keep me\n").unwrap();

        let log = SessionLog::create(temp_dir.path(), &started_at()).unwrap();
        assert_ne!(log.path(), existing.as_path());
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "keep me\n");
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");

        let err = SessionLog::create(&missing, &started_at()).unwrap_err();
        assert!(matches!(err, SessionError::Create { .. }));
    }

    #[test]
    fn test_failed_append_reports_path() {
        let path = PathBuf::from("/var/lib/doorbridge/session_20261016_071502.csv");
        // Header and one sample, then the device is full
        let mut log = SessionLog::with_sink(path.clone(), Box::new(FailAfter::writes(2))).unwrap();

        log.append(&Sample::new(10, 1.0, 0.5).unwrap()).unwrap();
        let err = log.append(&Sample::new(20, 1.1, 0.6).unwrap()).unwrap_err();

        match err {
            SessionError::Write { path: failed, source } => {
                assert_eq!(failed, path);
                assert_eq!(source.kind(), io::ErrorKind::Other);
            }
            other => panic!("expected a write error, got {:?}", other),
        }
        assert_eq!(log.samples(), 1);
    }
}
