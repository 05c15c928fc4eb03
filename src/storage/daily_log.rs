//! Daily log file management.
//!
//! One file per calendar day, named `<YYYY>.<MM>.<DD>.dat` inside the data
//! directory. The file is opened lazily in append mode the first time a row is
//! written for a given day. A header row is written exactly once per physical
//! file: whenever the file is empty at the moment it is opened, which covers both
//! a freshly created file and an empty file left behind by an earlier run.
//!
//! # Example
//!
//! ```no_run
//! use adl_bridge::storage::DailyLogWriter;
//! use chrono::NaiveDate;
//!
//! # fn main() -> adl_bridge::error::BridgeResult<()> {
//! let mut log = DailyLogWriter::new("./data");
//! let today = NaiveDate::from_ymd_opt(2023, 5, 12).unwrap();
//! log.handle_for(today)?
//!     .append_line("D,0,2023-05-12 10:00:01,door_open\n")?;
//! log.close()?;
//! # Ok(())
//! # }
//! ```

use crate::error::{BridgeError, BridgeResult};
use crate::format::RowFormatter;
use chrono::NaiveDate;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name layout for a day's log, without extension.
pub const FILE_DATE_FORMAT: &str = "%Y.%m.%d";

/// Extension of log files.
pub const FILE_EXTENSION: &str = "dat";

/// An open log file for one calendar day.
#[derive(Debug)]
pub struct LogFile {
    date: NaiveDate,
    path: PathBuf,
    file: File,
    header_written: bool,
}

impl LogFile {
    /// Append `text` to the end of the file.
    ///
    /// The file is unbuffered: a failed append leaves nothing behind that a
    /// later flush or drop could still write.
    pub fn append_line(&mut self, text: &str) -> BridgeResult<()> {
        self.file
            .write_all(text.as_bytes())
            .map_err(|source| BridgeError::WriteFailure {
                path: self.path.clone(),
                source,
            })
    }

    /// Day this file was opened for.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Location of the file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle wrote the header when it was opened.
    pub fn header_written(&self) -> bool {
        self.header_written
    }
}

/// Owns the currently open log file and rolls it over at day boundaries.
#[derive(Debug)]
pub struct DailyLogWriter {
    data_dir: PathBuf,
    current: Option<LogFile>,
}

impl DailyLogWriter {
    /// Create a writer placing files under `data_dir`. Nothing is opened yet.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            current: None,
        }
    }

    /// Path of the log file for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.data_dir.join(format!(
            "{}.{FILE_EXTENSION}",
            date.format(FILE_DATE_FORMAT)
        ))
    }

    /// Return a handle ready for appending rows dated `today`.
    ///
    /// Opens the day's file if nothing is open, or closes the open file first when
    /// it belongs to another day. An already open file for `today` is returned
    /// unchanged.
    pub fn handle_for(&mut self, today: NaiveDate) -> BridgeResult<&mut LogFile> {
        if let Some(open) = &self.current {
            if open.date != today {
                info!(
                    from = %open.date,
                    to = %today,
                    "Day changed, rolling over log file"
                );
                self.close()?;
            }
        }

        let log = match self.current.take() {
            Some(log) => log,
            None => self.open(today)?,
        };
        Ok(self.current.insert(log))
    }

    fn open(&self, date: NaiveDate) -> BridgeResult<LogFile> {
        let path = self.path_for(date);
        let open_failure = |source| BridgeError::FileOpenFailure {
            path: path.clone(),
            source,
        };

        if !self.data_dir.as_os_str().is_empty() && !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir).map_err(open_failure)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_failure)?;
        let is_empty = file.metadata().map_err(open_failure)?.len() == 0;

        let mut log = LogFile {
            date,
            path: path.clone(),
            file,
            header_written: false,
        };

        if is_empty {
            // Not retained on failure, so the next attempt sees the file empty again.
            log.append_line(&RowFormatter::header_line())?;
            log.header_written = true;
        }

        info!(path = %path.display(), header = log.header_written, "Opened log file");
        Ok(log)
    }

    /// Sync and close the open file, if any. Calling it again is a no-op.
    pub fn close(&mut self) -> BridgeResult<()> {
        if let Some(log) = self.current.take() {
            log.file
                .sync_data()
                .map_err(|source| BridgeError::WriteFailure {
                    path: log.path.clone(),
                    source,
                })?;
            debug!(path = %log.path.display(), "Closed log file");
        }
        Ok(())
    }

    /// Drop the open handle, forcing the next row to reopen the file.
    pub fn discard(&mut self) {
        if let Some(log) = self.current.take() {
            debug!(path = %log.path.display(), "Discarding log file handle");
        }
    }

    /// Whether a file is currently open.
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Day of the currently open file.
    pub fn current_date(&self) -> Option<NaiveDate> {
        self.current.as_ref().map(|log| log.date)
    }

    /// Path of the currently open file.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|log| log.path.as_path())
    }

    /// Directory holding the log files.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
