//! Durable destination for rendered lines.
//!
//! Lines land in one append-only file per severity per day:
//!
//! ```text
//! <base_dir>/Temp/Logs/
//! ├── Error/
//! │   └── 20260121.log
//! ├── Information/
//! │   ├── 20260120.log
//! │   └── 20260121.log
//! └── None/                # scope banners
//!     └── 20260121.log
//! ```

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::record::Severity;

/// Somewhere the writer can append lines.
///
/// Implementations must have made the line durable (flushed) when `append`
/// returns `Ok`.
pub trait LogStore: Send {
    fn append(&mut self, severity: Severity, date: NaiveDate, line: &str) -> io::Result<()>;
}

/// Path of the file holding `severity` records for `date`.
pub fn log_file_path(logs_dir: &Path, severity: Severity, date: NaiveDate) -> PathBuf {
    logs_dir
        .join(severity.as_str())
        .join(format!("{}.log", date.format("%Y%m%d")))
}

/// Per-day, per-severity files under a logs directory.
pub struct DailyFileStore {
    /// Root of the tree, usually `<base_dir>/Temp/Logs`
    logs_dir: PathBuf,

    /// Day the cached handles belong to
    day: Option<NaiveDate>,

    /// Open handles for `day`, keyed by severity
    files: HashMap<Severity, File>,
}

impl DailyFileStore {
    /// Create a store rooted at `logs_dir`. Directories are created lazily.
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            day: None,
            files: HashMap::new(),
        }
    }

    /// Root of the log tree.
    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn path_for(&self, severity: Severity, date: NaiveDate) -> PathBuf {
        log_file_path(&self.logs_dir, severity, date)
    }

    fn open(&self, severity: Severity, date: NaiveDate) -> io::Result<File> {
        let path = self.path_for(severity, date);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)
    }
}

impl LogStore for DailyFileStore {
    fn append(&mut self, severity: Severity, date: NaiveDate, line: &str) -> io::Result<()> {
        if self.day != Some(date) {
            // Handles from another day point at yesterday's files
            self.files.clear();
            self.day = Some(date);
        }

        if !self.files.contains_key(&severity) {
            let file = self.open(severity, date)?;
            self.files.insert(severity, file);
        }

        let result = match self.files.get_mut(&severity) {
            Some(file) => file.write_all(line.as_bytes()).and_then(|_| file.flush()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "log file handle missing")),
        };

        if result.is_err() {
            // Reopen on the next write instead of reusing a broken handle
            self.files.remove(&severity);
        }
        result
    }
}
