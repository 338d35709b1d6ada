//! Synchronous console echo of committed records.
//!
//! The console shows every commit as it happens, while the files only get
//! what survives deduplication.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

/// Where commit-time echoes go.
#[derive(Debug, Clone, Default)]
pub enum ConsoleMirror {
    /// Write to the process's standard output
    #[default]
    Stdout,
    /// Drop echoes
    Off,
    /// Collect echoed lines in memory
    Buffer(Arc<Mutex<Vec<String>>>),
}

impl ConsoleMirror {
    /// An in-memory mirror plus the shared buffer it fills.
    pub fn buffer() -> (Self, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        (Self::Buffer(lines.clone()), lines)
    }

    pub(crate) fn for_flag(enabled: bool) -> Self {
        if enabled {
            Self::Stdout
        } else {
            Self::Off
        }
    }

    /// Echo one rendered line (already newline terminated).
    pub fn emit(&self, line: &str) {
        match self {
            Self::Stdout => {
                let mut out = std::io::stdout().lock();
                // Echo failures are ignored
                let _ = out.write_all(line.as_bytes());
                let _ = out.flush();
            }
            Self::Off => {}
            Self::Buffer(lines) => lines.lock().push(line.to_string()),
        }
    }
}
