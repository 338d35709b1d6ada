//! Steplog Core Library
//!
//! Scoped, elapsed-time logging with a single background file writer.
//!
//! ## Overview
//!
//! Code that handles a unit of work (a request, a job) opens a
//! [`ScopedLogger`], commits messages as it goes, and flushes at the end.
//! Every commit is stamped with the time since the previous commit and since
//! the scope began, and echoed to the console right away. On flush the
//! scope's records are handed to the shared sink as one contiguous batch,
//! unless the whole unit finished faster than the configured minimum.
//!
//! The sink is a queue drained by one writer thread. The writer collapses
//! repeats of the same error inside a time window into a single summary line
//! and appends everything to `<base_dir>/Temp/Logs/<Severity>/<yyyyMMdd>.log`.
//! A failed write is reported on the Error channel and never stops the writer.
//!
//! ## Quick Start
//!
//! ```ignore
//! use steplog_core::{commit_error, commit_info, LogConfig, LogService, ScopeOptions, StepLogger};
//!
//! let service = LogService::start(LogConfig::new("/srv/app"))?;
//!
//! let scope = service.scope(ScopeOptions::default().with_title("POST /upload"))?;
//! commit_info!(scope, "received {} bytes", 4096)?;
//! if let Err(e) = store_upload() {
//!     scope.commit_error_value(&e)?;
//! }
//! scope.flush()?;
//!
//! service.shutdown()?;
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod layer;
pub mod record;
pub mod runner;
pub mod scope;
pub mod sink;

// Re-exports
pub use config::{LogConfig, ScopeOptions};
pub use console::ConsoleMirror;
pub use error::{LogError, LogResult};
pub use layer::SinkLayer;
pub use record::{Fault, LogRecord, Severity};
pub use scope::{DirectLogger, ScopedLogger, StepLogger};
pub use sink::{
    log_file_path, Admission, DailyFileStore, DedupCache, Fingerprint, LogService, LogStore,
    PendingQueue, RecordSink, SinkHandle, SinkWorker,
};
