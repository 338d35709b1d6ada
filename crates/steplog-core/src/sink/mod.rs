//! The shared sink: pending queue, writer thread, and the service owning them.
//!
//! ## Architecture
//!
//! ```text
//!  ScopedLogger ─┐  submit(batch)   ┌──────────────┐  pop   ┌────────────┐
//!  ScopedLogger ─┼────────────────▶ │ PendingQueue │ ─────▶ │ SinkWorker │ ─▶ Temp/Logs/<Severity>/<yyyyMMdd>.log
//!  SinkLayer    ─┘                  └──────────────┘        │  + dedup   │
//!                                                           └────────────┘
//!                                                     (interval runner thread)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use steplog_core::{commit_info, LogConfig, LogService, ScopeOptions, StepLogger};
//!
//! let service = LogService::start(LogConfig::new("/srv/app"))?;
//!
//! let scope = service.scope(ScopeOptions::default().with_title("GET /orders"))?;
//! commit_info!(scope, "loaded {} orders", 42)?;
//! scope.flush()?;
//!
//! service.shutdown()?;
//! ```

pub mod dedup;
pub mod queue;
pub mod store;
pub mod worker;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{LogConfig, ScopeOptions};
use crate::error::{LogError, LogResult};
use crate::record::{Fault, LogRecord, Severity};
use crate::runner::{spawn_interval, RunnerHandle};
use crate::scope::{DirectLogger, ScopedLogger};

pub use dedup::{Admission, DedupCache, Fingerprint};
pub use queue::{Dequeued, PendingQueue};
pub use store::{log_file_path, DailyFileStore, LogStore};
pub use worker::SinkWorker;

/// Destination for finished records.
pub trait RecordSink: Send + Sync {
    /// Hand over a batch. The batch stays contiguous and in order.
    fn submit(&self, records: Vec<LogRecord>) -> LogResult<()>;
}

/// Cloneable producer handle to the shared queue.
#[derive(Clone)]
pub struct SinkHandle {
    queue: Arc<PendingQueue>,
}

impl SinkHandle {
    /// Records waiting for the writer.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Block until everything submitted so far has been written.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        self.queue.wait_drained(timeout)
    }

    /// Queue a single record outside any scope (no elapsed times).
    pub fn write(&self, severity: Severity, message: fmt::Arguments<'_>) -> LogResult<()> {
        let message = message.to_string();
        if message.is_empty() {
            return Err(LogError::invalid("message", "must not be empty"));
        }
        self.submit(vec![LogRecord::new(severity, message)])
    }

    /// Queue a single record carrying a fault, outside any scope.
    pub fn write_fault(&self, severity: Severity, message: &str, fault: Fault) -> LogResult<()> {
        if message.is_empty() && fault.message_text().is_empty() {
            return Err(LogError::invalid("fault", "message must not be empty"));
        }
        self.submit(vec![LogRecord::new(severity, message).with_fault(fault)])
    }
}

impl RecordSink for SinkHandle {
    fn submit(&self, records: Vec<LogRecord>) -> LogResult<()> {
        self.queue.push_batch(records)
    }
}

impl fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkHandle")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Owns the writer thread. Create one at startup, shut it down at exit.
pub struct LogService {
    config: LogConfig,
    handle: SinkHandle,
    cancel: CancellationToken,
    runner: Option<RunnerHandle>,
}

impl LogService {
    /// Start a service writing to `<base_dir>/Temp/Logs`.
    pub fn start(config: LogConfig) -> LogResult<Self> {
        let store = DailyFileStore::new(config.logs_dir());
        Self::start_with_store(config, store)
    }

    /// Start a service writing to a custom store.
    pub fn start_with_store<S>(config: LogConfig, store: S) -> LogResult<Self>
    where
        S: LogStore + 'static,
    {
        config.validate()?;

        let queue = Arc::new(PendingQueue::new());
        let mut worker = SinkWorker::new(
            queue.clone(),
            store,
            config.dedup_window(),
            config.idle_interval(),
        );

        let cancel = CancellationToken::new();
        let runner = spawn_interval(
            config.thread_name.clone(),
            config.idle_interval(),
            cancel.clone(),
            move |token| {
                worker.run_once(token);
                Ok(())
            },
        )?;

        debug!(logs_dir = %config.logs_dir().display(), "Log service started");

        Ok(Self {
            config,
            handle: SinkHandle { queue },
            cancel,
            runner: Some(runner),
        })
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn handle(&self) -> SinkHandle {
        self.handle.clone()
    }

    /// A new scope writing to this service.
    pub fn scope(&self, options: ScopeOptions) -> LogResult<ScopedLogger> {
        ScopedLogger::new(Arc::new(self.handle()), options)
    }

    /// A new scope using the service's configured defaults.
    pub fn scope_default(&self) -> LogResult<ScopedLogger> {
        self.scope(ScopeOptions::from_config(&self.config))
    }

    /// A logger that forwards each record immediately, for process-wide use.
    pub fn direct_logger(&self) -> LogResult<DirectLogger> {
        DirectLogger::new(
            Arc::new(self.handle()),
            ScopeOptions::from_config(&self.config),
        )
    }

    /// Block until everything submitted so far has been written.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        self.handle.wait_drained(timeout)
    }

    /// True while the writer thread is alive.
    pub fn is_running(&self) -> bool {
        self.runner.as_ref().map_or(false, |r| !r.is_finished())
    }

    /// Stop accepting records, let the writer drain, and join it.
    pub fn shutdown(mut self) -> LogResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> LogResult<()> {
        let Some(runner) = self.runner.take() else {
            return Ok(());
        };

        self.handle.queue.close();
        self.cancel.cancel();
        self.handle.queue.wake();
        let result = runner.join();
        debug!("Log service stopped");
        result
    }
}

impl Drop for LogService {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "Log service did not shut down cleanly");
        }
    }
}
