//! Per-unit-of-work timing loggers.
//!
//! A [`ScopedLogger`] is created at the start of a unit of work (one per
//! request, say). Each commit stamps the time since the previous commit and
//! since the scope started, echoes the line to the console, and buffers the
//! record. [`flush`](StepLogger::flush) hands the buffer to the shared sink
//! in one batch, unless the whole scope finished faster than its
//! `record_minimum_interval_ms`.
//!
//! Host code should depend on the [`StepLogger`] trait. The composition root
//! picks the implementation: a fresh `ScopedLogger` per request, or a single
//! process-wide [`DirectLogger`] that forwards every record immediately.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::warn;

use crate::config::ScopeOptions;
use crate::console::ConsoleMirror;
use crate::error::{LogError, LogResult};
use crate::record::{Fault, LogRecord, Severity};
use crate::sink::RecordSink;

/// Structured logging capability with elapsed-time stamping.
pub trait StepLogger: Send + Sync {
    /// Checkpoint elapsed time without emitting a record.
    fn commit(&self);

    /// Commit a record. Every other `commit_*` method funnels through here.
    fn commit_with(&self, severity: Severity, message: String, fault: Option<Fault>) -> LogResult<()>;

    /// End the unit of work: final checkpoint, hand records over, reset.
    fn flush(&self) -> LogResult<()>;

    /// Records below this severity are discarded.
    fn severity_floor(&self) -> Severity;

    fn is_enabled(&self, severity: Severity) -> bool {
        severity >= self.severity_floor()
    }

    fn commit_trace(&self, message: fmt::Arguments<'_>) -> LogResult<()> {
        self.commit_with(Severity::Trace, message.to_string(), None)
    }

    fn commit_debug(&self, message: fmt::Arguments<'_>) -> LogResult<()> {
        self.commit_with(Severity::Debug, message.to_string(), None)
    }

    fn commit_information(&self, message: fmt::Arguments<'_>) -> LogResult<()> {
        self.commit_with(Severity::Information, message.to_string(), None)
    }

    fn commit_warning(&self, message: fmt::Arguments<'_>) -> LogResult<()> {
        self.commit_with(Severity::Warning, message.to_string(), None)
    }

    /// Error with a message-only fault, so repeats are deduplicated.
    fn commit_error(&self, message: fmt::Arguments<'_>) -> LogResult<()> {
        let message = message.to_string();
        let fault = Fault::message(message.clone());
        self.commit_with(Severity::Error, message, Some(fault))
    }

    /// Error whose message is the fault's description.
    fn commit_fault(&self, fault: Fault) -> LogResult<()> {
        self.commit_with(Severity::Error, fault.message_text().to_string(), Some(fault))
    }

    /// Error from a concrete error value; its type name becomes the fault kind.
    fn commit_error_value<E: Error + ?Sized>(&self, err: &E) -> LogResult<()>
    where
        Self: Sized,
    {
        self.commit_fault(Fault::from_error(err))
    }

    /// Error from a type-erased value, callable on `dyn StepLogger`.
    ///
    /// The concrete type is lost behind `dyn Error`, so repeats are told apart
    /// by their text only. Prefer [`commit_error_value`](Self::commit_error_value)
    /// where the type is known.
    fn commit_dyn_error(&self, err: &dyn Error) -> LogResult<()> {
        self.commit_fault(Fault::from_error(err))
    }
}

/// Commit a trace record with a format string.
#[macro_export]
macro_rules! commit_trace {
    ($logger:expr, $($arg:tt)+) => {{
        use $crate::StepLogger as _;
        ($logger).commit_trace(::std::format_args!($($arg)+))
    }};
}

/// Commit a debug record with a format string.
#[macro_export]
macro_rules! commit_debug {
    ($logger:expr, $($arg:tt)+) => {{
        use $crate::StepLogger as _;
        ($logger).commit_debug(::std::format_args!($($arg)+))
    }};
}

/// Commit an information record with a format string.
#[macro_export]
macro_rules! commit_info {
    ($logger:expr, $($arg:tt)+) => {{
        use $crate::StepLogger as _;
        ($logger).commit_information(::std::format_args!($($arg)+))
    }};
}

/// Commit a warning record with a format string.
#[macro_export]
macro_rules! commit_warn {
    ($logger:expr, $($arg:tt)+) => {{
        use $crate::StepLogger as _;
        ($logger).commit_warning(::std::format_args!($($arg)+))
    }};
}

/// Commit an error record with a format string.
#[macro_export]
macro_rules! commit_error {
    ($logger:expr, $($arg:tt)+) => {{
        use $crate::StepLogger as _;
        ($logger).commit_error(::std::format_args!($($arg)+))
    }};
}

/// Elapsed-time bookkeeping shared by both logger kinds.
#[derive(Debug)]
struct StepTimer {
    started: Instant,
    step_ms: f64,
    total_ms: f64,
}

impl StepTimer {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            step_ms: 0.0,
            total_ms: 0.0,
        }
    }

    /// Returns (step, total) in milliseconds.
    fn checkpoint(&mut self) -> (f64, f64) {
        let interval = self.started.elapsed().as_secs_f64() * 1000.0;
        // Instant is monotonic, but keep total non-decreasing on coarse clocks
        let interval = interval.max(self.total_ms);
        self.step_ms = interval - self.total_ms;
        self.total_ms = interval;
        (self.step_ms, self.total_ms)
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

fn banner(title: &str) -> String {
    let rule = "-".repeat(36);
    format!("{rule}{title}{rule}")
}

fn validate_message(message: &str, fault: Option<&Fault>) -> LogResult<()> {
    let fault_empty = fault.map_or(true, |f| f.message_text().is_empty());
    if message.is_empty() && fault_empty {
        return Err(LogError::invalid("message", "must not be empty"));
    }
    Ok(())
}

#[derive(Debug)]
struct ScopeState {
    timer: StepTimer,
    buffer: Vec<LogRecord>,
}

/// Buffering logger for one unit of work.
pub struct ScopedLogger {
    sink: Arc<dyn RecordSink>,
    options: ScopeOptions,
    console: ConsoleMirror,
    state: Mutex<ScopeState>,
}

impl ScopedLogger {
    /// Start a scope. A title is committed straight away as a banner.
    pub fn new(sink: Arc<dyn RecordSink>, options: ScopeOptions) -> LogResult<Self> {
        let console = ConsoleMirror::for_flag(options.console);
        Self::with_console(sink, options, console)
    }

    /// Start a scope echoing to an explicit console mirror.
    pub fn with_console(
        sink: Arc<dyn RecordSink>,
        options: ScopeOptions,
        console: ConsoleMirror,
    ) -> LogResult<Self> {
        options.validate()?;
        let title = options.title.clone();
        let scope = Self {
            sink,
            options,
            console,
            state: Mutex::new(ScopeState {
                timer: StepTimer::new(),
                buffer: Vec::new(),
            }),
        };
        if let Some(title) = title {
            scope.commit_with(Severity::None, banner(&title), None)?;
        }
        Ok(scope)
    }

    pub fn options(&self) -> &ScopeOptions {
        &self.options
    }

    /// Records buffered since the last flush.
    pub fn pending(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Total elapsed time as of the last commit, in milliseconds.
    pub fn total_elapsed_ms(&self) -> f64 {
        self.state.lock().timer.total_ms
    }

    /// Timestamp of the most recently buffered record, which also picks its
    /// day file.
    pub fn last_timestamp(&self) -> Option<DateTime<Local>> {
        self.state.lock().buffer.last().map(LogRecord::timestamp)
    }
}

impl StepLogger for ScopedLogger {
    fn commit(&self) {
        self.state.lock().timer.checkpoint();
    }

    fn commit_with(&self, severity: Severity, message: String, fault: Option<Fault>) -> LogResult<()> {
        validate_message(&message, fault.as_ref())?;

        let mut state = self.state.lock();
        let (step, total) = state.timer.checkpoint();
        if !self.is_enabled(severity) {
            return Ok(());
        }

        let mut record = LogRecord::new(severity, message).with_elapsed(step, total);
        if let Some(fault) = fault {
            record = record.with_fault(fault);
        }
        self.console.emit(&record.render_line());
        state.buffer.push(record);
        Ok(())
    }

    fn flush(&self) -> LogResult<()> {
        let mut state = self.state.lock();
        let (_, total) = state.timer.checkpoint();
        let records = std::mem::take(&mut state.buffer);
        state.timer.reset();

        if records.is_empty() || total < self.options.record_minimum_interval_ms {
            return Ok(());
        }
        // Still holding the scope lock: the batch goes out whole and in order
        self.sink.submit(records)
    }

    fn severity_floor(&self) -> Severity {
        self.options.severity_floor
    }
}

impl fmt::Debug for ScopedLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedLogger")
            .field("options", &self.options)
            .field("pending", &self.pending())
            .finish()
    }
}

impl Drop for ScopedLogger {
    fn drop(&mut self) {
        if self.state.get_mut().buffer.is_empty() {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(error = %e, "Dropped scope could not hand over its records");
        }
    }
}

/// Unbuffered logger: every record goes to the sink as it is committed.
///
/// Suited to a single process-wide instance shared across threads.
pub struct DirectLogger {
    sink: Arc<dyn RecordSink>,
    options: ScopeOptions,
    console: ConsoleMirror,
    timer: Mutex<StepTimer>,
}

impl DirectLogger {
    pub fn new(sink: Arc<dyn RecordSink>, options: ScopeOptions) -> LogResult<Self> {
        let console = ConsoleMirror::for_flag(options.console);
        Self::with_console(sink, options, console)
    }

    pub fn with_console(
        sink: Arc<dyn RecordSink>,
        options: ScopeOptions,
        console: ConsoleMirror,
    ) -> LogResult<Self> {
        options.validate()?;
        let title = options.title.clone();
        let logger = Self {
            sink,
            options,
            console,
            timer: Mutex::new(StepTimer::new()),
        };
        if let Some(title) = title {
            logger.commit_with(Severity::None, banner(&title), None)?;
        }
        Ok(logger)
    }
}

impl StepLogger for DirectLogger {
    fn commit(&self) {
        self.timer.lock().checkpoint();
    }

    fn commit_with(&self, severity: Severity, message: String, fault: Option<Fault>) -> LogResult<()> {
        validate_message(&message, fault.as_ref())?;

        let (step, total) = self.timer.lock().checkpoint();
        if !self.is_enabled(severity) {
            return Ok(());
        }

        let mut record = LogRecord::new(severity, message).with_elapsed(step, total);
        if let Some(fault) = fault {
            record = record.with_fault(fault);
        }
        self.console.emit(&record.render_line());
        self.sink.submit(vec![record])
    }

    /// Nothing is buffered; only restarts the timers.
    fn flush(&self) -> LogResult<()> {
        self.timer.lock().reset();
        Ok(())
    }

    fn severity_floor(&self) -> Severity {
        self.options.severity_floor
    }
}

impl fmt::Debug for DirectLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectLogger")
            .field("options", &self.options)
            .finish()
    }
}
