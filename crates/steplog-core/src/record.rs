//! Log record types moving through the pipeline.
//!
//! A [`LogRecord`] is built by a producer at commit time and never changes
//! after it has been handed to the sink. Everything it carries is owned, so
//! records can cross to the writer thread freely.

use std::error::Error;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Record severity, ordered from most to least verbose.
///
/// `None` sits above `Error`; it is used for scope banners, which must pass
/// any severity floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    None,
}

impl Severity {
    /// All severities in ascending order.
    pub const ALL: [Severity; 6] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Information,
        Severity::Warning,
        Severity::Error,
        Severity::None,
    ];

    /// Name used for display and as the directory name on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "Trace",
            Severity::Debug => "Debug",
            Severity::Information => "Information",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::None => "None",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "information" | "info" => Ok(Severity::Information),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "none" => Ok(Severity::None),
            other => Err(LogError::invalid(
                "severity",
                format!(
                    "'{}' is not one of trace, debug, information, warning, error, none",
                    other
                ),
            )),
        }
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Severity::Trace,
            tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Information,
            tracing::Level::WARN => Severity::Warning,
            tracing::Level::ERROR => Severity::Error,
        }
    }
}

/// Owned snapshot of the error that caused a record.
///
/// Taken at commit time so the record does not borrow from, or require
/// `Send` of, the original error value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    kind: String,
    message: String,
    detail: Option<String>,
}

impl Fault {
    /// Kind used for faults created from plain text.
    pub const MESSAGE_KIND: &'static str = "error";

    /// Capture an error value, including its `source()` chain.
    pub fn from_error<E: Error + ?Sized>(err: &E) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(format!("Caused by: {}", cause));
            source = cause.source();
        }

        Self {
            kind: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
            detail: if causes.is_empty() {
                None
            } else {
                Some(causes.join("\n"))
            },
        }
    }

    /// A fault that only carries a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            kind: Self::MESSAGE_KIND.to_string(),
            message: message.into(),
            detail: None,
        }
    }

    /// Override the kind, e.g. when bridging errors that were already rendered.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Attach free-form detail text (a cause chain or a backtrace).
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message_text(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A single committed log entry.
#[derive(Debug, Clone)]
pub struct LogRecord {
    severity: Severity,
    timestamp: DateTime<Local>,
    message: String,
    fault: Option<Fault>,
    repeat_count: u32,
    step_elapsed_ms: f64,
    total_elapsed_ms: f64,
}

impl LogRecord {
    /// Create a record stamped with the current local time and no elapsed time.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            timestamp: Local::now(),
            message: message.into(),
            fault: None,
            repeat_count: 0,
            step_elapsed_ms: 0.0,
            total_elapsed_ms: 0.0,
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_elapsed(mut self, step_ms: f64, total_ms: f64) -> Self {
        self.step_elapsed_ms = step_ms;
        self.total_elapsed_ms = total_ms;
        self
    }

    /// Mark this record as a dedup summary covering `count` occurrences.
    pub fn with_repeat_count(mut self, count: u32) -> Self {
        self.repeat_count = count;
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn step_elapsed_ms(&self) -> f64 {
        self.step_elapsed_ms
    }

    pub fn total_elapsed_ms(&self) -> f64 {
        self.total_elapsed_ms
    }

    /// Message text with the fault description appended.
    pub fn rendered_message(&self) -> String {
        let Some(fault) = &self.fault else {
            return self.message.clone();
        };

        let mut text = if self.message.is_empty() || self.message == fault.message {
            fault.message.clone()
        } else {
            format!("{}\nError: {}", self.message, fault.message)
        };
        if let Some(detail) = &fault.detail {
            text.push('\n');
            text.push_str(detail);
        }
        text
    }

    /// Render the line as echoed on the console.
    pub fn render_line(&self) -> String {
        self.render(None)
    }

    /// Render the line as written to disk; summaries name the dedup window.
    pub fn render_line_in_window(&self, dedup_window: Duration) -> String {
        self.render(Some(dedup_window))
    }

    fn render(&self, dedup_window: Option<Duration>) -> String {
        let mut message = self.rendered_message();
        if self.repeat_count > 0 {
            match dedup_window {
                Some(window) => message.push_str(&format!(
                    " (triggered {} times in {})",
                    self.repeat_count,
                    describe_window(window)
                )),
                None => message.push_str(&format!(" (triggered {} times)", self.repeat_count)),
            }
        }

        format!(
            "[{}] {}: {}. ({:.2}ms/{:.2}ms)\n",
            self.severity,
            self.timestamp.format("%H:%M:%S"),
            message,
            self.step_elapsed_ms,
            self.total_elapsed_ms
        )
    }
}

fn describe_window(window: Duration) -> String {
    let millis = window.as_millis();
    if millis % 1000 != 0 || millis == 0 {
        return format!("{} milliseconds", millis);
    }
    let secs = millis / 1000;
    if secs >= 60 && secs % 60 == 0 {
        format!("{} minutes", secs / 60)
    } else {
        format!("{} seconds", secs)
    }
}
