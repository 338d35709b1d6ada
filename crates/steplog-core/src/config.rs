//! Construction-time configuration for the pipeline and for scopes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LogError, LogResult};
use crate::record::Severity;

/// Settings for a [`LogService`](crate::sink::LogService).
///
/// Every field has a default, so a JSON file only needs the keys it wants to
/// change:
///
/// ```json
/// { "base_dir": "/var/lib/app", "severity_floor": "Information", "dedup_window_ms": 120000 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory under which `Temp/Logs/<Severity>/<yyyyMMdd>.log` is written
    pub base_dir: PathBuf,

    /// Default floor for scopes created by the service
    pub severity_floor: Severity,

    /// Default flush threshold for scopes, in milliseconds
    pub record_minimum_interval_ms: f64,

    /// Window during which repeats of the same error are counted, not written, in milliseconds
    pub dedup_window_ms: u64,

    /// How long the writer waits on an empty queue before sweeping the dedup cache
    pub idle_interval_ms: u64,

    /// Echo every accepted commit to stdout
    pub console: bool,

    /// Name of the writer thread
    pub thread_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            severity_floor: Severity::Trace,
            record_minimum_interval_ms: 0.0,
            dedup_window_ms: 300_000,
            idle_interval_ms: 100,
            console: true,
            thread_name: "steplog-writer".to_string(),
        }
    }
}

/// Directory containing the running executable, falling back to `.`.
pub fn default_base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl LogConfig {
    /// Defaults rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON file and validate.
    pub fn from_json_file(path: impl AsRef<Path>) -> LogResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| LogError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_severity_floor(mut self, floor: Severity) -> Self {
        self.severity_floor = floor;
        self
    }

    pub fn with_record_minimum_interval_ms(mut self, ms: f64) -> Self {
        self.record_minimum_interval_ms = ms;
        self
    }

    /// Sub-millisecond parts are dropped; durations past `u64::MAX` ms saturate.
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window_ms = whole_millis(window);
        self
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval_ms = whole_millis(interval);
        self
    }

    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Root of the log tree, `<base_dir>/Temp/Logs`.
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("Temp").join("Logs")
    }

    pub fn validate(&self) -> LogResult<()> {
        if self.thread_name.trim().is_empty() {
            return Err(LogError::Config("thread_name must not be empty".into()));
        }
        if self.dedup_window_ms == 0 {
            return Err(LogError::Config("dedup_window_ms must be at least 1".into()));
        }
        if self.idle_interval_ms == 0 {
            return Err(LogError::Config("idle_interval_ms must be at least 1".into()));
        }
        validate_interval(self.record_minimum_interval_ms)
            .map_err(|e| LogError::Config(e.to_string()))
    }
}

/// Per-scope options.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeOptions {
    /// Banner written once when the scope starts
    pub title: Option<String>,

    /// Records below this severity are discarded
    pub severity_floor: Severity,

    /// Scopes that finish faster than this (milliseconds) are not persisted
    pub record_minimum_interval_ms: f64,

    /// Echo commits to stdout
    pub console: bool,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            title: None,
            severity_floor: Severity::Trace,
            record_minimum_interval_ms: 0.0,
            console: true,
        }
    }
}

impl ScopeOptions {
    /// Scope defaults taken from the service configuration.
    pub fn from_config(config: &LogConfig) -> Self {
        Self {
            title: None,
            severity_floor: config.severity_floor,
            record_minimum_interval_ms: config.record_minimum_interval_ms,
            console: config.console,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_severity_floor(mut self, floor: Severity) -> Self {
        self.severity_floor = floor;
        self
    }

    pub fn with_record_minimum_interval_ms(mut self, ms: f64) -> Self {
        self.record_minimum_interval_ms = ms;
        self
    }

    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn validate(&self) -> LogResult<()> {
        if let Some(title) = &self.title {
            if title.is_empty() {
                return Err(LogError::invalid("title", "must not be empty when given"));
            }
        }
        validate_interval(self.record_minimum_interval_ms)
    }
}

fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn validate_interval(ms: f64) -> LogResult<()> {
    if !ms.is_finite() || ms < 0.0 {
        return Err(LogError::invalid(
            "record_minimum_interval_ms",
            format!("expected a finite, non-negative value, got {}", ms),
        ));
    }
    Ok(())
}
