//! Error types for Steplog

use thiserror::Error;

/// Main error type for Steplog operations
#[derive(Error, Debug)]
pub enum LogError {
    /// A required argument was empty or out of range
    #[error("Invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Name of the offending argument
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// The shared sink has been shut down and no longer accepts records
    #[error("Log sink is closed")]
    SinkClosed,

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// A background thread terminated by panicking
    #[error("Worker thread `{0}` panicked")]
    WorkerPanicked(String),
}

impl LogError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

/// Result type alias using LogError
pub type LogResult<T> = Result<T, LogError>;
