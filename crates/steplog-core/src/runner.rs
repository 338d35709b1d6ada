//! Interval runner: a dedicated thread that calls an action until cancelled.
//!
//! The runner adds no delay between invocations. Actions pace themselves,
//! typically by blocking on a queue with the cancellation token in hand so
//! that shutdown interrupts the wait instead of waiting for the next poll.
//!
//! A failing action (returned error or panic) ends the loop for good; the
//! runner never restarts it.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{LogError, LogResult};

/// Handle to a running interval loop.
#[derive(Debug)]
pub struct RunnerHandle {
    name: String,
    interval_hint: Duration,
    cancel: CancellationToken,
    thread: Option<JoinHandle<LogResult<()>>>,
}

/// Spawn a named thread that invokes `action` until `cancel` fires.
///
/// The token is checked after every invocation and is also handed to the
/// action. `interval_hint` is kept for diagnostics only.
pub fn spawn_interval<F>(
    name: impl Into<String>,
    interval_hint: Duration,
    cancel: CancellationToken,
    mut action: F,
) -> LogResult<RunnerHandle>
where
    F: FnMut(&CancellationToken) -> LogResult<()> + Send + 'static,
{
    let name = name.into();
    if name.trim().is_empty() {
        return Err(LogError::invalid("name", "runner thread name must not be empty"));
    }

    let token = cancel.clone();
    let thread_name = name.clone();
    let thread = thread::Builder::new().name(name.clone()).spawn(move || {
        debug!(runner = %thread_name, "Interval runner started");
        while !token.is_cancelled() {
            if let Err(e) = action(&token) {
                error!(runner = %thread_name, error = %e, "Interval action failed, loop stopped");
                return Err(e);
            }
        }
        debug!(runner = %thread_name, "Interval runner stopped");
        Ok(())
    })?;

    Ok(RunnerHandle {
        name,
        interval_hint,
        cancel,
        thread: Some(thread),
    })
}

impl RunnerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval_hint(&self) -> Duration {
        self.interval_hint
    }

    /// Request a stop. The current invocation runs to completion.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the thread has exited (stopped, failed, or panicked).
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the thread to exit and report how it ended.
    ///
    /// Dropping the handle instead detaches the thread.
    pub fn join(mut self) -> LogResult<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| LogError::WorkerPanicked(self.name.clone()))?,
            None => Ok(()),
        }
    }
}
