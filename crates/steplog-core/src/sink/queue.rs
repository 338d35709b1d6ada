//! Unbounded FIFO of pending records shared by producers and the writer.
//!
//! Producers append whole batches under one lock, so a scope's records stay
//! contiguous. The writer is the only consumer; it pops with the
//! cancellation token in hand so shutdown wakes it immediately.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{LogError, LogResult};
use crate::record::LogRecord;

/// Outcome of a blocking pop.
#[derive(Debug)]
pub enum Dequeued {
    Record(LogRecord),
    /// Nothing arrived within the idle interval
    Idle,
    Cancelled,
}

#[derive(Default)]
struct QueueState {
    records: VecDeque<LogRecord>,
    /// Popped but not yet completed
    in_flight: usize,
    closed: bool,
}

/// The shared pending queue.
#[derive(Default)]
pub struct PendingQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    drained: Condvar,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch contiguously. Never blocks beyond the mutex.
    pub fn push_batch(&self, records: Vec<LogRecord>) -> LogResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock();
        if state.closed {
            return Err(LogError::SinkClosed);
        }
        state.records.extend(records);
        self.ready.notify_one();
        Ok(())
    }

    /// Block until a record is available, `idle` elapses, or `cancel` fires.
    ///
    /// A returned record counts as in flight until [`complete`](Self::complete).
    pub fn pop(&self, cancel: &CancellationToken, idle: Duration) -> Dequeued {
        let deadline = Instant::now() + idle;
        let mut state = self.state.lock();
        loop {
            if cancel.is_cancelled() {
                return Dequeued::Cancelled;
            }
            if let Some(record) = state.records.pop_front() {
                state.in_flight += 1;
                return Dequeued::Record(record);
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                if cancel.is_cancelled() {
                    return Dequeued::Cancelled;
                }
                return match state.records.pop_front() {
                    Some(record) => {
                        state.in_flight += 1;
                        Dequeued::Record(record)
                    }
                    None => Dequeued::Idle,
                };
            }
        }
    }

    /// Pop without blocking, used when draining at shutdown.
    pub fn try_pop(&self) -> Option<LogRecord> {
        let mut state = self.state.lock();
        let record = state.records.pop_front()?;
        state.in_flight += 1;
        Some(record)
    }

    /// Mark one popped record as fully processed.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 && state.records.is_empty() {
            self.drained.notify_all();
        }
    }

    /// Wait until the queue is empty and nothing is in flight.
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.in_flight > 0 || !state.records.is_empty() {
            if self.drained.wait_until(&mut state, deadline).timed_out() {
                return state.in_flight == 0 && state.records.is_empty();
            }
        }
        true
    }

    /// Wake the consumer so it re-checks its cancellation token.
    ///
    /// Notifying under the lock means a consumer that checked the token just
    /// before cancellation is already waiting and will see the notification.
    pub fn wake(&self) {
        let _state = self.state.lock();
        self.ready.notify_all();
    }

    /// Reject further pushes. Queued records stay available for draining.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Records waiting to be popped.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Severity;
    use std::sync::Arc;
    use std::thread;

    fn records(prefix: &str, n: usize) -> Vec<LogRecord> {
        (0..n)
            .map(|i| LogRecord::new(Severity::Information, format!("{}-{}", prefix, i)))
            .collect()
    }

    #[test]
    fn test_fifo_and_batches_stay_contiguous() {
        let queue = PendingQueue::new();
        queue.push_batch(records("a", 2)).unwrap();
        queue.push_batch(records("b", 2)).unwrap();
        assert_eq!(queue.len(), 4);

        let token = CancellationToken::new();
        let mut seen = Vec::new();
        while let Dequeued::Record(r) = queue.pop(&token, Duration::from_millis(5)) {
            seen.push(r.message().to_string());
            queue.complete();
        }
        assert_eq!(seen, vec!["a-0", "a-1", "b-0", "b-1"]);
    }

    #[test]
    fn test_pop_times_out_idle() {
        let queue = PendingQueue::new();
        let token = CancellationToken::new();
        assert!(matches!(
            queue.pop(&token, Duration::from_millis(5)),
            Dequeued::Idle
        ));
    }

    #[test]
    fn test_cancel_wakes_blocked_pop() {
        let queue = Arc::new(PendingQueue::new());
        let token = CancellationToken::new();

        let consumer = {
            let queue = queue.clone();
            let token = token.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let result = queue.pop(&token, Duration::from_secs(30));
                (matches!(result, Dequeued::Cancelled), start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        token.cancel();
        queue.wake();

        let (cancelled, waited) = consumer.join().unwrap();
        assert!(cancelled);
        assert!(waited < Duration::from_secs(10));
    }

    #[test]
    fn test_closed_queue_rejects_push() {
        let queue = PendingQueue::new();
        queue.push_batch(records("x", 1)).unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert!(matches!(
            queue.push_batch(records("y", 1)),
            Err(LogError::SinkClosed)
        ));
        assert!(queue.try_pop().is_some());
    }

    #[test]
    fn test_wait_drained_tracks_in_flight() {
        let queue = PendingQueue::new();
        assert!(queue.wait_drained(Duration::from_millis(1)));

        queue.push_batch(records("z", 1)).unwrap();
        let _record = queue.try_pop().unwrap();
        assert!(queue.is_empty());
        assert!(!queue.wait_drained(Duration::from_millis(5)));

        queue.complete();
        assert!(queue.wait_drained(Duration::from_millis(5)));
    }
}
