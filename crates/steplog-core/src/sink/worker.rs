//! The writer: drains the pending queue into a [`LogStore`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::dedup::{Admission, DedupCache};
use super::queue::{Dequeued, PendingQueue};
use super::store::LogStore;
use crate::record::{Fault, LogRecord, Severity};

/// Consumer side of the pipeline. Lives on the writer thread.
pub struct SinkWorker<S: LogStore> {
    queue: Arc<PendingQueue>,
    store: S,
    dedup: DedupCache,
    idle_interval: Duration,
    last_sweep: Instant,
    written: u64,
    failed: u64,
}

impl<S: LogStore> SinkWorker<S> {
    pub fn new(
        queue: Arc<PendingQueue>,
        store: S,
        dedup_window: Duration,
        idle_interval: Duration,
    ) -> Self {
        Self {
            queue,
            store,
            dedup: DedupCache::new(dedup_window),
            idle_interval,
            last_sweep: Instant::now(),
            written: 0,
            failed: 0,
        }
    }

    /// Lines appended so far, summaries and secondary errors included.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Records whose write failed.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// One step of the writer loop.
    ///
    /// Blocks for at most the idle interval. Expired dedup entries are swept
    /// when the queue runs dry, and at least once per idle interval under
    /// steady traffic. Once `cancel` has fired, drains what is still queued
    /// and writes every pending dedup summary.
    pub fn run_once(&mut self, cancel: &CancellationToken) {
        match self.queue.pop(cancel, self.idle_interval) {
            Dequeued::Record(record) => {
                self.process(record);
                if self.last_sweep.elapsed() >= self.idle_interval {
                    self.sweep();
                }
                self.queue.complete();
            }
            Dequeued::Idle => self.sweep(),
            Dequeued::Cancelled => {}
        }

        // The runner exits after this call once the token has fired
        if cancel.is_cancelled() {
            self.drain();
        }
    }

    /// Write summaries for dedup entries whose window has run out.
    fn sweep(&mut self) {
        self.last_sweep = Instant::now();
        for summary in self.dedup.sweep(Local::now()) {
            self.persist(&summary);
        }
    }

    /// Write everything still queued plus pending summaries, without blocking.
    pub fn drain(&mut self) {
        let mut drained = 0usize;
        while let Some(record) = self.queue.try_pop() {
            self.process(record);
            self.queue.complete();
            drained += 1;
        }
        for summary in self.dedup.flush_pending(Local::now()) {
            self.persist(&summary);
        }
        debug!(
            drained,
            written = self.written,
            failed = self.failed,
            "Log writer drained"
        );
    }

    /// Run one record through dedup and, if admitted, into the store.
    pub fn process(&mut self, record: LogRecord) {
        match self.dedup.admit(&record) {
            Admission::Write => self.persist(&record),
            Admission::Suppress => {}
            Admission::Summary(count) => self.persist(&record.with_repeat_count(count)),
        }
    }

    fn persist(&mut self, record: &LogRecord) {
        let line = record.render_line_in_window(self.dedup.window());
        let date = record.timestamp().date_naive();

        match self.store.append(record.severity(), date, &line) {
            Ok(()) => self.written += 1,
            Err(e) => {
                self.failed += 1;
                warn!(severity = %record.severity(), error = %e, "Failed to persist log record");
                self.report_failure(&line, &e);
            }
        }
    }

    /// Write the failure straight to the Error file. Never re-enqueued, so a
    /// broken store cannot feed itself.
    fn report_failure(&mut self, line: &str, cause: &std::io::Error) {
        let secondary = LogRecord::new(
            Severity::Error,
            format!("failed to persist log record: {}", line.trim_end()),
        )
        .with_fault(Fault::from_error(cause));
        let secondary_line = secondary.render_line_in_window(self.dedup.window());

        match self
            .store
            .append(Severity::Error, secondary.timestamp().date_naive(), &secondary_line)
        {
            Ok(()) => self.written += 1,
            Err(e) => {
                error!(error = %e, "Failed to persist secondary error record");
                eprint!("{}", secondary_line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, TimeZone};
    use std::io;

    #[derive(Default)]
    struct MemoryStore {
        lines: Vec<(Severity, String)>,
        fail_severity: Option<Severity>,
    }

    impl LogStore for MemoryStore {
        fn append(&mut self, severity: Severity, _date: NaiveDate, line: &str) -> io::Result<()> {
            if self.fail_severity == Some(severity) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file is locked"));
            }
            self.lines.push((severity, line.to_string()));
            Ok(())
        }
    }

    fn minute(m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 21, 10, m, 0).unwrap()
    }

    fn worker(store: MemoryStore) -> SinkWorker<MemoryStore> {
        SinkWorker::new(
            Arc::new(PendingQueue::new()),
            store,
            Duration::from_secs(300),
            Duration::from_millis(5),
        )
    }

    fn disk_full(m: u32) -> LogRecord {
        LogRecord::new(Severity::Error, "disk full")
            .with_fault(Fault::message("disk full"))
            .with_timestamp(minute(m))
    }

    #[test]
    fn test_dedup_timeline_writes_first_and_summary() {
        let mut worker = worker(MemoryStore::default());
        worker.process(disk_full(0));
        worker.process(disk_full(2));
        worker.process(disk_full(6));

        let lines = &worker.store().lines;
        assert_eq!(lines.len(), 2);
        assert!(lines[0].1.starts_with("[Error] 10:00:00: disk full."));
        assert!(lines[1]
            .1
            .contains("disk full (triggered 2 times in 5 minutes)."));
    }

    #[test]
    fn test_failed_write_goes_to_secondary_channel() {
        let mut worker = worker(MemoryStore {
            fail_severity: Some(Severity::Warning),
            ..Default::default()
        });

        worker.process(LogRecord::new(Severity::Warning, "quota at 95%"));
        worker.process(LogRecord::new(Severity::Information, "still running"));

        let lines = &worker.store().lines;
        assert_eq!(worker.failed(), 1);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, Severity::Error);
        assert!(lines[0].1.contains("failed to persist log record: [Warning]"));
        assert!(lines[0].1.contains("quota at 95%"));
        assert!(lines[0].1.contains("file is locked"));
        assert!(lines[1].1.contains("still running"));
    }

    #[test]
    fn test_secondary_failure_does_not_stop_worker() {
        let mut worker = worker(MemoryStore {
            fail_severity: Some(Severity::Error),
            ..Default::default()
        });

        worker.process(LogRecord::new(Severity::Error, "cannot be written"));
        worker.process(LogRecord::new(Severity::Debug, "written"));

        assert_eq!(worker.failed(), 1);
        assert_eq!(worker.written(), 1);
    }

    #[test]
    fn test_expired_repeats_are_summarised_under_steady_traffic() {
        let queue = Arc::new(PendingQueue::new());
        let mut worker = SinkWorker::new(
            queue.clone(),
            MemoryStore::default(),
            Duration::from_secs(300),
            Duration::from_millis(1),
        );

        queue
            .push_batch(vec![
                disk_full(0),
                disk_full(1),
                LogRecord::new(Severity::Information, "busy"),
                LogRecord::new(Severity::Information, "still busy"),
            ])
            .unwrap();

        // The queue never runs dry, so no idle sweep happens
        let token = CancellationToken::new();
        for _ in 0..4 {
            std::thread::sleep(Duration::from_millis(5));
            worker.run_once(&token);
        }

        let lines = &worker.store().lines;
        assert_eq!(lines.len(), 4);
        assert!(lines
            .iter()
            .any(|(_, line)| line.contains("disk full (triggered 1 times in 5 minutes)")));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_run_once_processes_queue_and_drains_on_cancel() {
        let queue = Arc::new(PendingQueue::new());
        let mut worker = SinkWorker::new(
            queue.clone(),
            MemoryStore::default(),
            Duration::from_secs(300),
            Duration::from_millis(5),
        );

        queue
            .push_batch(vec![disk_full(0), disk_full(1), LogRecord::new(Severity::Trace, "a")])
            .unwrap();

        let token = CancellationToken::new();
        worker.run_once(&token);
        assert_eq!(worker.written(), 1);

        token.cancel();
        worker.run_once(&token);

        // disk full (first), trace line, pending summary for the suppressed repeat
        let lines = &worker.store().lines;
        assert_eq!(lines.len(), 3);
        assert!(lines[2].1.contains("(triggered 1 times in 5 minutes)"));
        assert!(queue.wait_drained(Duration::from_millis(1)));
    }
}
