//! Collapsing bursts of identical error records.
//!
//! Records with a fault are keyed by a [`Fingerprint`] of severity, rendered
//! message (fault text and detail included) and fault kind. The first
//! occurrence is written and repeats within the window are only counted. The
//! first repeat after the window is written as a summary carrying the count,
//! and the window restarts from it.
//!
//! The cache belongs to the writer thread and is never shared.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::record::LogRecord;

/// Stable identity of "the same error".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    /// Fingerprint of a record, or `None` if it has no fault and bypasses dedup.
    pub fn of(record: &LogRecord) -> Option<Self> {
        let fault = record.fault()?;
        let message = record.rendered_message();
        let mut hasher = blake3::Hasher::new();
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart
        for part in [record.severity().as_str(), message.as_str(), fault.kind()] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Some(Self(hasher.finalize()))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.0.to_hex()[..16])
    }
}

/// What the writer should do with a record.
#[derive(Debug, PartialEq)]
pub enum Admission {
    /// Write the record as is
    Write,
    /// Counted, not written
    Suppress,
    /// Write the record annotated with this many occurrences since the last write
    Summary(u32),
}

#[derive(Debug)]
struct Entry {
    last_flush: DateTime<Local>,
    count: u32,
    latest: LogRecord,
}

/// Per-fingerprint counters.
#[derive(Debug)]
pub struct DedupCache {
    window: Duration,
    entries: HashMap<Fingerprint, Entry>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of fingerprints seen so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decide whether `record` is written, using its own timestamp as "now".
    pub fn admit(&mut self, record: &LogRecord) -> Admission {
        let Some(fingerprint) = Fingerprint::of(record) else {
            return Admission::Write;
        };
        let now = record.timestamp();

        let Some(entry) = self.entries.get_mut(&fingerprint) else {
            self.entries.insert(
                fingerprint,
                Entry {
                    last_flush: now,
                    count: 0,
                    latest: record.clone(),
                },
            );
            return Admission::Write;
        };

        entry.count += 1;
        entry.latest = record.clone();
        if !window_elapsed(entry.last_flush, now, self.window) {
            return Admission::Suppress;
        }

        let count = entry.count;
        entry.count = 0;
        entry.last_flush = now;
        Admission::Summary(count)
    }

    /// Summaries for entries that still hold suppressed repeats and whose
    /// window has run out by `now`. Their counters restart at `now`.
    pub fn sweep(&mut self, now: DateTime<Local>) -> Vec<LogRecord> {
        let window = self.window;
        self.take_summaries(|entry| window_elapsed(entry.last_flush, now, window), now)
    }

    /// Summaries for every entry with suppressed repeats, regardless of window.
    pub fn flush_pending(&mut self, now: DateTime<Local>) -> Vec<LogRecord> {
        self.take_summaries(|_| true, now)
    }

    fn take_summaries(
        &mut self,
        due: impl Fn(&Entry) -> bool,
        now: DateTime<Local>,
    ) -> Vec<LogRecord> {
        let mut summaries: Vec<LogRecord> = self
            .entries
            .values_mut()
            .filter(|entry| entry.count > 0 && due(entry))
            .map(|entry| {
                let summary = entry.latest.clone().with_repeat_count(entry.count);
                entry.count = 0;
                entry.last_flush = now;
                summary
            })
            .collect();
        summaries.sort_by_key(|r| r.timestamp());
        summaries
    }
}

fn window_elapsed(since: DateTime<Local>, now: DateTime<Local>, window: Duration) -> bool {
    match (now - since).to_std() {
        Ok(elapsed) => elapsed >= window,
        // Clock went backwards
        Err(_) => false,
    }
}
