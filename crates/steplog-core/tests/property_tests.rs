//! Property-based tests for scope timing and deduplication
//!
//! Uses proptest to check invariants that must hold for any sequence of
//! commits or any burst of repeated errors.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, TimeZone};
use parking_lot::Mutex;
use proptest::prelude::*;
use steplog_core::{
    Admission, DedupCache, Fault, LogRecord, LogResult, RecordSink, ScopeOptions, ScopedLogger,
    Severity, StepLogger,
};

// ============================================================================
// Strategy Generators
// ============================================================================

fn severity_strategy() -> impl Strategy<Value = Severity> {
    prop::sample::select(Severity::ALL.to_vec())
}

fn message_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 ]{1,40}").expect("valid regex")
}

/// Seconds between consecutive occurrences of the same error
fn gaps_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..600, 1..60)
}

#[derive(Default)]
struct CollectSink {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordSink for CollectSink {
    fn submit(&self, records: Vec<LogRecord>) -> LogResult<()> {
        self.records.lock().extend(records);
        Ok(())
    }
}

fn flushed(commits: &[(Severity, String)], floor: Severity) -> Vec<LogRecord> {
    let sink = Arc::new(CollectSink::default());
    let options = ScopeOptions::default()
        .with_console(false)
        .with_severity_floor(floor);
    let scope = ScopedLogger::new(sink.clone(), options).unwrap();
    for (severity, message) in commits {
        scope.commit_with(*severity, message.clone(), None).unwrap();
    }
    scope.flush().unwrap();
    drop(scope);
    let records = std::mem::take(&mut *sink.records.lock());
    records
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Total elapsed time never decreases and each step is the difference
    /// between consecutive totals
    #[test]
    fn elapsed_times_are_consistent(
        commits in prop::collection::vec((severity_strategy(), message_strategy()), 1..50)
    ) {
        let records = flushed(&commits, Severity::Trace);
        prop_assert_eq!(records.len(), commits.len());

        let mut previous_total = 0.0;
        for record in &records {
            prop_assert!(record.step_elapsed_ms() >= 0.0);
            prop_assert!(record.total_elapsed_ms() >= previous_total);
            let expected = previous_total + record.step_elapsed_ms();
            prop_assert!((record.total_elapsed_ms() - expected).abs() < 1e-6);
            previous_total = record.total_elapsed_ms();
        }
    }

    /// Exactly the commits at or above the floor are kept, in commit order
    #[test]
    fn floor_filters_and_preserves_order(
        commits in prop::collection::vec((severity_strategy(), message_strategy()), 0..50),
        floor in severity_strategy(),
    ) {
        let records = flushed(&commits, floor);
        let expected: Vec<&String> = commits
            .iter()
            .filter(|(severity, _)| *severity >= floor)
            .map(|(_, message)| message)
            .collect();
        let actual: Vec<&str> = records.iter().map(|r| r.message()).collect();
        prop_assert_eq!(actual, expected.iter().map(|m| m.as_str()).collect::<Vec<_>>());
    }

    /// Every occurrence of a repeated error is accounted for exactly once,
    /// either as a written line or inside a summary count
    #[test]
    fn dedup_accounts_for_every_occurrence(gaps in gaps_strategy()) {
        let mut cache = DedupCache::new(Duration::from_secs(300));
        let start = Local.with_ymd_and_hms(2026, 1, 21, 0, 0, 0).unwrap();

        let mut at = start;
        let mut accounted = 0u64;
        for gap in &gaps {
            at += chrono::Duration::seconds(*gap);
            let record = LogRecord::new(Severity::Error, "disk full")
                .with_fault(Fault::message("disk full"))
                .with_timestamp(at);
            accounted += match cache.admit(&record) {
                Admission::Write => 1,
                Admission::Suppress => 0,
                Admission::Summary(count) => u64::from(count),
            };
        }
        for summary in cache.flush_pending(at) {
            accounted += u64::from(summary.repeat_count());
        }

        prop_assert_eq!(accounted, gaps.len() as u64);
        prop_assert_eq!(cache.len(), 1);
    }

    /// Records without a fault always pass straight through
    #[test]
    fn records_without_fault_are_always_written(
        messages in prop::collection::vec(message_strategy(), 1..30)
    ) {
        let mut cache = DedupCache::new(Duration::from_secs(300));
        for message in &messages {
            let record = LogRecord::new(Severity::Error, message.clone());
            prop_assert_eq!(cache.admit(&record), Admission::Write);
        }
        prop_assert!(cache.is_empty());
    }
}
