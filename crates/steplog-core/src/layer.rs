//! Tracing Layer that forwards events into the log sink.
//!
//! Lets code instrumented with `tracing` land in the same per-severity files
//! as scoped commits:
//!
//! ```ignore
//! use tracing_subscriber::prelude::*;
//!
//! let service = LogService::start(config)?;
//! tracing_subscriber::registry()
//!     .with(SinkLayer::new(service.handle()))
//!     .init();
//!
//! tracing::warn!(attempt = 3, "retrying upload");
//! ```
//!
//! Events from this crate are skipped, otherwise the writer's own diagnostics
//! would be fed back into its queue.

use std::fmt::Write as FmtWrite;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::record::{Fault, LogRecord, Severity};
use crate::sink::RecordSink;

const OWN_TARGET: &str = "steplog_core";

/// A tracing Layer that turns each event into one [`LogRecord`].
pub struct SinkLayer {
    sink: Arc<dyn RecordSink>,
    severity_floor: Severity,
}

impl SinkLayer {
    pub fn new(sink: impl RecordSink + 'static) -> Self {
        Self::from_arc(Arc::new(sink))
    }

    pub fn from_arc(sink: Arc<dyn RecordSink>) -> Self {
        Self {
            sink,
            severity_floor: Severity::Trace,
        }
    }

    /// Drop events below `floor`.
    pub fn with_severity_floor(mut self, floor: Severity) -> Self {
        self.severity_floor = floor;
        self
    }
}

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(OWN_TARGET) {
            return;
        }

        let severity = Severity::from(*metadata.level());
        if severity < self.severity_floor {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let mut message = visitor.message.unwrap_or_default();
        if !visitor.fields.is_empty() {
            if !message.is_empty() {
                message.push(' ');
            }
            message.push_str(&visitor.fields.join(" "));
        }

        if let Some(scope) = ctx.event_scope(event) {
            let spans: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
            if !spans.is_empty() {
                message = format!("{}: {}", spans.join(" > "), message);
            }
        }

        if message.is_empty() && visitor.fault.is_none() {
            return;
        }

        let mut record = LogRecord::new(severity, message);
        if let Some(fault) = visitor.fault {
            record = record.with_fault(fault);
        }

        // Nothing sensible to do once the service has shut down
        let _ = self.sink.submit(vec![record]);
    }
}

/// Collects the message, an `error` field as a fault, and the rest as `key=value`.
#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    fault: Option<Fault>,
    fields: Vec<String>,
}

impl Visit for RecordVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut buf = String::new();
        let _ = write!(&mut buf, "{:?}", value);

        match field.name() {
            "message" => self.message = Some(buf),
            "error" => self.fault = Some(Fault::message(buf)),
            name => self.fields.push(format!("{}={}", name, buf)),
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "error" => self.fault = Some(Fault::message(value)),
            name => self.fields.push(format!("{}={}", name, value)),
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        if field.name() == "error" || self.fault.is_none() {
            self.fault = Some(Fault::from_error(value));
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogResult;
    use parking_lot::Mutex;
    use tracing_subscriber::prelude::*;

    #[derive(Clone, Default)]
    struct CaptureSink {
        records: Arc<Mutex<Vec<LogRecord>>>,
    }

    impl RecordSink for CaptureSink {
        fn submit(&self, records: Vec<LogRecord>) -> LogResult<()> {
            self.records.lock().extend(records);
            Ok(())
        }
    }

    #[test]
    fn test_layer_forwards_events() {
        let sink = CaptureSink::default();
        let subscriber = tracing_subscriber::registry().with(SinkLayer::new(sink.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app", "request handled");
            tracing::warn!(target: "app", attempt = 3, "retrying upload");
        });

        let records = sink.records.lock();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].severity(), Severity::Information);
        assert_eq!(records[0].message(), "request handled");
        assert_eq!(records[1].severity(), Severity::Warning);
        assert_eq!(records[1].message(), "retrying upload attempt=3");
    }

    #[test]
    fn test_layer_maps_error_field_to_fault() {
        let sink = CaptureSink::default();
        let subscriber = tracing_subscriber::registry().with(SinkLayer::new(sink.clone()));
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(
                target: "app",
                error = &err as &(dyn std::error::Error + 'static),
                "saving upload"
            );
        });

        let records = sink.records.lock();
        assert_eq!(records.len(), 1);
        let fault = records[0].fault().unwrap();
        assert_eq!(fault.message_text(), "disk full");
        assert_eq!(records[0].rendered_message(), "saving upload\nError: disk full");
        assert_ne!(fault.kind(), Fault::MESSAGE_KIND);
    }

    #[test]
    fn test_layer_errors_with_different_text_stay_distinct() {
        use crate::sink::Fingerprint;

        let sink = CaptureSink::default();
        let subscriber = tracing_subscriber::registry().with(SinkLayer::new(sink.clone()));
        let full = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let unreachable = std::io::Error::new(std::io::ErrorKind::Other, "network unreachable");

        tracing::subscriber::with_default(subscriber, || {
            for err in [&full, &unreachable] {
                tracing::error!(
                    target: "app",
                    error = err as &(dyn std::error::Error + 'static),
                    "saving upload"
                );
            }
        });

        let records = sink.records.lock();
        assert_eq!(records.len(), 2);
        assert_ne!(Fingerprint::of(&records[0]), Fingerprint::of(&records[1]));
    }

    #[test]
    fn test_layer_skips_own_target_and_floor() {
        let sink = CaptureSink::default();
        let layer = SinkLayer::new(sink.clone()).with_severity_floor(Severity::Information);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "steplog_core::sink::worker", "internal");
            tracing::debug!(target: "app", "too verbose");
            tracing::info!(target: "app", "kept");
        });

        let records = sink.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message(), "kept");
    }

    #[test]
    fn test_layer_prefixes_span_path() {
        let sink = CaptureSink::default();
        let subscriber = tracing_subscriber::registry().with(SinkLayer::new(sink.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!(target: "app", "checkout");
            let _guard = span.enter();
            tracing::info!(target: "app", "charged card");
        });

        let records = sink.records.lock();
        assert_eq!(records[0].message(), "checkout: charged card");
    }
}
