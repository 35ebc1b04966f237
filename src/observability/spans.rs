//! Span Emission
//!
//! Spans produced by the hooks always describe a finished interval: they are
//! started with an explicit past start time, tagged, and finished at once.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{field, span, Level, Span};

use crate::context::{RequestContext, TraceParent};
use crate::error::TelemetryError;

pub const TAG_REQUEST_ID: &str = "request_id";
pub const TAG_COMMAND: &str = "command";
pub const TAG_STATEMENT: &str = "statement";
pub const TAG_DATABASE: &str = "db";
pub const TAG_SQL: &str = "sql";
pub const TAG_ARGS: &str = "args";
pub const TAG_RESULT: &str = "result";
pub const TAG_ERROR: &str = "error";
pub const TAG_ROWS_AFFECTED: &str = "rows_affected";

#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Bool(bool),
    Json(Value),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Str(s) => f.write_str(s),
            TagValue::Int(i) => write!(f, "{}", i),
            TagValue::UInt(u) => write!(f, "{}", u),
            TagValue::Bool(b) => write!(f, "{}", b),
            TagValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Str(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Str(s)
    }
}

impl From<u64> for TagValue {
    fn from(u: u64) -> Self {
        TagValue::UInt(u)
    }
}

impl From<i64> for TagValue {
    fn from(i: i64) -> Self {
        TagValue::Int(i)
    }
}

impl From<bool> for TagValue {
    fn from(b: bool) -> Self {
        TagValue::Bool(b)
    }
}

impl From<Value> for TagValue {
    fn from(v: Value) -> Self {
        TagValue::Json(v)
    }
}

/// A completed command, ready for the tracer.
#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub operation_name: String,
    pub parent: RequestContext,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub tags: Vec<(&'static str, TagValue)>,
}

impl SpanRecord {
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// A span between start and finish.
pub trait ActiveSpan: Send {
    fn set_tag(&mut self, key: &'static str, value: TagValue);

    fn finish(self: Box<Self>, end_time: SystemTime);
}

/// Tracer collaborator.
pub trait Tracer: Send + Sync + 'static {
    /// Start a span parented to the context's trace parent, or a root span
    /// when the context has none.
    fn start_span(
        &self,
        operation_name: &str,
        parent: &RequestContext,
        start_time: SystemTime,
    ) -> Result<Box<dyn ActiveSpan>, TelemetryError>;
}

pub type SharedTracer = Arc<dyn Tracer>;

/// Translates span records into tracer calls. No tracer means no-op.
#[derive(Clone, Default)]
pub struct SpanEmitter {
    tracer: Option<SharedTracer>,
}

impl SpanEmitter {
    pub fn new(tracer: Option<SharedTracer>) -> Self {
        SpanEmitter { tracer }
    }

    pub fn is_enabled(&self) -> bool {
        self.tracer.is_some()
    }

    pub fn emit(&self, record: &SpanRecord) -> Result<(), TelemetryError> {
        let Some(tracer) = &self.tracer else {
            return Ok(());
        };

        let mut span = tracer.start_span(&record.operation_name, &record.parent, record.start_time)?;
        for (key, value) in &record.tags {
            span.set_tag(*key, value.clone());
        }
        span.finish(record.end_time);
        Ok(())
    }
}

/// Tracer that discards everything.
#[derive(Clone, Copy, Default)]
pub struct NoopTracer;

struct NoopSpan;

impl ActiveSpan for NoopSpan {
    #[inline]
    fn set_tag(&mut self, _key: &'static str, _value: TagValue) {}

    #[inline]
    fn finish(self: Box<Self>, _end_time: SystemTime) {}
}

impl Tracer for NoopTracer {
    fn start_span(
        &self,
        _operation_name: &str,
        _parent: &RequestContext,
        _start_time: SystemTime,
    ) -> Result<Box<dyn ActiveSpan>, TelemetryError> {
        Ok(Box::new(NoopSpan))
    }
}

/// Create a span for one finished store command
#[inline]
pub fn command_span(operation: &str, parent: Option<&TraceParent>) -> Span {
    let (trace_id, parent_span_id) = match parent {
        Some(p) => (p.trace_id_hex(), p.span_id_hex()),
        None => (String::new(), String::new()),
    };
    span!(
        Level::INFO,
        "db.command",
        otel.name = %operation,
        otel.kind = "client",
        trace_id = %trace_id,
        parent_span_id = %parent_span_id,
        request_id = field::Empty,
        command = field::Empty,
        db = field::Empty,
        sql = field::Empty,
        args = field::Empty,
        result = field::Empty,
        error = field::Empty,
        rows_affected = field::Empty,
        duration_ms = field::Empty,
    )
}

/// Tracer backed by the `tracing` crate. Pairs with whatever subscriber the
/// process installed (fmt, or OpenTelemetry with the `datadog` feature).
#[derive(Clone, Copy, Default)]
pub struct TracingTracer;

struct TracingSpan {
    span: Span,
    start_time: SystemTime,
}

impl ActiveSpan for TracingSpan {
    fn set_tag(&mut self, key: &'static str, value: TagValue) {
        // Unknown keys are not declared on the span and are dropped.
        self.span.record(key, field::display(value));
    }

    fn finish(self: Box<Self>, end_time: SystemTime) {
        let elapsed = end_time
            .duration_since(self.start_time)
            .unwrap_or(Duration::ZERO);
        self.span
            .record("duration_ms", elapsed.as_secs_f64() * 1000.0);
    }
}

impl Tracer for TracingTracer {
    fn start_span(
        &self,
        operation_name: &str,
        parent: &RequestContext,
        start_time: SystemTime,
    ) -> Result<Box<dyn ActiveSpan>, TelemetryError> {
        Ok(Box::new(TracingSpan {
            span: command_span(operation_name, parent.trace_parent()),
            start_time,
        }))
    }
}

/// A span captured by [`RecordingTracer`].
#[derive(Debug, Clone)]
pub struct FinishedSpan {
    pub operation_name: String,
    pub parent: Option<TraceParent>,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub tags: Vec<(&'static str, TagValue)>,
}

impl FinishedSpan {
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn duration(&self) -> Duration {
        self.end_time
            .duration_since(self.start_time)
            .unwrap_or(Duration::ZERO)
    }
}

/// Tracer that keeps finished spans in memory for verification.
#[derive(Default)]
pub struct RecordingTracer {
    finished: Arc<Mutex<Vec<FinishedSpan>>>,
    fail: bool,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracer whose `start_span` always fails.
    pub fn failing() -> Self {
        RecordingTracer {
            finished: Arc::default(),
            fail: true,
        }
    }

    pub fn finished(&self) -> Vec<FinishedSpan> {
        self.finished.lock().clone()
    }

    pub fn by_name(&self, operation_name: &str) -> Vec<FinishedSpan> {
        self.finished
            .lock()
            .iter()
            .filter(|s| s.operation_name == operation_name)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.finished.lock().clear();
    }
}

struct RecordingSpan {
    sink: Arc<Mutex<Vec<FinishedSpan>>>,
    operation_name: String,
    parent: Option<TraceParent>,
    start_time: SystemTime,
    tags: Vec<(&'static str, TagValue)>,
}

impl ActiveSpan for RecordingSpan {
    fn set_tag(&mut self, key: &'static str, value: TagValue) {
        self.tags.push((key, value));
    }

    fn finish(self: Box<Self>, end_time: SystemTime) {
        let span = *self;
        span.sink.lock().push(FinishedSpan {
            operation_name: span.operation_name,
            parent: span.parent,
            start_time: span.start_time,
            end_time,
            tags: span.tags,
        });
    }
}

impl Tracer for RecordingTracer {
    fn start_span(
        &self,
        operation_name: &str,
        parent: &RequestContext,
        start_time: SystemTime,
    ) -> Result<Box<dyn ActiveSpan>, TelemetryError> {
        if self.fail {
            return Err(TelemetryError::Tracer("recording tracer set to fail".into()));
        }
        Ok(Box::new(RecordingSpan {
            sink: self.finished.clone(),
            operation_name: operation_name.to_string(),
            parent: parent.trace_parent().copied(),
            start_time,
            tags: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(parent: RequestContext) -> SpanRecord {
        let start_time = SystemTime::now();
        SpanRecord {
            operation_name: "document: find".into(),
            parent,
            start_time,
            end_time: start_time + Duration::from_millis(12),
            tags: vec![
                (TAG_REQUEST_ID, TagValue::UInt(7)),
                (TAG_COMMAND, TagValue::from("find")),
            ],
        }
    }

    #[test]
    fn test_emitter_without_tracer_is_noop() {
        let emitter = SpanEmitter::new(None);
        assert!(!emitter.is_enabled());
        assert!(emitter.emit(&record(RequestContext::background())).is_ok());
    }

    #[test]
    fn test_emitter_forwards_tags_and_parent() {
        let tracer = Arc::new(RecordingTracer::new());
        let emitter = SpanEmitter::new(Some(tracer.clone()));
        let parent = TraceParent::new(99, 5);

        emitter
            .emit(&record(RequestContext::background().with_trace_parent(parent)))
            .unwrap();

        let spans = tracer.finished();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].parent, Some(parent));
        assert_eq!(spans[0].tag(TAG_REQUEST_ID), Some(&TagValue::UInt(7)));
        assert_eq!(spans[0].duration(), Duration::from_millis(12));
    }

    #[test]
    fn test_emitter_surfaces_tracer_failure() {
        let emitter = SpanEmitter::new(Some(Arc::new(RecordingTracer::failing())));
        assert!(matches!(
            emitter.emit(&record(RequestContext::background())),
            Err(TelemetryError::Tracer(_))
        ));
    }

    #[test]
    fn test_tracing_tracer_no_panic_without_subscriber() {
        let emitter = SpanEmitter::new(Some(Arc::new(TracingTracer)));
        assert!(emitter.emit(&record(RequestContext::background())).is_ok());
    }
}
