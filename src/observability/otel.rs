//! OpenTelemetry tracer adapter.
//!
//! Spans go through the global tracer provider installed by
//! `init_tracing`, so they are exported by the Datadog pipeline.

use opentelemetry::global::{self, BoxedSpan, BoxedTracer};
use opentelemetry::trace::{
    Span as _, SpanBuilder, SpanContext, SpanId, SpanKind, TraceContextExt, TraceFlags, TraceId,
    TraceState, Tracer as _,
};
use opentelemetry::{Context, KeyValue};
use std::time::SystemTime;

use super::spans::{ActiveSpan, TagValue, Tracer};
use crate::context::{RequestContext, TraceParent};
use crate::error::TelemetryError;

pub struct OtelTracer {
    tracer: BoxedTracer,
}

impl OtelTracer {
    /// Tracer from the global provider.
    pub fn global(name: &'static str) -> Self {
        OtelTracer {
            tracer: global::tracer(name),
        }
    }
}

/// Remote parent context for a trace parent carried by the request.
pub fn parent_context(parent: Option<&TraceParent>) -> Context {
    match parent {
        Some(p) => {
            let flags = if p.sampled {
                TraceFlags::SAMPLED
            } else {
                TraceFlags::default()
            };
            let span_context = SpanContext::new(
                TraceId::from_bytes(p.trace_id.to_be_bytes()),
                SpanId::from_bytes(p.span_id.to_be_bytes()),
                flags,
                true,
                TraceState::default(),
            );
            Context::new().with_remote_span_context(span_context)
        }
        None => Context::new(),
    }
}

struct OtelSpan {
    span: BoxedSpan,
}

impl ActiveSpan for OtelSpan {
    fn set_tag(&mut self, key: &'static str, value: TagValue) {
        let kv = match value {
            TagValue::Int(i) => KeyValue::new(key, i),
            TagValue::UInt(u) => KeyValue::new(key, u as i64),
            TagValue::Bool(b) => KeyValue::new(key, b),
            other => KeyValue::new(key, other.to_string()),
        };
        self.span.set_attribute(kv);
    }

    fn finish(mut self: Box<Self>, end_time: SystemTime) {
        self.span.end_with_timestamp(end_time);
    }
}

impl Tracer for OtelTracer {
    fn start_span(
        &self,
        operation_name: &str,
        parent: &RequestContext,
        start_time: SystemTime,
    ) -> Result<Box<dyn ActiveSpan>, TelemetryError> {
        let cx = parent_context(parent.trace_parent());
        let builder = SpanBuilder::from_name(operation_name.to_string())
            .with_kind(SpanKind::Client)
            .with_start_time(start_time);
        let span = self.tracer.build_with_context(builder, &cx);
        Ok(Box::new(OtelSpan { span }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_context_carries_ids() {
        let parent = TraceParent::new(0x0102, 0x0304);
        let cx = parent_context(Some(&parent));
        let span_context = cx.span().span_context().clone();

        assert!(span_context.is_remote());
        assert_eq!(span_context.span_id(), SpanId::from_bytes(0x0304u64.to_be_bytes()));
    }

    #[test]
    fn test_global_tracer_without_provider_no_panic() {
        let tracer = OtelTracer::global("storehook-test");
        let span = tracer
            .start_span("kv: get", &RequestContext::background(), SystemTime::now())
            .unwrap();
        span.finish(SystemTime::now());
    }
}
