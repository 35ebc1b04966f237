//! Request context threaded explicitly through every instrumented call.
//!
//! A `RequestContext` is an immutable value: deriving a new context (with a
//! trace parent or a cancellation token) always produces a copy, so call
//! scopes never share mutable state.

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// The span a command should be parented to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceParent {
    pub trace_id: u128,
    pub span_id: u64,
    pub sampled: bool,
}

impl TraceParent {
    pub fn new(trace_id: u128, span_id: u64) -> Self {
        TraceParent {
            trace_id,
            span_id,
            sampled: true,
        }
    }

    /// Start a fresh trace with random identifiers.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        // Zero ids are invalid in W3C trace context.
        let trace_id = rng.gen_range(1..=u128::MAX);
        let span_id = rng.gen_range(1..=u64::MAX);
        TraceParent::new(trace_id, span_id)
    }

    /// Same trace, new parent span.
    pub fn child(&self, span_id: u64) -> Self {
        TraceParent {
            trace_id: self.trace_id,
            span_id,
            sampled: self.sampled,
        }
    }

    pub fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.trace_id)
    }

    pub fn span_id_hex(&self) -> String {
        format!("{:016x}", self.span_id)
    }

    /// Render as a W3C `traceparent` header value.
    pub fn to_header(&self) -> String {
        let flags = if self.sampled { "01" } else { "00" };
        format!("00-{}-{}-{}", self.trace_id_hex(), self.span_id_hex(), flags)
    }

    /// Parse a W3C `traceparent` header value.
    pub fn from_header(header: &str) -> Option<Self> {
        let parts: Vec<&str> = header.trim().split('-').collect();
        if parts.len() != 4 || parts[0] != "00" {
            return None;
        }
        if parts[1].len() != 32 || parts[2].len() != 16 || parts[3].len() != 2 {
            return None;
        }
        let trace_id = u128::from_str_radix(parts[1], 16).ok()?;
        let span_id = u64::from_str_radix(parts[2], 16).ok()?;
        let flags = u8::from_str_radix(parts[3], 16).ok()?;
        if trace_id == 0 || span_id == 0 {
            return None;
        }
        Some(TraceParent {
            trace_id,
            span_id,
            sampled: flags & 0x01 == 0x01,
        })
    }
}

/// Per-call context: trace parent plus cancellation.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    trace: Option<TraceParent>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Root context with no trace parent and a token nobody cancels.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_trace_parent(&self, parent: TraceParent) -> Self {
        RequestContext {
            trace: Some(parent),
            cancel: self.cancel.clone(),
        }
    }

    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        RequestContext {
            trace: self.trace,
            cancel: token,
        }
    }

    /// Child context cancelled together with this one.
    pub fn child(&self) -> Self {
        RequestContext {
            trace: self.trace,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn trace_parent(&self) -> Option<&TraceParent> {
        self.trace.as_ref()
    }

    /// Hex trace id of the active span, if any.
    pub fn trace_id(&self) -> Option<String> {
        self.trace.map(|t| t.trace_id_hex())
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traceparent_header_round_trip() {
        let parent = TraceParent::new(0x4bf92f3577b34da6a3ce929d0e0e4736, 0x00f067aa0ba902b7);
        let header = parent.to_header();
        assert_eq!(
            header,
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
        );
        assert_eq!(TraceParent::from_header(&header), Some(parent));
    }

    #[test]
    fn test_traceparent_rejects_malformed() {
        assert!(TraceParent::from_header("").is_none());
        assert!(TraceParent::from_header("01-abc-def-01").is_none());
        assert!(TraceParent::from_header(
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01"
        )
        .is_none());
    }

    #[test]
    fn test_derived_context_keeps_parent_immutable() {
        let root = RequestContext::background();
        let traced = root.with_trace_parent(TraceParent::new(7, 9));

        assert!(root.trace_parent().is_none());
        assert_eq!(traced.trace_id().as_deref(), Some("00000000000000000000000000000007"));
    }

    #[test]
    fn test_child_cancelled_with_parent() {
        let root = RequestContext::background();
        let child = root.child();
        root.cancellation().cancel();
        assert!(child.is_cancelled());
    }
}
