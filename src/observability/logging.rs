//! Logger collaborator.
//!
//! Hooks log through this trait rather than calling `tracing` directly so a
//! client can be handed a silent logger, a recording one in tests, or the
//! production [`TracingLogger`]. The context-aware variants attach the trace
//! id of the request's active span.

use crate::context::RequestContext;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::Level;

pub trait Logger: Send + Sync + 'static {
    fn log(&self, level: Level, message: &str);

    fn log_ctx(&self, ctx: &RequestContext, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }

    fn ctx_debug(&self, ctx: &RequestContext, message: &str) {
        self.log_ctx(ctx, Level::DEBUG, message);
    }

    fn ctx_info(&self, ctx: &RequestContext, message: &str) {
        self.log_ctx(ctx, Level::INFO, message);
    }

    fn ctx_error(&self, ctx: &RequestContext, message: &str) {
        self.log_ctx(ctx, Level::ERROR, message);
    }
}

pub type SharedLogger = Arc<dyn Logger>;

/// Discards everything. Default when a client is built without a logger.
#[derive(Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    #[inline]
    fn log(&self, _level: Level, _message: &str) {}

    #[inline]
    fn log_ctx(&self, _ctx: &RequestContext, _level: Level, _message: &str) {}
}

pub fn null_logger() -> SharedLogger {
    Arc::new(NullLogger)
}

/// Forwards to the `tracing` macros, tagging each event with the logger name.
#[derive(Clone)]
pub struct TracingLogger {
    name: String,
}

impl TracingLogger {
    pub fn new(name: impl Into<String>) -> Self {
        TracingLogger { name: name.into() }
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"))
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        let name = self.name.as_str();
        match level {
            Level::ERROR => tracing::error!(logger = %name, "{}", message),
            Level::WARN => tracing::warn!(logger = %name, "{}", message),
            Level::INFO => tracing::info!(logger = %name, "{}", message),
            Level::DEBUG => tracing::debug!(logger = %name, "{}", message),
            Level::TRACE => tracing::trace!(logger = %name, "{}", message),
        }
    }

    fn log_ctx(&self, ctx: &RequestContext, level: Level, message: &str) {
        let name = self.name.as_str();
        let trace_id = ctx.trace_id().unwrap_or_default();
        match level {
            Level::ERROR => tracing::error!(logger = %name, trace_id = %trace_id, "{}", message),
            Level::WARN => tracing::warn!(logger = %name, trace_id = %trace_id, "{}", message),
            Level::INFO => tracing::info!(logger = %name, trace_id = %trace_id, "{}", message),
            Level::DEBUG => tracing::debug!(logger = %name, trace_id = %trace_id, "{}", message),
            Level::TRACE => tracing::trace!(logger = %name, trace_id = %trace_id, "{}", message),
        }
    }
}

/// One captured log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub level: Level,
    pub message: String,
    pub trace_id: Option<String>,
}

/// Captures every line for later assertions.
#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<LogLine>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().clone()
    }

    pub fn lines_at(&self, level: Level) -> Vec<LogLine> {
        self.lines
            .lock()
            .iter()
            .filter(|l| l.level == level)
            .cloned()
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.message.contains(needle))
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: Level, message: &str) {
        self.lines.lock().push(LogLine {
            level,
            message: message.to_string(),
            trace_id: None,
        });
    }

    fn log_ctx(&self, ctx: &RequestContext, level: Level, message: &str) {
        self.lines.lock().push(LogLine {
            level,
            message: message.to_string(),
            trace_id: ctx.trace_id(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TraceParent;

    #[test]
    fn test_recording_logger_attaches_trace_id() {
        let logger = RecordingLogger::new();
        let ctx = RequestContext::background().with_trace_parent(TraceParent::new(0xabc, 1));

        logger.ctx_info(&ctx, "document: find duration_ms=3");
        logger.error("plain");

        let lines = logger.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0].trace_id.as_deref(),
            Some("00000000000000000000000000000abc")
        );
        assert_eq!(lines[1].level, Level::ERROR);
        assert!(lines[1].trace_id.is_none());
    }

    #[test]
    fn test_null_logger_no_panic() {
        let logger = NullLogger;
        logger.info("ignored");
        logger.ctx_error(&RequestContext::background(), "ignored");
    }
}
