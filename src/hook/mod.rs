//! Command Hooks
//!
//! One hook per backend, each attached to its driver's native extension
//! point. A hook captures the start of a command in the correlation store
//! and, on completion, fans out in a fixed order:
//!
//! 1. span (when a tracer is configured)
//! 2. counter + duration histogram (when the monitor is enabled)
//! 3. one log line through the context-aware logger
//!
//! A failing emitter is logged at warn and never stops the others. Nothing
//! here can change the command's outcome.

pub mod document;
pub mod kv;
pub mod relational;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::context::RequestContext;
use crate::correlation::{CorrelationEntry, CorrelationStore, Evicted, RequestId};
use crate::observability::emitter::MetricEmitter;
use crate::observability::families::{Backend, BackendFamilies};
use crate::observability::logging::SharedLogger;
use crate::observability::recorder::SharedMetrics;
use crate::observability::spans::{SharedTracer, SpanEmitter, SpanRecord, TagValue};

pub use document::DocumentHook;
pub use kv::KvHook;
pub use relational::SqlHook;

/// Everything a hook needs to emit telemetry for one backend and target.
pub struct Instrumentation {
    backend: Backend,
    target: String,
    spans: SpanEmitter,
    metrics: Arc<MetricEmitter>,
    logger: SharedLogger,
}

impl Instrumentation {
    pub fn new(
        backend: Backend,
        target: impl Into<String>,
        namespace: &str,
        logger: SharedLogger,
        tracer: Option<SharedTracer>,
        recorder: SharedMetrics,
        monitor_enabled: bool,
    ) -> Self {
        let families = BackendFamilies::new(namespace, backend);
        Instrumentation {
            backend,
            target: target.into(),
            spans: SpanEmitter::new(tracer),
            metrics: Arc::new(MetricEmitter::new(recorder, families, monitor_enabled)),
            logger,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn logger(&self) -> &SharedLogger {
        &self.logger
    }

    pub fn metrics(&self) -> &Arc<MetricEmitter> {
        &self.metrics
    }

    pub fn span_name(&self, operation: &str) -> String {
        format!("{}{}", self.backend.span_prefix(), operation)
    }

    /// Store a start, logging anything the capacity cap pushed out.
    pub fn remember<P>(&self, store: &CorrelationStore<P>, id: RequestId, payload: P) {
        let evicted = store.put(id, CorrelationEntry::new(payload));
        self.log_evicted(&evicted);
    }

    fn log_evicted<P>(&self, evicted: &[Evicted<P>]) {
        for (id, entry) in evicted {
            self.logger.warn(&format!(
                "{}correlation store full, dropped request {} after {}ms",
                self.backend.span_prefix(),
                id,
                entry.age().as_millis()
            ));
        }
    }

    /// Match a completion to its start. A miss yields zero duration, a start
    /// time of now and the default payload.
    pub fn resolve<P: Default>(
        &self,
        store: &CorrelationStore<P>,
        ctx: &RequestContext,
        id: RequestId,
    ) -> Resolved<P> {
        match store.take(id) {
            Some(entry) => Resolved {
                start_time: entry.start_time,
                duration: entry.started_at.elapsed(),
                payload: entry.payload,
                matched: true,
            },
            None => {
                self.logger.ctx_debug(
                    ctx,
                    &format!(
                        "{}no start recorded for request {}",
                        self.backend.span_prefix(),
                        id
                    ),
                );
                Resolved {
                    start_time: SystemTime::now(),
                    duration: Duration::ZERO,
                    payload: P::default(),
                    matched: false,
                }
            }
        }
    }

    /// Fan a completed command out to span, metrics and log.
    pub fn complete(&self, command: CompletedCommand<'_>) {
        let name = self.span_name(&command.span_operation);
        let duration_ms = command.duration.as_millis();

        let record = SpanRecord {
            operation_name: name.clone(),
            parent: command.ctx.clone(),
            start_time: command.start_time,
            end_time: command.start_time + command.duration,
            tags: command.tags,
        };
        if let Err(e) = self.spans.emit(&record) {
            self.logger
                .warn(&format!("{} span not recorded: {}", name, e));
        }

        if let Err(e) = self.metrics.record_command(
            &self.target,
            &command.metric_operation,
            command.error.is_none(),
            command.duration,
        ) {
            self.logger
                .warn(&format!("{} metrics not recorded: {}", name, e));
        }

        let mut line = format!("{} duration_ms={}", name, duration_ms);
        if let Some(detail) = &command.detail {
            line.push(' ');
            line.push_str(detail);
        }
        match &command.error {
            None => self.logger.ctx_info(command.ctx, &line),
            Some(err) => {
                line.push_str(" error=");
                line.push_str(err);
                self.logger.ctx_error(command.ctx, &line);
            }
        }
    }
}

/// Outcome of matching a completion against the store.
#[derive(Debug)]
pub struct Resolved<P> {
    pub start_time: SystemTime,
    pub duration: Duration,
    pub payload: P,
    pub matched: bool,
}

/// One finished command, ready for emission.
pub struct CompletedCommand<'a> {
    pub ctx: &'a RequestContext,
    /// Appended to the backend's span prefix.
    pub span_operation: String,
    /// Low-cardinality `operation` metric label.
    pub metric_operation: String,
    pub start_time: SystemTime,
    pub duration: Duration,
    pub tags: Vec<(&'static str, TagValue)>,
    pub error: Option<String>,
    /// Extra `key=value` text for the log line.
    pub detail: Option<String>,
}

/// Case-insensitive set of commands that bypass instrumentation.
#[derive(Debug, Clone, Copy)]
pub struct AdminCommands(&'static [&'static str]);

impl AdminCommands {
    pub const DOCUMENT: AdminCommands = AdminCommands(&["ping", "endSessions"]);
    pub const KV: AdminCommands = AdminCommands(&["ping", "quit"]);

    pub fn contains(&self, command: &str) -> bool {
        self.0.iter().any(|c| c.eq_ignore_ascii_case(command))
    }
}
