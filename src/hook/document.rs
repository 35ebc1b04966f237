use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{AdminCommands, CompletedCommand, Instrumentation};
use crate::context::RequestContext;
use crate::correlation::{CorrelationStore, RequestId};
use crate::driver::{CommandMonitor, PoolStats};
use crate::event::{CommandEvent, CommandFailed, CommandStarted, CommandSucceeded, PoolEvent};
use crate::observability::spans::{
    TagValue, TAG_COMMAND, TAG_DATABASE, TAG_ERROR, TAG_REQUEST_ID, TAG_RESULT, TAG_STATEMENT,
};

/// What a `Started` event leaves behind for its completion.
#[derive(Debug, Clone, Default)]
pub struct StartedCommand {
    pub database: String,
    pub command: Value,
}

/// Command monitor for the document driver.
pub struct DocumentHook {
    inst: Arc<Instrumentation>,
    store: Arc<CorrelationStore<StartedCommand>>,
    open: AtomicU64,
    in_use: AtomicU64,
}

impl DocumentHook {
    pub fn new(inst: Arc<Instrumentation>, store: Arc<CorrelationStore<StartedCommand>>) -> Self {
        DocumentHook {
            inst,
            store,
            open: AtomicU64::new(0),
            in_use: AtomicU64::new(0),
        }
    }

    /// Start the pool counters from the driver's current pool. The hook is
    /// installed after connect, so it never sees the initial connections.
    pub fn with_pool(self, stats: &PoolStats) -> Self {
        self.open.store(stats.open, Ordering::SeqCst);
        self.in_use.store(stats.in_use, Ordering::SeqCst);
        self
    }

    pub fn store(&self) -> &Arc<CorrelationStore<StartedCommand>> {
        &self.store
    }

    fn started(&self, event: CommandStarted) {
        if AdminCommands::DOCUMENT.contains(&event.command_name) {
            return;
        }
        self.inst.remember(
            &self.store,
            event.request_id,
            StartedCommand {
                database: event.database,
                command: event.command,
            },
        );
    }

    fn succeeded(&self, ctx: &RequestContext, event: CommandSucceeded) {
        if AdminCommands::DOCUMENT.contains(&event.command_name) {
            return;
        }
        let outcome = (TAG_RESULT, TagValue::Json(event.reply));
        self.finish(ctx, event.request_id, event.command_name, outcome, None);
    }

    fn failed(&self, ctx: &RequestContext, event: CommandFailed) {
        if AdminCommands::DOCUMENT.contains(&event.command_name) {
            return;
        }
        let outcome = (TAG_ERROR, TagValue::from(event.failure.as_str()));
        self.finish(
            ctx,
            event.request_id,
            event.command_name,
            outcome,
            Some(event.failure),
        );
    }

    fn finish(
        &self,
        ctx: &RequestContext,
        id: RequestId,
        command_name: String,
        outcome: (&'static str, TagValue),
        error: Option<String>,
    ) {
        let resolved = self.inst.resolve(&self.store, ctx, id);
        let detail = resolved
            .matched
            .then(|| format!("db={} request_id={}", resolved.payload.database, id));

        let mut tags = vec![
            (TAG_REQUEST_ID, TagValue::UInt(id.0)),
            (TAG_COMMAND, TagValue::from(command_name.as_str())),
        ];
        if resolved.matched {
            tags.push((TAG_STATEMENT, TagValue::Json(resolved.payload.command)));
            tags.push((TAG_DATABASE, TagValue::from(resolved.payload.database)));
        }
        tags.push(outcome);

        self.inst.complete(CompletedCommand {
            ctx,
            metric_operation: command_name.clone(),
            span_operation: command_name,
            start_time: resolved.start_time,
            duration: resolved.duration,
            tags,
            error,
            detail,
        });
    }

    fn pool(&self, event: PoolEvent) {
        match event {
            PoolEvent::ConnectionCreated => {
                self.open.fetch_add(1, Ordering::SeqCst);
            }
            PoolEvent::ConnectionClosed => decrement(&self.open),
            PoolEvent::ConnectionCheckedOut => {
                self.in_use.fetch_add(1, Ordering::SeqCst);
            }
            PoolEvent::ConnectionCheckedIn => decrement(&self.in_use),
            PoolEvent::PoolCleared => {
                self.open.store(0, Ordering::SeqCst);
                self.in_use.store(0, Ordering::SeqCst);
            }
        }

        let metrics = self.inst.metrics();
        let target = self.inst.target();
        let open = self.open.load(Ordering::SeqCst) as f64;
        let in_use = self.in_use.load(Ordering::SeqCst) as f64;
        let result = metrics
            .set_statistic(target, "open conn", open)
            .and_then(|_| metrics.set_statistic(target, "in use conn", in_use));
        if let Err(e) = result {
            self.inst
                .logger()
                .warn(&format!("document: pool gauges not recorded: {}", e));
        }
    }
}

fn decrement(counter: &AtomicU64) {
    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
        Some(n.saturating_sub(1))
    });
}

impl CommandMonitor for DocumentHook {
    fn handle_event(&self, ctx: &RequestContext, event: CommandEvent) {
        match event {
            CommandEvent::Started(e) => self.started(e),
            CommandEvent::Succeeded(e) => self.succeeded(ctx, e),
            CommandEvent::Failed(e) => self.failed(ctx, e),
            CommandEvent::Pool(e) => self.pool(e),
        }
    }
}
