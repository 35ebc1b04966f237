use std::sync::Arc;

use super::{AdminCommands, CompletedCommand, Instrumentation, Resolved};
use crate::context::RequestContext;
use crate::correlation::{CorrelationStore, RequestId};
use crate::driver::{DriverError, KvCommand, KvReply, ProcessHook};
use crate::observability::spans::{TagValue, TAG_COMMAND, TAG_ERROR, TAG_REQUEST_ID, TAG_RESULT};

/// Process hook for the key-value driver. The client issues one request id
/// per command or pipeline, so concurrent commands never share a start.
pub struct KvHook {
    inst: Arc<Instrumentation>,
    store: Arc<CorrelationStore<()>>,
}

impl KvHook {
    pub fn new(inst: Arc<Instrumentation>, store: Arc<CorrelationStore<()>>) -> Self {
        KvHook { inst, store }
    }

    pub fn store(&self) -> &Arc<CorrelationStore<()>> {
        &self.store
    }

    fn is_admin(cmd: &KvCommand) -> bool {
        AdminCommands::KV.contains(&cmd.name)
    }

    fn emit(
        &self,
        ctx: &RequestContext,
        id: RequestId,
        span_operation: String,
        cmd: &KvCommand,
        result: Result<&KvReply, &DriverError>,
        resolved: &Resolved<()>,
    ) {
        let mut tags = vec![
            (TAG_REQUEST_ID, TagValue::UInt(id.0)),
            (TAG_COMMAND, TagValue::from(cmd.to_string())),
        ];
        let error = match result {
            Ok(reply) => {
                tags.push((TAG_RESULT, TagValue::from(reply.to_string())));
                None
            }
            Err(e) => {
                tags.push((TAG_ERROR, TagValue::from(e.to_string())));
                Some(e.to_string())
            }
        };

        self.inst.complete(CompletedCommand {
            ctx,
            span_operation,
            metric_operation: cmd.operation(),
            start_time: resolved.start_time,
            duration: resolved.duration,
            tags,
            error,
            detail: Some(format!("cmd={:?}", cmd.to_string())),
        });
    }
}

impl ProcessHook for KvHook {
    fn before_process(&self, _ctx: &RequestContext, id: RequestId, cmd: &KvCommand) {
        if Self::is_admin(cmd) {
            return;
        }
        self.inst.remember(&self.store, id, ());
    }

    fn after_process(
        &self,
        ctx: &RequestContext,
        id: RequestId,
        cmd: &KvCommand,
        result: Result<&KvReply, &DriverError>,
    ) {
        if Self::is_admin(cmd) {
            return;
        }
        let resolved = self.inst.resolve(&self.store, ctx, id);
        self.emit(
            ctx,
            id,
            cmd.operation(),
            cmd,
            result,
            &resolved,
        );
    }

    fn before_pipeline(&self, _ctx: &RequestContext, id: RequestId, cmds: &[KvCommand]) {
        if cmds.iter().all(Self::is_admin) {
            return;
        }
        self.inst.remember(&self.store, id, ());
    }

    fn after_pipeline(
        &self,
        ctx: &RequestContext,
        id: RequestId,
        cmds: &[KvCommand],
        results: &[Result<KvReply, DriverError>],
    ) {
        if cmds.iter().all(Self::is_admin) {
            return;
        }
        let resolved = self.inst.resolve(&self.store, ctx, id);
        let missing = DriverError::Command("no reply for pipelined command".into());

        for (i, cmd) in cmds.iter().enumerate() {
            if Self::is_admin(cmd) {
                continue;
            }
            let result = match results.get(i) {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(e)) => Err(e),
                None => Err(&missing),
            };
            self.emit(
                ctx,
                id,
                format!("pipeline: {}", cmd.operation()),
                cmd,
                result,
                &resolved,
            );
        }
    }
}
