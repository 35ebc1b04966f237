use serde_json::Value;
use std::sync::Arc;

use super::{CompletedCommand, Instrumentation};
use crate::correlation::CorrelationStore;
use crate::driver::{CallScope, DriverError, ExecResult, OperationKind, ScopeCallbacks};
use crate::observability::spans::{TagValue, TAG_ARGS, TAG_ERROR, TAG_ROWS_AFFECTED, TAG_SQL};

/// Before/after callbacks for the relational driver. The scope id issued by
/// the driver is the correlation key.
pub struct SqlHook {
    inst: Arc<Instrumentation>,
    store: Arc<CorrelationStore<()>>,
}

impl SqlHook {
    pub fn new(inst: Arc<Instrumentation>, store: Arc<CorrelationStore<()>>) -> Self {
        SqlHook { inst, store }
    }

    pub fn store(&self) -> &Arc<CorrelationStore<()>> {
        &self.store
    }
}

impl ScopeCallbacks for SqlHook {
    fn before(&self, scope: &CallScope) {
        self.inst.remember(&self.store, scope.id, ());
    }

    fn after(&self, scope: &CallScope, outcome: Result<&ExecResult, &DriverError>) {
        let resolved = self.inst.resolve(&self.store, &scope.ctx, scope.id);
        let operation = sql_operation(&scope.sql, scope.kind);
        let args = Value::Array(scope.args.clone());

        let mut tags = vec![
            (TAG_SQL, TagValue::from(scope.sql.as_str())),
            (TAG_ARGS, TagValue::Json(args.clone())),
        ];
        let error = match outcome {
            Ok(result) => {
                tags.push((TAG_ROWS_AFFECTED, TagValue::UInt(result.rows_affected)));
                None
            }
            Err(e) => {
                tags.push((TAG_ERROR, TagValue::from(e.to_string())));
                Some(e.to_string())
            }
        };

        self.inst.complete(CompletedCommand {
            ctx: &scope.ctx,
            span_operation: operation.clone(),
            metric_operation: operation,
            start_time: resolved.start_time,
            duration: resolved.duration,
            tags,
            error,
            detail: Some(format!("sql={:?} args={}", scope.sql, args)),
        });
    }
}

/// Lowercased leading keyword of the statement, or the call category when
/// the text has none.
pub fn sql_operation(sql: &str, kind: OperationKind) -> String {
    sql.split_whitespace()
        .next()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_ascii_alphanumeric())
                .to_ascii_lowercase()
        })
        .filter(|word| !word.is_empty())
        .unwrap_or_else(|| kind.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RequestContext, TraceParent};
    use crate::correlation::{CorrelationConfig, RequestId};
    use crate::observability::families::Backend;
    use crate::observability::logging::RecordingLogger;
    use crate::observability::recorder::SimulatedMetrics;
    use crate::observability::spans::RecordingTracer;
    use serde_json::json;
    use tracing::Level;

    #[test]
    fn test_sql_operation_keyword() {
        assert_eq!(sql_operation("SELECT * FROM users", OperationKind::Query), "select");
        assert_eq!(sql_operation("  insert into t values (1)", OperationKind::Create), "insert");
        assert_eq!(sql_operation("COMMIT", OperationKind::RowQuery), "commit");
        assert_eq!(sql_operation("", OperationKind::Delete), "delete");
        assert_eq!(sql_operation("   ", OperationKind::Update), "update");
    }

    #[test]
    fn test_scope_round_trip_carries_context() {
        let tracer = Arc::new(RecordingTracer::new());
        let metrics = Arc::new(SimulatedMetrics::new());
        let logger = Arc::new(RecordingLogger::new());
        let inst = Arc::new(Instrumentation::new(
            Backend::Relational,
            "shop",
            "era",
            logger.clone(),
            Some(tracer.clone()),
            metrics.clone(),
            true,
        ));
        let hook = SqlHook::new(inst, Arc::new(CorrelationStore::new(&CorrelationConfig::default())));
        let parent = TraceParent::new(0xfeed, 3);
        let scope = CallScope {
            id: RequestId(21),
            kind: OperationKind::Update,
            sql: "UPDATE users SET name = ? WHERE id = ?".into(),
            args: vec![json!("ada"), json!(1)],
            ctx: RequestContext::background().with_trace_parent(parent),
        };

        hook.before(&scope);
        hook.after(
            &scope,
            Ok(&ExecResult {
                rows: Vec::new(),
                rows_affected: 1,
            }),
        );

        let spans = tracer.by_name("relational: update");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].parent, Some(parent));
        assert_eq!(spans[0].tag(TAG_ROWS_AFFECTED), Some(&TagValue::UInt(1)));
        assert_eq!(
            spans[0].tag(TAG_ARGS),
            Some(&TagValue::Json(json!(["ada", 1])))
        );
        assert_eq!(
            metrics.counter_value("era_relational_query_exec_total", &["shop", "update", "success"]),
            1.0
        );

        let info = logger.lines_at(Level::INFO);
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].trace_id, Some(parent.trace_id_hex()));
        assert!(hook.store().is_empty());
    }

    #[test]
    fn test_failed_scope_counts_error() {
        let metrics = Arc::new(SimulatedMetrics::new());
        let inst = Arc::new(Instrumentation::new(
            Backend::Relational,
            "shop",
            "era",
            Arc::new(RecordingLogger::new()),
            None,
            metrics.clone(),
            true,
        ));
        let hook = SqlHook::new(inst, Arc::new(CorrelationStore::new(&CorrelationConfig::default())));
        let scope = CallScope {
            id: RequestId(22),
            kind: OperationKind::Delete,
            sql: "DELETE FROM users".into(),
            args: Vec::new(),
            ctx: RequestContext::background(),
        };

        hook.before(&scope);
        hook.after(&scope, Err(&DriverError::Command("lock wait timeout".into())));

        assert_eq!(
            metrics.counter_value("era_relational_query_exec_total", &["shop", "delete", "error"]),
            1.0
        );
    }
}
