use super::{DriverError, PoolStatsSource};
use crate::config::SqlConfig;
use crate::context::RequestContext;
use crate::correlation::RequestId;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Operation categories the relational driver intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    RowQuery,
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Query,
        OperationKind::RowQuery,
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::RowQuery => "row_query",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One driver call as seen by the callbacks. The driver issues `id`; the
/// context is whatever the caller bound with `with_context`.
#[derive(Debug, Clone)]
pub struct CallScope {
    pub id: RequestId,
    pub kind: OperationKind,
    pub sql: String,
    pub args: Vec<Value>,
    pub ctx: RequestContext,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    pub rows: Vec<Value>,
    pub rows_affected: u64,
}

/// Before/after interception around every call scope.
pub trait ScopeCallbacks: Send + Sync + 'static {
    fn before(&self, scope: &CallScope);

    fn after(&self, scope: &CallScope, outcome: Result<&ExecResult, &DriverError>);
}

pub trait SqlDriver: PoolStatsSource {
    /// Register callbacks for every operation category.
    fn register_callbacks(&self, callbacks: Arc<dyn ScopeCallbacks>);

    fn open(&self, config: &SqlConfig) -> Result<(), DriverError>;

    fn ping(&self) -> Result<(), DriverError>;

    fn execute(
        &self,
        ctx: &RequestContext,
        kind: OperationKind,
        sql: &str,
        args: &[Value],
    ) -> Result<ExecResult, DriverError>;

    fn close(&self) -> Result<(), DriverError>;
}
