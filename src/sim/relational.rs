use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::faults::{driver, events, FaultConfig, FaultInjector};
use crate::config::SqlConfig;
use crate::context::RequestContext;
use crate::correlation::RequestId;
use crate::driver::{
    CallScope, DriverError, ExecResult, OperationKind, PoolStats, PoolStatsSource,
    ScopeCallbacks, SqlDriver,
};

/// One call as the driver saw it.
#[derive(Debug, Clone)]
pub struct ExecutedCall {
    pub scope_id: RequestId,
    pub kind: OperationKind,
    pub sql: String,
    pub trace_id: Option<String>,
}

/// Relational driver that answers from canned results. Statements without a
/// canned result return no rows; writes report one affected row.
pub struct MemorySqlDriver {
    callbacks: RwLock<Vec<Arc<dyn ScopeCallbacks>>>,
    canned: Mutex<HashMap<String, Result<ExecResult, DriverError>>>,
    executed: Mutex<Vec<ExecutedCall>>,
    open: AtomicBool,
    next_scope: AtomicU64,
    max_open: AtomicU64,
    in_use: AtomicU64,
    wait_count: AtomicU64,
    faults: FaultInjector,
}

impl Default for MemorySqlDriver {
    fn default() -> Self {
        Self::with_faults(FaultConfig::disabled(), 0)
    }
}

impl MemorySqlDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(config: FaultConfig, seed: u64) -> Self {
        MemorySqlDriver {
            callbacks: RwLock::new(Vec::new()),
            canned: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
            open: AtomicBool::new(false),
            next_scope: AtomicU64::new(1),
            max_open: AtomicU64::new(0),
            in_use: AtomicU64::new(0),
            wait_count: AtomicU64::new(0),
            faults: FaultInjector::new(config, seed),
        }
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Answer `sql` with `result` from now on.
    pub fn respond(&self, sql: impl Into<String>, result: Result<ExecResult, DriverError>) {
        self.canned.lock().insert(sql.into(), result);
    }

    pub fn executed(&self) -> Vec<ExecutedCall> {
        self.executed.lock().clone()
    }

    fn answer(&self, kind: OperationKind, sql: &str) -> Result<ExecResult, DriverError> {
        if let Some(canned) = self.canned.lock().get(sql) {
            return canned.clone();
        }
        let rows_affected = match kind {
            OperationKind::Query | OperationKind::RowQuery => 0,
            OperationKind::Create | OperationKind::Update | OperationKind::Delete => 1,
        };
        Ok(ExecResult {
            rows: Vec::new(),
            rows_affected,
        })
    }
}

impl PoolStatsSource for MemorySqlDriver {
    fn pool_stats(&self) -> PoolStats {
        let open = u64::from(self.open.load(Ordering::SeqCst));
        let in_use = self.in_use.load(Ordering::SeqCst);
        PoolStats {
            max_open: self.max_open.load(Ordering::SeqCst),
            open: open.max(in_use),
            in_use,
            idle: open.saturating_sub(in_use),
            wait_count: self.wait_count.load(Ordering::SeqCst),
            wait_duration: Duration::ZERO,
            ..PoolStats::default()
        }
    }
}

impl SqlDriver for MemorySqlDriver {
    fn register_callbacks(&self, callbacks: Arc<dyn ScopeCallbacks>) {
        self.callbacks.write().push(callbacks);
    }

    fn open(&self, config: &SqlConfig) -> Result<(), DriverError> {
        if self.faults.fires(driver::CONNECT_FAIL) {
            return Err(DriverError::Connection(format!(
                "dial {}: connection refused",
                config.db_name
            )));
        }
        self.max_open
            .store(u64::from(config.max_open_conn), Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ping(&self) -> Result<(), DriverError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        if self.faults.fires(driver::PING_FAIL) {
            return Err(DriverError::Connection("bad connection".into()));
        }
        Ok(())
    }

    fn execute(
        &self,
        ctx: &RequestContext,
        kind: OperationKind,
        sql: &str,
        args: &[Value],
    ) -> Result<ExecResult, DriverError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }

        let scope = CallScope {
            id: RequestId(self.next_scope.fetch_add(1, Ordering::Relaxed)),
            kind,
            sql: sql.to_string(),
            args: args.to_vec(),
            ctx: ctx.clone(),
        };
        self.executed.lock().push(ExecutedCall {
            scope_id: scope.id,
            kind,
            sql: scope.sql.clone(),
            trace_id: ctx.trace_id(),
        });

        let callbacks = self.callbacks.read().clone();
        if !self.faults.fires(events::DROP_START) {
            for cb in &callbacks {
                cb.before(&scope);
            }
        }

        self.in_use.fetch_add(1, Ordering::SeqCst);
        let result = if self.faults.fires(driver::COMMAND_FAIL) {
            Err(DriverError::Command("Error 1213: deadlock found".into()))
        } else {
            self.answer(kind, sql)
        };
        let _ = self
            .in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));

        let repeats = if self.faults.fires(events::DUPLICATE_COMPLETION) { 2 } else { 1 };
        for _ in 0..repeats {
            for cb in &callbacks {
                cb.after(&scope, result.as_ref());
            }
        }
        result
    }

    fn close(&self) -> Result<(), DriverError> {
        if self.faults.fires(driver::CLOSE_FAIL) {
            return Err(DriverError::Connection("close: invalid connection".into()));
        }
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}
