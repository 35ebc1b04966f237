use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::{ClientOptions, CloseHandle, Lifecycle};
use crate::config::SqlConfig;
use crate::context::RequestContext;
use crate::correlation::CorrelationStore;
use crate::driver::{ExecResult, OperationKind, SqlDriver};
use crate::error::ClientError;
use crate::hook::{Instrumentation, SqlHook};
use crate::observability::families::Backend;
use crate::sampler::SamplerExit;

struct Inner<D> {
    driver: Arc<D>,
    config: SqlConfig,
    inst: Arc<Instrumentation>,
    store: Arc<CorrelationStore<()>>,
    lifecycle: Lifecycle,
}

/// Instrumented relational client. Every call runs under the client's
/// bound [`RequestContext`]; derive a bound copy with [`with_context`].
///
/// [`with_context`]: RelationalClient::with_context
pub struct RelationalClient<D> {
    inner: Arc<Inner<D>>,
    ctx: RequestContext,
}

impl<D> Clone for RelationalClient<D> {
    fn clone(&self) -> Self {
        RelationalClient {
            inner: self.inner.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<D: SqlDriver> RelationalClient<D> {
    pub fn connect(
        config: SqlConfig,
        driver: Arc<D>,
        options: ClientOptions,
    ) -> Result<(Self, CloseHandle), ClientError> {
        config.validate()?;

        let inst = options.instrumentation(Backend::Relational, &config.db_name);
        let store = options.store();

        driver.open(&config).map_err(ClientError::Connect)?;
        if let Err(e) = driver.ping() {
            let _ = driver.close();
            return Err(ClientError::Ping(e));
        }
        driver.register_callbacks(Arc::new(SqlHook::new(inst.clone(), store.clone())));

        inst.logger()
            .info(&format!("relational client connected db={}", config.db_name));

        let client = RelationalClient {
            inner: Arc::new(Inner {
                driver,
                config,
                lifecycle: Lifecycle::new(inst.clone(), &options),
                inst,
                store,
            }),
            ctx: RequestContext::background(),
        };
        let inner = client.inner.clone();
        let handle = CloseHandle::new(move || {
            let driver = inner.driver.clone();
            inner.lifecycle.close_with(move || driver.close())
        });
        Ok((client, handle))
    }

    /// A client bound to `ctx`. The receiver is left unchanged.
    pub fn with_context(&self, ctx: RequestContext) -> Self {
        RelationalClient {
            inner: self.inner.clone(),
            ctx,
        }
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    pub fn query(&self, sql: &str, args: &[Value]) -> Result<ExecResult, ClientError> {
        self.execute(OperationKind::Query, sql, args)
    }

    pub fn row_query(&self, sql: &str, args: &[Value]) -> Result<ExecResult, ClientError> {
        self.execute(OperationKind::RowQuery, sql, args)
    }

    pub fn create(&self, sql: &str, args: &[Value]) -> Result<ExecResult, ClientError> {
        self.execute(OperationKind::Create, sql, args)
    }

    pub fn update(&self, sql: &str, args: &[Value]) -> Result<ExecResult, ClientError> {
        self.execute(OperationKind::Update, sql, args)
    }

    pub fn delete(&self, sql: &str, args: &[Value]) -> Result<ExecResult, ClientError> {
        self.execute(OperationKind::Delete, sql, args)
    }

    pub fn execute(
        &self,
        kind: OperationKind,
        sql: &str,
        args: &[Value],
    ) -> Result<ExecResult, ClientError> {
        self.inner.lifecycle.ensure_open(&self.ctx)?;
        Ok(self.inner.driver.execute(&self.ctx, kind, sql, args)?)
    }

    pub fn ping(&self) -> Result<(), ClientError> {
        self.inner.lifecycle.ensure_open(&self.ctx)?;
        Ok(self.inner.driver.ping()?)
    }

    pub fn start_stats_sampler(&self) -> Option<JoinHandle<SamplerExit>> {
        self.inner.lifecycle.start_sampler(self.inner.driver.clone())
    }

    pub fn start_orphan_sweeper(&self) -> Option<JoinHandle<()>> {
        self.inner.lifecycle.start_sweeper(self.inner.store.clone())
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.inner.driver
    }

    pub fn config(&self) -> &SqlConfig {
        &self.inner.config
    }

    pub fn target(&self) -> &str {
        self.inner.inst.target()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lifecycle.is_closed()
    }
}
