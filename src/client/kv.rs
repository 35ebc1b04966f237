use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::{ClientOptions, CloseHandle, Lifecycle};
use crate::config::KvConfig;
use crate::context::RequestContext;
use crate::correlation::{CorrelationStore, RequestId};
use crate::driver::{DriverError, KvCommand, KvDriver, KvReply};
use crate::error::ClientError;
use crate::hook::{Instrumentation, KvHook};
use crate::observability::families::Backend;
use crate::sampler::SamplerExit;

struct Inner<D> {
    driver: Arc<D>,
    config: KvConfig,
    inst: Arc<Instrumentation>,
    store: Arc<CorrelationStore<()>>,
    next_id: AtomicU64,
    lifecycle: Lifecycle,
}

/// Instrumented key-value client. Issues the request id for every command
/// and pipeline it sends.
pub struct KvClient<D> {
    inner: Arc<Inner<D>>,
}

impl<D> Clone for KvClient<D> {
    fn clone(&self) -> Self {
        KvClient {
            inner: self.inner.clone(),
        }
    }
}

impl<D: KvDriver> KvClient<D> {
    pub fn connect(
        config: KvConfig,
        driver: Arc<D>,
        options: ClientOptions,
    ) -> Result<(Self, CloseHandle), ClientError> {
        config.validate()?;

        let inst = options.instrumentation(Backend::KeyValue, &config.addr);
        let store = options.store();

        driver.connect(&config).map_err(ClientError::Connect)?;
        if let Err(e) = driver.ping() {
            let _ = driver.close();
            return Err(ClientError::Ping(e));
        }
        driver.add_hook(Arc::new(KvHook::new(inst.clone(), store.clone())));

        inst.logger()
            .info(&format!("kv client connected addr={} db={}", config.addr, config.db));

        let client = KvClient {
            inner: Arc::new(Inner {
                driver,
                config,
                lifecycle: Lifecycle::new(inst.clone(), &options),
                inst,
                store,
                next_id: AtomicU64::new(1),
            }),
        };
        let inner = client.inner.clone();
        let handle = CloseHandle::new(move || {
            let driver = inner.driver.clone();
            inner.lifecycle.close_with(move || driver.close())
        });
        Ok((client, handle))
    }

    fn next_id(&self) -> RequestId {
        RequestId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn execute(&self, ctx: &RequestContext, cmd: &KvCommand) -> Result<KvReply, ClientError> {
        self.inner.lifecycle.ensure_open(ctx)?;
        Ok(self.inner.driver.process(ctx, self.next_id(), cmd)?)
    }

    pub fn get(&self, ctx: &RequestContext, key: &str) -> Result<KvReply, ClientError> {
        self.execute(ctx, &KvCommand::get(key))
    }

    pub fn set(&self, ctx: &RequestContext, key: &str, value: &str) -> Result<KvReply, ClientError> {
        self.execute(ctx, &KvCommand::set(key, value))
    }

    pub fn del(&self, ctx: &RequestContext, key: &str) -> Result<KvReply, ClientError> {
        self.execute(ctx, &KvCommand::del(key))
    }

    pub fn incr(&self, ctx: &RequestContext, key: &str) -> Result<KvReply, ClientError> {
        self.execute(ctx, &KvCommand::incr(key))
    }

    /// Send `cmds` as one pipeline. Each command keeps its own outcome.
    pub fn pipeline(
        &self,
        ctx: &RequestContext,
        cmds: &[KvCommand],
    ) -> Result<Vec<Result<KvReply, DriverError>>, ClientError> {
        self.inner.lifecycle.ensure_open(ctx)?;
        Ok(self.inner.driver.process_pipeline(ctx, self.next_id(), cmds))
    }

    pub fn ping(&self, ctx: &RequestContext) -> Result<(), ClientError> {
        self.inner.lifecycle.ensure_open(ctx)?;
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

    pub fn config(&self) -> &KvConfig {
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
