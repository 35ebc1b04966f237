use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::{ClientOptions, CloseHandle, Lifecycle};
use crate::config::DocumentConfig;
use crate::context::RequestContext;
use crate::correlation::CorrelationStore;
use crate::driver::DocumentDriver;
use crate::error::ClientError;
use crate::hook::document::{DocumentHook, StartedCommand};
use crate::hook::Instrumentation;
use crate::observability::families::Backend;
use crate::sampler::SamplerExit;

struct Inner<D> {
    driver: Arc<D>,
    config: DocumentConfig,
    inst: Arc<Instrumentation>,
    store: Arc<CorrelationStore<StartedCommand>>,
    lifecycle: Lifecycle,
}

/// Instrumented document-store client.
pub struct DocumentClient<D> {
    inner: Arc<Inner<D>>,
}

impl<D> Clone for DocumentClient<D> {
    fn clone(&self) -> Self {
        DocumentClient {
            inner: self.inner.clone(),
        }
    }
}

impl<D: DocumentDriver> DocumentClient<D> {
    pub fn connect(
        config: DocumentConfig,
        driver: Arc<D>,
        options: ClientOptions,
    ) -> Result<(Self, CloseHandle), ClientError> {
        config.validate()?;

        let inst = options.instrumentation(Backend::Document, &config.app);
        let store = options.store();

        driver.connect(&config).map_err(ClientError::Connect)?;
        if let Err(e) = driver.ping(&RequestContext::background()) {
            let _ = driver.disconnect();
            return Err(ClientError::Ping(e));
        }
        let hook = DocumentHook::new(inst.clone(), store.clone()).with_pool(&driver.pool_stats());
        driver.set_monitor(Arc::new(hook));

        inst.logger().info(&format!(
            "document client connected app={} hosts={}",
            config.app,
            config.hosts.join(",")
        ));

        let client = DocumentClient {
            inner: Arc::new(Inner {
                driver,
                config,
                lifecycle: Lifecycle::new(inst.clone(), &options),
                inst,
                store,
            }),
        };
        let inner = client.inner.clone();
        let handle = CloseHandle::new(move || {
            let driver = inner.driver.clone();
            inner.lifecycle.close_with(move || driver.disconnect())
        });
        Ok((client, handle))
    }

    pub fn run_command(
        &self,
        ctx: &RequestContext,
        database: &str,
        command: Value,
    ) -> Result<Value, ClientError> {
        self.inner.lifecycle.ensure_open(ctx)?;
        Ok(self.inner.driver.run_command(ctx, database, command)?)
    }

    pub fn ping(&self, ctx: &RequestContext) -> Result<(), ClientError> {
        self.inner.lifecycle.ensure_open(ctx)?;
        Ok(self.inner.driver.ping(ctx)?)
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

    pub fn config(&self) -> &DocumentConfig {
        &self.inner.config
    }

    pub fn target(&self) -> &str {
        self.inner.inst.target()
    }

    /// Commands started but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lifecycle.is_closed()
    }
}
