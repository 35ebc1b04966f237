//! Client Facades
//!
//! One client per backend. Construction validates the configuration, opens
//! the driver, checks liveness and attaches the backend's hook; the caller
//! gets the client plus a [`CloseHandle`] that can be used exactly once.
//!
//! Background tasks (stats sampler, orphan sweeper) are opt-in and stop when
//! the handle is closed.

pub mod document;
pub mod kv;
pub mod relational;
pub mod shutdown;

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::MonitorConfig;
use crate::context::RequestContext;
use crate::correlation::{CorrelationConfig, CorrelationStore, OrphanSweeper};
use crate::driver::{DriverError, PoolStatsSource};
use crate::error::ClientError;
use crate::hook::Instrumentation;
use crate::observability::families::{Backend, DEFAULT_NAMESPACE};
use crate::observability::logging::{null_logger, SharedLogger};
use crate::observability::recorder::{noop_metrics, SharedMetrics};
use crate::observability::spans::SharedTracer;
use crate::sampler::{RestartPolicy, SamplerExit, StatsSampler};

pub use document::DocumentClient;
pub use kv::KvClient;
pub use relational::RelationalClient;
pub use shutdown::Shutdown;

/// Collaborators and tuning shared by every client constructor.
#[derive(Clone)]
pub struct ClientOptions {
    logger: SharedLogger,
    tracer: Option<SharedTracer>,
    metrics: SharedMetrics,
    monitor: MonitorConfig,
    correlation: CorrelationConfig,
    restart_policy: RestartPolicy,
    namespace: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            logger: null_logger(),
            tracer: None,
            metrics: noop_metrics(),
            monitor: MonitorConfig::disabled(),
            correlation: CorrelationConfig::default(),
            restart_policy: RestartPolicy::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_tracer(mut self, tracer: SharedTracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_monitor(mut self, enabled: bool, interval: Duration) -> Self {
        self.monitor = MonitorConfig::new(enabled, interval);
        self
    }

    pub fn with_monitor_config(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_correlation(mut self, correlation: CorrelationConfig) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn monitor(&self) -> &MonitorConfig {
        &self.monitor
    }

    fn instrumentation(&self, backend: Backend, target: &str) -> Arc<Instrumentation> {
        Arc::new(Instrumentation::new(
            backend,
            target,
            &self.namespace,
            self.logger.clone(),
            self.tracer.clone(),
            self.metrics.clone(),
            self.monitor.enabled,
        ))
    }

    fn store<P>(&self) -> Arc<CorrelationStore<P>> {
        Arc::new(CorrelationStore::new(&self.correlation))
    }
}

/// Releases a client. Consumed by `close`, so it runs at most once.
#[must_use = "dropping a CloseHandle leaves the client open"]
pub struct CloseHandle {
    closer: Box<dyn FnOnce() -> Result<(), ClientError> + Send>,
}

impl CloseHandle {
    fn new(closer: impl FnOnce() -> Result<(), ClientError> + Send + 'static) -> Self {
        CloseHandle {
            closer: Box::new(closer),
        }
    }

    /// Disconnect the driver and stop background tasks. Tasks are stopped
    /// even when the disconnect fails; the failure is logged and returned.
    pub fn close(self) -> Result<(), ClientError> {
        (self.closer)()
    }
}

/// Open/closed state and background tasks of one client.
pub(crate) struct Lifecycle {
    inst: Arc<Instrumentation>,
    monitor: MonitorConfig,
    correlation: CorrelationConfig,
    restart_policy: RestartPolicy,
    shutdown: Shutdown,
    closed: AtomicBool,
    sampler: Mutex<bool>,
    sweeper: Mutex<bool>,
}

impl Lifecycle {
    fn new(inst: Arc<Instrumentation>, options: &ClientOptions) -> Self {
        Lifecycle {
            inst,
            monitor: options.monitor.clone(),
            correlation: options.correlation.clone(),
            restart_policy: options.restart_policy,
            shutdown: Shutdown::new(),
            closed: AtomicBool::new(false),
            sampler: Mutex::new(false),
            sweeper: Mutex::new(false),
        }
    }

    fn label(&self) -> &'static str {
        self.inst.backend().subsystem()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Gate every operation: closed client or cancelled request fails fast.
    pub(crate) fn ensure_open(&self, ctx: &RequestContext) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        if ctx.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        Ok(())
    }

    fn spawn<F>(&self, task: &str, fut: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(fut)),
            Err(_) => {
                self.inst.logger().warn(&format!(
                    "{} {} not started: no tokio runtime",
                    self.label(),
                    task
                ));
                None
            }
        }
    }

    /// Start the stats sampler once. No-op when the monitor is disabled or
    /// the client is closed.
    pub(crate) fn start_sampler(
        &self,
        source: Arc<dyn PoolStatsSource>,
    ) -> Option<JoinHandle<SamplerExit>> {
        if !self.monitor.enabled || self.is_closed() {
            return None;
        }
        let mut started = self.sampler.lock();
        if *started {
            return None;
        }
        let sampler = StatsSampler::new(
            source,
            self.inst.clone(),
            self.monitor.interval(),
            self.restart_policy,
        );
        let handle = self.spawn("stats sampler", sampler.run(self.shutdown.subscribe()))?;
        *started = true;
        Some(handle)
    }

    /// Start the orphan sweeper for `store` once.
    pub(crate) fn start_sweeper<P: Send + Sync + 'static>(
        &self,
        store: Arc<CorrelationStore<P>>,
    ) -> Option<JoinHandle<()>> {
        if self.is_closed() {
            return None;
        }
        let mut started = self.sweeper.lock();
        if *started {
            return None;
        }
        let sweeper = OrphanSweeper::new(
            store,
            self.correlation.sweep_interval(),
            self.inst.logger().clone(),
            self.label(),
        );
        let handle = self.spawn("orphan sweeper", sweeper.run(self.shutdown.subscribe()))?;
        *started = true;
        Some(handle)
    }

    pub(crate) fn close_with(
        &self,
        disconnect: impl FnOnce() -> Result<(), DriverError>,
    ) -> Result<(), ClientError> {
        self.closed.store(true, Ordering::SeqCst);
        let result = disconnect();
        self.shutdown.trigger();

        match result {
            Ok(()) => {
                self.inst
                    .logger()
                    .info(&format!("{} client closed", self.label()));
                Ok(())
            }
            Err(e) => {
                self.inst
                    .logger()
                    .error(&format!("{} close: {}", self.label(), e));
                Err(ClientError::Shutdown(e))
            }
        }
    }
}
