//! Observability Module
//!
//! Everything the command hooks emit goes through three collaborators:
//! - [`Logger`]: log lines, context-aware variants carry the trace id
//! - [`Tracer`]: one span per completed command
//! - [`MetricsRecorder`]: execution counter, duration histogram, pool gauges
//!
//! Production implementations:
//! - `TracingLogger` / `TracingTracer` over the `tracing` macros
//! - `PrometheusMetrics` (feature `prometheus`, on by default)
//! - DogStatsD `Metrics` and `OtelTracer` (feature `datadog`)
//!
//! # Usage
//!
//! ```rust,ignore
//! use storehook::observability::{init_tracing, shutdown, ObservabilityConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::from_env();
//!     init_tracing(&config).expect("Failed to initialize tracing");
//!
//!     // build clients with TracingLogger / TracingTracer / PrometheusMetrics
//!
//!     shutdown();
//! }
//! ```

pub mod config;
pub mod emitter;
pub mod families;
pub mod logging;
pub mod recorder;
pub mod spans;

#[cfg(feature = "prometheus")]
pub mod prometheus;

#[cfg(feature = "datadog")]
pub mod metrics;
#[cfg(feature = "datadog")]
pub mod otel;

#[cfg(feature = "datadog")]
pub mod tracing_setup;

#[cfg(not(feature = "datadog"))]
#[path = "tracing_setup_noop.rs"]
pub mod tracing_setup;

pub use config::ObservabilityConfig;
pub use emitter::MetricEmitter;
pub use families::{all_families, Backend, BackendFamilies, MetricFamily, MetricKind};
pub use logging::{
    null_logger, LogLine, Logger, NullLogger, RecordingLogger, SharedLogger, TracingLogger,
};
pub use recorder::{
    noop_metrics, simulated_metrics, MetricsRecorder, NoopMetrics, RecordedMetric,
    SharedMetrics, SimulatedMetrics,
};
pub use spans::{
    ActiveSpan, FinishedSpan, NoopTracer, RecordingTracer, SharedTracer, SpanEmitter,
    SpanRecord, TagValue, Tracer, TracingTracer,
};
pub use tracing_setup::{init as init_tracing, shutdown};

#[cfg(feature = "prometheus")]
pub use prometheus::PrometheusMetrics;

#[cfg(feature = "datadog")]
pub use metrics::Metrics;
#[cfg(feature = "datadog")]
pub use otel::OtelTracer;
