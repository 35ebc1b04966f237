//! Subscriber setup with span export to the Datadog agent.
//!
//! Command spans from `OtelTracer` and `tracing` spans from `TracingTracer`
//! both end up in the batch exporter installed here.

use opentelemetry::KeyValue;
use opentelemetry_datadog::DatadogPropagator;
use opentelemetry_sdk::trace::{Config as TraceConfig, Sampler};
use opentelemetry_sdk::Resource;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use super::config::ObservabilityConfig;
use crate::error::TelemetryError;

fn resource(config: &ObservabilityConfig) -> Resource {
    Resource::new([
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", config.version.clone()),
        KeyValue::new("deployment.environment", config.env.clone()),
    ])
}

/// `RUST_LOG` wins; otherwise the store hooks log at info and the rest at warn.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,storehook=info"))
}

fn fmt_layer(json: bool) -> Box<dyn Layer<Registry> + Send + Sync> {
    if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(false).boxed()
    }
}

/// Install the global subscriber and the Datadog trace pipeline.
///
/// Fails if a subscriber is already installed or the exporter cannot be built.
pub fn init(config: &ObservabilityConfig) -> Result<(), TelemetryError> {
    if !(0.0..=1.0).contains(&config.trace_sample_rate) {
        return Err(TelemetryError::Setup(format!(
            "trace sample rate {} outside [0, 1]",
            config.trace_sample_rate
        )));
    }

    opentelemetry::global::set_text_map_propagator(DatadogPropagator::default());

    let trace_config = TraceConfig::default()
        .with_sampler(Sampler::TraceIdRatioBased(config.trace_sample_rate))
        .with_resource(resource(config));
    let tracer = opentelemetry_datadog::new_pipeline()
        .with_service_name(&config.service_name)
        .with_agent_endpoint(&config.trace_addr)
        .with_trace_config(trace_config)
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .map_err(|e| TelemetryError::Setup(format!("datadog exporter: {}", e)))?;

    // fmt before otel so a span's log line is written before export
    Registry::default()
        .with(fmt_layer(config.logs_json))
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(env_filter())
        .try_init()
        .map_err(|e| TelemetryError::Setup(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        env = %config.env,
        agent = %config.trace_addr,
        sample_rate = config.trace_sample_rate,
        "span export enabled"
    );
    Ok(())
}

/// Flush buffered spans. Call once, before the process exits.
pub fn shutdown() {
    tracing::debug!("flushing span exporter");
    opentelemetry::global::shutdown_tracer_provider();
}
