//! Subscriber setup when the `datadog` feature is off: log lines only.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use super::config::ObservabilityConfig;
use crate::error::TelemetryError;

pub fn init(config: &ObservabilityConfig) -> Result<(), TelemetryError> {
    let fmt_layer = if config.logs_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(false).boxed()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,storehook=info"));

    Registry::default()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .map_err(|e| TelemetryError::Setup(e.to_string()))?;

    tracing::info!(service = %config.service_name, "span export disabled");
    Ok(())
}

#[inline(always)]
pub fn shutdown() {}
