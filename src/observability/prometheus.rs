//! Prometheus metrics via the `metrics` facade.
//!
//! `PrometheusMetrics` forwards recorder calls to the global `metrics`
//! recorder; `install` additionally sets up `metrics-exporter-prometheus`
//! with per-family histogram buckets and an HTTP scrape listener.

use dashmap::DashMap;
use metrics::Label;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;

use super::families::{MetricFamily, MetricKind};
use super::recorder::MetricsRecorder;
use crate::error::TelemetryError;

#[derive(Default)]
pub struct PrometheusMetrics {
    label_names: DashMap<String, &'static [&'static str]>,
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the global exporter and serve `/metrics` on `addr`.
    pub fn install(addr: &str, families: &[MetricFamily]) -> Result<Self, TelemetryError> {
        let addr = parse_listen_addr(addr)?;

        let mut builder = PrometheusBuilder::new().with_http_listener(addr);
        for family in families.iter().filter(|f| f.kind == MetricKind::Histogram) {
            builder = builder
                .set_buckets_for_metric(Matcher::Full(family.name.clone()), family.buckets)
                .map_err(|e| TelemetryError::Exporter(e.to_string()))?;
        }
        builder
            .install()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

        tracing::info!(address = %addr, "Prometheus exporter listening");

        let metrics = PrometheusMetrics::new();
        for family in families {
            metrics.register(family);
        }
        Ok(metrics)
    }

    fn labels(&self, name: &str, values: &[&str]) -> Vec<Label> {
        match self.label_names.get(name) {
            Some(names) => names
                .iter()
                .zip(values)
                .map(|(k, v)| Label::new(*k, v.to_string()))
                .collect(),
            None => values
                .iter()
                .enumerate()
                .map(|(i, v)| Label::new(format!("label{}", i), v.to_string()))
                .collect(),
        }
    }
}

impl MetricsRecorder for PrometheusMetrics {
    fn register(&self, family: &MetricFamily) {
        self.label_names.insert(family.name.clone(), family.labels);
        let name = family.name.clone();
        match family.kind {
            MetricKind::Counter => metrics::describe_counter!(name, family.help),
            MetricKind::Histogram => metrics::describe_histogram!(name, family.help),
            MetricKind::Gauge => metrics::describe_gauge!(name, family.help),
        }
    }

    fn incr(&self, name: &str, labels: &[&str]) {
        metrics::counter!(name.to_string(), self.labels(name, labels)).increment(1);
    }

    fn histogram(&self, name: &str, value: f64, labels: &[&str]) {
        metrics::histogram!(name.to_string(), self.labels(name, labels)).record(value);
    }

    fn gauge(&self, name: &str, value: f64, labels: &[&str]) {
        metrics::gauge!(name.to_string(), self.labels(name, labels)).set(value);
    }
}

/// The listen address must carry a port (`host:port` or `:port`).
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, TelemetryError> {
    if !addr.contains(':') {
        return Err(TelemetryError::InvalidAddress(addr.to_string()));
    }
    let normalized = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    normalized
        .parse()
        .map_err(|_| TelemetryError::InvalidAddress(addr.to_string()))
}
