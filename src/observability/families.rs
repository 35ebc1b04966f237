//! Metric families registered by each backend adapter.
//!
//! Every backend gets the same three families under its own subsystem:
//! - `<ns>_<subsystem>_query_exec_total` (counter): `target`, `operation`, `result`
//! - `<ns>_<subsystem>_query_exec_duration` (histogram, ms): `target`, `operation`
//! - `<ns>_<subsystem>_db_statistics` (gauge): `target`, `stats`

use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "storehook";

const SQL_BUCKETS: &[f64] = &[1.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 10000.0, 50000.0];
const KV_BUCKETS: &[f64] = &[1.0, 10.0, 50.0, 100.0, 500.0, 1000.0];

pub const EXEC_LABELS: &[&str] = &["target", "operation", "result"];
pub const DURATION_LABELS: &[&str] = &["target", "operation"];
pub const STATS_LABELS: &[&str] = &["target", "stats"];

/// The three instrumented store kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Document,
    Relational,
    KeyValue,
}

impl Backend {
    pub fn subsystem(&self) -> &'static str {
        match self {
            Backend::Document => "document",
            Backend::Relational => "relational",
            Backend::KeyValue => "kv",
        }
    }

    /// Prefix for span names and log lines, e.g. `document: find`.
    pub fn span_prefix(&self) -> &'static str {
        match self {
            Backend::Document => "document: ",
            Backend::Relational => "relational: ",
            Backend::KeyValue => "kv: ",
        }
    }

    pub fn duration_buckets(&self) -> &'static [f64] {
        match self {
            Backend::Document | Backend::Relational => SQL_BUCKETS,
            Backend::KeyValue => KV_BUCKETS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Histogram,
    Gauge,
}

/// A pre-registered metric: name, label set and (for histograms) buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
    pub buckets: &'static [f64],
}

#[derive(Debug, Clone)]
pub struct BackendFamilies {
    pub backend: Backend,
    pub exec_total: MetricFamily,
    pub exec_duration: MetricFamily,
    pub statistics: MetricFamily,
}

impl BackendFamilies {
    pub fn new(namespace: &str, backend: Backend) -> Self {
        let prefix = format!("{}_{}", namespace, backend.subsystem());
        BackendFamilies {
            backend,
            exec_total: MetricFamily {
                name: format!("{}_query_exec_total", prefix),
                help: "total number of command executions",
                kind: MetricKind::Counter,
                labels: EXEC_LABELS,
                buckets: &[],
            },
            exec_duration: MetricFamily {
                name: format!("{}_query_exec_duration", prefix),
                help: "duration histogram of command execution in milliseconds",
                kind: MetricKind::Histogram,
                labels: DURATION_LABELS,
                buckets: backend.duration_buckets(),
            },
            statistics: MetricFamily {
                name: format!("{}_db_statistics", prefix),
                help: "connection pool statistics",
                kind: MetricKind::Gauge,
                labels: STATS_LABELS,
                buckets: &[],
            },
        }
    }

    pub fn all(&self) -> [&MetricFamily; 3] {
        [&self.exec_total, &self.exec_duration, &self.statistics]
    }
}

/// Families for every backend, for exporters that need buckets up front.
pub fn all_families(namespace: &str) -> Vec<MetricFamily> {
    [Backend::Document, Backend::Relational, Backend::KeyValue]
        .into_iter()
        .flat_map(|b| {
            let families = BackendFamilies::new(namespace, b);
            families.all().into_iter().cloned().collect::<Vec<_>>()
        })
        .collect()
}
