//! Metrics Recorder Trait
//!
//! Defines the metrics collaborator the hooks and the stats sampler write to:
//! - Production: Prometheus (`metrics` facade) or DogStatsD
//! - Tests: in-memory recording for verification
//!
//! Label values are passed positionally and must match the label names of the
//! family registered under the same metric name.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::families::{MetricFamily, MetricKind};

/// Trait for recording metrics
pub trait MetricsRecorder: Send + Sync + 'static {
    /// Declare a family before first use. Backends that need label names or
    /// histogram buckets up front capture them here.
    fn register(&self, family: &MetricFamily);

    /// Increment a counter by 1
    fn incr(&self, name: &str, labels: &[&str]);

    /// Record a histogram observation
    fn histogram(&self, name: &str, value: f64, labels: &[&str]);

    /// Set a gauge value
    fn gauge(&self, name: &str, value: f64, labels: &[&str]);
}

/// No-op metrics recorder - zero overhead when metrics are disabled
#[derive(Clone, Default)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    #[inline]
    fn register(&self, _family: &MetricFamily) {}
    #[inline]
    fn incr(&self, _name: &str, _labels: &[&str]) {}
    #[inline]
    fn histogram(&self, _name: &str, _value: f64, _labels: &[&str]) {}
    #[inline]
    fn gauge(&self, _name: &str, _value: f64, _labels: &[&str]) {}
}

/// Recorded metric for testing
#[derive(Debug, Clone)]
pub struct RecordedMetric {
    pub name: String,
    pub value: f64,
    pub labels: Vec<String>,
    pub metric_type: MetricKind,
}

impl RecordedMetric {
    pub fn has_labels(&self, labels: &[&str]) -> bool {
        self.labels.len() == labels.len() && self.labels.iter().zip(labels).all(|(a, b)| a == b)
    }
}

/// Simulated metrics recorder - records all metrics for verification
#[derive(Default)]
pub struct SimulatedMetrics {
    recorded: Mutex<Vec<RecordedMetric>>,
    registered: Mutex<HashMap<String, MetricFamily>>,
    counter_calls: AtomicU64,
    histogram_calls: AtomicU64,
    gauge_calls: AtomicU64,
}

impl SimulatedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded metrics
    pub fn get_recorded(&self) -> Vec<RecordedMetric> {
        self.recorded.lock().clone()
    }

    /// Get metrics by name
    pub fn get_by_name(&self, name: &str) -> Vec<RecordedMetric> {
        self.recorded
            .lock()
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    /// Sum of counter increments for one label tuple
    pub fn counter_value(&self, name: &str, labels: &[&str]) -> f64 {
        self.recorded
            .lock()
            .iter()
            .filter(|m| {
                m.metric_type == MetricKind::Counter && m.name == name && m.has_labels(labels)
            })
            .map(|m| m.value)
            .sum()
    }

    /// Histogram observations for one label tuple, in order
    pub fn observations(&self, name: &str, labels: &[&str]) -> Vec<f64> {
        self.recorded
            .lock()
            .iter()
            .filter(|m| {
                m.metric_type == MetricKind::Histogram && m.name == name && m.has_labels(labels)
            })
            .map(|m| m.value)
            .collect()
    }

    /// Most recent gauge value for one label tuple
    pub fn last_gauge(&self, name: &str, labels: &[&str]) -> Option<f64> {
        self.recorded
            .lock()
            .iter()
            .rev()
            .find(|m| m.metric_type == MetricKind::Gauge && m.name == name && m.has_labels(labels))
            .map(|m| m.value)
    }

    pub fn registered(&self, name: &str) -> Option<MetricFamily> {
        self.registered.lock().get(name).cloned()
    }

    /// Total number of incr/histogram/gauge calls
    pub fn call_count(&self) -> u64 {
        self.counter_calls.load(Ordering::SeqCst)
            + self.histogram_calls.load(Ordering::SeqCst)
            + self.gauge_calls.load(Ordering::SeqCst)
    }

    pub fn gauge_calls(&self) -> u64 {
        self.gauge_calls.load(Ordering::SeqCst)
    }

    /// Clear all recorded metrics
    pub fn clear(&self) {
        self.recorded.lock().clear();
        self.counter_calls.store(0, Ordering::SeqCst);
        self.histogram_calls.store(0, Ordering::SeqCst);
        self.gauge_calls.store(0, Ordering::SeqCst);
    }

    /// Check a metric was recorded with the given type
    pub fn assert_metric(&self, name: &str, metric_type: MetricKind) -> bool {
        self.recorded
            .lock()
            .iter()
            .any(|m| m.name == name && m.metric_type == metric_type)
    }

    fn push(&self, name: &str, value: f64, labels: &[&str], metric_type: MetricKind) {
        self.recorded.lock().push(RecordedMetric {
            name: name.to_string(),
            value,
            labels: labels.iter().map(|s| s.to_string()).collect(),
            metric_type,
        });
    }
}

impl MetricsRecorder for SimulatedMetrics {
    fn register(&self, family: &MetricFamily) {
        self.registered
            .lock()
            .insert(family.name.clone(), family.clone());
    }

    fn incr(&self, name: &str, labels: &[&str]) {
        self.counter_calls.fetch_add(1, Ordering::SeqCst);
        self.push(name, 1.0, labels, MetricKind::Counter);
    }

    fn histogram(&self, name: &str, value: f64, labels: &[&str]) {
        self.histogram_calls.fetch_add(1, Ordering::SeqCst);
        self.push(name, value, labels, MetricKind::Histogram);
    }

    fn gauge(&self, name: &str, value: f64, labels: &[&str]) {
        self.gauge_calls.fetch_add(1, Ordering::SeqCst);
        self.push(name, value, labels, MetricKind::Gauge);
    }
}

/// Arc wrapper for trait object usage
pub type SharedMetrics = Arc<dyn MetricsRecorder>;

/// Create a no-op metrics recorder
pub fn noop_metrics() -> SharedMetrics {
    Arc::new(NoopMetrics)
}

/// Create a simulated metrics recorder for testing
pub fn simulated_metrics() -> Arc<SimulatedMetrics> {
    Arc::new(SimulatedMetrics::new())
}
