//! DogStatsD recorder.
//!
//! Families are sent over UDP; label values are turned into `name:value`
//! tags using the label names captured at registration. If the client
//! cannot be built every call is a no-op.

use dashmap::DashMap;
use dogstatsd::{Client, Options};
use std::sync::Arc;

use super::config::ObservabilityConfig;
use super::families::MetricFamily;
use super::recorder::MetricsRecorder;

#[derive(Clone)]
pub struct Metrics {
    client: Arc<Option<Client>>,
    global_tags: Vec<String>,
    label_names: Arc<DashMap<String, &'static [&'static str]>>,
}

impl Metrics {
    pub fn new(config: &ObservabilityConfig) -> Self {
        let options = Options {
            to_addr: config.statsd_addr.clone(),
            ..Default::default()
        };
        let client = Client::new(options)
            .map_err(|e| {
                tracing::warn!(addr = %config.statsd_addr, error = %e, "statsd recorder disabled");
            })
            .ok();
        if client.is_some() {
            tracing::debug!(addr = %config.statsd_addr, "statsd recorder ready");
        }

        Metrics {
            client: Arc::new(client),
            global_tags: config.formatted_tags(),
            label_names: Arc::new(DashMap::new()),
        }
    }

    /// Label values become `name:value` tags using the registered label names.
    fn merge_tags(&self, name: &str, labels: &[&str]) -> Vec<String> {
        let names = self.label_names.get(name).map(|n| *n).unwrap_or(&[]);
        let labelled = labels.iter().enumerate().map(|(i, value)| match names.get(i) {
            Some(key) => format!("{}:{}", key, value),
            None => value.to_string(),
        });
        self.global_tags.iter().cloned().chain(labelled).collect()
    }
}

impl MetricsRecorder for Metrics {
    fn register(&self, family: &MetricFamily) {
        self.label_names.insert(family.name.clone(), family.labels);
    }

    #[inline]
    fn incr(&self, name: &str, labels: &[&str]) {
        if let Some(ref client) = *self.client {
            let _ = client.incr(name, self.merge_tags(name, labels));
        }
    }

    #[inline]
    fn histogram(&self, name: &str, value: f64, labels: &[&str]) {
        if let Some(ref client) = *self.client {
            let _ = client.histogram(name, value.to_string(), self.merge_tags(name, labels));
        }
    }

    #[inline]
    fn gauge(&self, name: &str, value: f64, labels: &[&str]) {
        if let Some(ref client) = *self.client {
            let _ = client.gauge(name, value.to_string(), self.merge_tags(name, labels));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::families::{Backend, BackendFamilies};

    #[test]
    fn test_unreachable_agent_is_silent() {
        let config = ObservabilityConfig {
            statsd_addr: "127.0.0.1:0".to_string(),
            ..ObservabilityConfig::default()
        };
        let metrics = Metrics::new(&config);

        metrics.incr("test.counter", &[]);
        metrics.gauge("test.gauge", 42.0, &[]);
        metrics.histogram("test.histogram", 1.5, &[]);
    }

    #[test]
    fn test_label_values_become_tags() {
        let metrics = Metrics::new(&ObservabilityConfig::default());
        let families = BackendFamilies::new("era", Backend::KeyValue);
        metrics.register(&families.exec_total);

        let tags = metrics.merge_tags(&families.exec_total.name, &["cache", "get", "success"]);
        assert!(tags.contains(&"target:cache".to_string()));
        assert!(tags.contains(&"operation:get".to_string()));
        assert!(tags.contains(&"result:success".to_string()));
    }
}
