//! Observability configuration.
//!
//! Loaded from the `[observability]` table of the config file or from the
//! environment (`from_env`). Environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DD_SERVICE` | `storehook` | Service name |
//! | `DD_ENV` | `development` | Environment tag |
//! | `DD_VERSION` | pkg version | Service version |
//! | `DD_DOGSTATSD_URL` | `127.0.0.1:8125` | DogStatsD address |
//! | `DD_TRACE_AGENT_URL` | `http://127.0.0.1:8126` | APM agent URL |
//! | `DD_TRACE_SAMPLE_RATE` | `1.0` | Trace sampling rate |
//! | `DD_LOGS_INJECTION` | `false` | Emit JSON logs |
//! | `DD_METRIC_PREFIX` | `storehook` | Metric namespace |
//! | `DD_TAGS` | `` | Global tags (k1:v1,k2:v2) |
//! | `STOREHOOK_METRICS_ADDR` | `0.0.0.0:9191` | Prometheus listener |

use serde::{Deserialize, Serialize};
use std::env;

use super::families::DEFAULT_NAMESPACE;

pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9191";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub service_name: String,
    pub env: String,
    pub version: String,
    pub statsd_addr: String,
    pub trace_addr: String,
    pub trace_sample_rate: f64,
    /// JSON log lines instead of the human-readable format
    pub logs_json: bool,
    /// Namespace prepended to every metric family
    pub metric_prefix: String,
    pub tags: Vec<String>,
    /// Serve Prometheus metrics
    pub metrics_enabled: bool,
    pub metrics_addr: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        ObservabilityConfig {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            env: "development".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            statsd_addr: "127.0.0.1:8125".to_string(),
            trace_addr: "http://127.0.0.1:8126".to_string(),
            trace_sample_rate: 1.0,
            logs_json: false,
            metric_prefix: DEFAULT_NAMESPACE.to_string(),
            tags: Vec::new(),
            metrics_enabled: false,
            metrics_addr: DEFAULT_METRICS_ADDR.to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        ObservabilityConfig {
            service_name: env_or("DD_SERVICE", defaults.service_name),
            env: env_or("DD_ENV", defaults.env),
            version: env_or("DD_VERSION", defaults.version),
            statsd_addr: env_or("DD_DOGSTATSD_URL", defaults.statsd_addr),
            trace_addr: env_or("DD_TRACE_AGENT_URL", defaults.trace_addr),
            trace_sample_rate: env::var("DD_TRACE_SAMPLE_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.trace_sample_rate),
            logs_json: env::var("DD_LOGS_INJECTION")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.logs_json),
            metric_prefix: env_or("DD_METRIC_PREFIX", defaults.metric_prefix),
            tags: env::var("DD_TAGS")
                .map(|v| parse_tags(&v))
                .unwrap_or(defaults.tags),
            metrics_enabled: env::var("STOREHOOK_METRICS_ADDR").is_ok(),
            metrics_addr: env_or("STOREHOOK_METRICS_ADDR", defaults.metrics_addr),
        }
    }

    /// Global tags plus service/env/version, in `key:value` form.
    pub fn formatted_tags(&self) -> Vec<String> {
        let mut tags = vec![
            format!("service:{}", self.service_name),
            format!("env:{}", self.env),
            format!("version:{}", self.version),
        ];
        tags.extend(self.tags.iter().cloned());
        tags
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags_skips_blanks() {
        assert_eq!(parse_tags("team:db, ,region:eu"), vec!["team:db", "region:eu"]);
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn test_formatted_tags_include_service() {
        let config = ObservabilityConfig {
            tags: vec!["team:db".into()],
            ..ObservabilityConfig::default()
        };
        let tags = config.formatted_tags();
        assert_eq!(tags[0], "service:storehook");
        assert_eq!(tags.last().map(String::as_str), Some("team:db"));
    }
}
