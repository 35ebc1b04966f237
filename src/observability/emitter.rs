//! Metric Emitter
//!
//! Thin translation from completed commands and pool snapshots into calls on
//! the metrics recorder. A disabled monitor makes every call a no-op.

use std::time::Duration;

use super::families::{BackendFamilies, MetricFamily};
use super::recorder::SharedMetrics;
use crate::driver::PoolStats;
use crate::error::TelemetryError;

pub const RESULT_SUCCESS: &str = "success";
pub const RESULT_ERROR: &str = "error";

pub struct MetricEmitter {
    recorder: SharedMetrics,
    families: BackendFamilies,
    enabled: bool,
}

impl MetricEmitter {
    /// Registers the backend's families with the recorder when enabled.
    pub fn new(recorder: SharedMetrics, families: BackendFamilies, enabled: bool) -> Self {
        if enabled {
            for family in families.all() {
                recorder.register(family);
            }
        }
        MetricEmitter {
            recorder,
            families,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn families(&self) -> &BackendFamilies {
        &self.families
    }

    /// Count one execution and observe its duration in milliseconds.
    pub fn record_command(
        &self,
        target: &str,
        operation: &str,
        success: bool,
        duration: Duration,
    ) -> Result<(), TelemetryError> {
        if !self.enabled {
            return Ok(());
        }
        let result = if success { RESULT_SUCCESS } else { RESULT_ERROR };

        let exec = [target, operation, result];
        check_labels(&self.families.exec_total, &exec)?;
        self.recorder.incr(&self.families.exec_total.name, &exec);

        let timing = [target, operation];
        check_labels(&self.families.exec_duration, &timing)?;
        self.recorder.histogram(
            &self.families.exec_duration.name,
            duration.as_secs_f64() * 1000.0,
            &timing,
        );
        Ok(())
    }

    pub fn set_statistic(&self, target: &str, stat: &str, value: f64) -> Result<(), TelemetryError> {
        if !self.enabled {
            return Ok(());
        }
        let labels = [target, stat];
        check_labels(&self.families.statistics, &labels)?;
        self.recorder
            .gauge(&self.families.statistics.name, value, &labels);
        Ok(())
    }

    /// One snapshot: a gauge per pool statistic.
    pub fn record_pool_stats(&self, target: &str, stats: &PoolStats) -> Result<(), TelemetryError> {
        for (stat, value) in stats.samples() {
            self.set_statistic(target, stat, value)?;
        }
        Ok(())
    }
}

fn check_labels(family: &MetricFamily, values: &[&str]) -> Result<(), TelemetryError> {
    if family.labels.len() != values.len() {
        return Err(TelemetryError::LabelMismatch {
            name: family.name.clone(),
            expected: family.labels.len(),
            got: values.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::families::Backend;
    use crate::observability::recorder::SimulatedMetrics;
    use std::sync::Arc;

    fn emitter(enabled: bool) -> (Arc<SimulatedMetrics>, MetricEmitter) {
        let metrics = Arc::new(SimulatedMetrics::new());
        let emitter = MetricEmitter::new(
            metrics.clone(),
            BackendFamilies::new("era", Backend::Document),
            enabled,
        );
        (metrics, emitter)
    }

    #[test]
    fn test_record_command_counts_and_observes() {
        let (metrics, emitter) = emitter(true);

        emitter
            .record_command("orders", "find", true, Duration::from_millis(12))
            .unwrap();

        assert_eq!(
            metrics.counter_value("era_document_query_exec_total", &["orders", "find", "success"]),
            1.0
        );
        let observed = metrics.observations("era_document_query_exec_duration", &["orders", "find"]);
        assert_eq!(observed.len(), 1);
        assert!((observed[0] - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_emitter_makes_no_calls() {
        let (metrics, emitter) = emitter(false);

        emitter
            .record_command("orders", "find", false, Duration::from_millis(1))
            .unwrap();
        emitter
            .record_pool_stats("orders", &PoolStats::default())
            .unwrap();

        assert_eq!(metrics.call_count(), 0);
        assert!(metrics.registered("era_document_query_exec_total").is_none());
    }

    #[test]
    fn test_pool_stats_snapshot() {
        let (metrics, emitter) = emitter(true);
        let stats = PoolStats {
            open: 4,
            idle: 3,
            in_use: 1,
            ..PoolStats::default()
        };

        emitter.record_pool_stats("orders", &stats).unwrap();

        assert_eq!(metrics.gauge_calls(), 11);
        assert_eq!(
            metrics.last_gauge("era_document_db_statistics", &["orders", "open conn"]),
            Some(4.0)
        );
        assert_eq!(
            metrics.last_gauge("era_document_db_statistics", &["orders", "in use conn"]),
            Some(1.0)
        );
    }
}
