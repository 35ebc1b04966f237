//! Stats Sampler
//!
//! Background task that publishes connection-pool statistics on a fixed
//! interval until the client's shutdown channel fires. A panic inside a
//! tick is caught, logged and the loop restarted per [`RestartPolicy`].

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval_at, sleep, Duration, Instant, MissedTickBehavior};

use crate::driver::PoolStatsSource;
use crate::hook::Instrumentation;

/// How a sampler recovers from a panicking tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    /// `None` restarts forever
    pub max_restarts: Option<u32>,
    /// Extra pause before each restart, on top of the one-interval wait
    pub backoff_ms: u64,
}

impl RestartPolicy {
    /// Restart forever with no backoff beyond the sampling interval.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn capped(max_restarts: u32, backoff: Duration) -> Self {
        RestartPolicy {
            max_restarts: Some(max_restarts),
            backoff_ms: backoff.as_millis() as u64,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    fn allows(&self, restarts: u32) -> bool {
        self.max_restarts.map_or(true, |max| restarts < max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerExit {
    /// Shutdown signal received
    Stopped { restarts: u32 },
    /// Restart budget exhausted
    GaveUp { restarts: u32 },
}

pub struct StatsSampler {
    source: Arc<dyn PoolStatsSource>,
    inst: Arc<Instrumentation>,
    interval: Duration,
    policy: RestartPolicy,
}

impl StatsSampler {
    pub fn new(
        source: Arc<dyn PoolStatsSource>,
        inst: Arc<Instrumentation>,
        interval: Duration,
        policy: RestartPolicy,
    ) -> Self {
        StatsSampler {
            source,
            inst,
            interval: interval.max(Duration::from_millis(1)),
            policy,
        }
    }

    fn label(&self) -> &'static str {
        self.inst.backend().subsystem()
    }

    /// Publish one pool snapshot.
    pub fn snapshot(&self) {
        let stats = self.source.pool_stats();
        if let Err(e) = self
            .inst
            .metrics()
            .record_pool_stats(self.inst.target(), &stats)
        {
            self.inst
                .logger()
                .warn(&format!("{} pool statistics not recorded: {}", self.label(), e));
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> SamplerExit {
        let logger = self.inst.logger().clone();
        logger.info(&format!("{} stats sampler start", self.label()));

        let mut restarts = 0;
        loop {
            let outcome = AssertUnwindSafe(self.sample(&mut shutdown, restarts == 0))
                .catch_unwind()
                .await;

            let panic = match outcome {
                Ok(()) => {
                    logger.info(&format!("{} stats sampler stop", self.label()));
                    return SamplerExit::Stopped { restarts };
                }
                Err(panic) => panic,
            };

            logger.error(&format!(
                "{} stats sampler panicked: {}",
                self.label(),
                panic_message(panic.as_ref())
            ));
            if !self.policy.allows(restarts) {
                logger.error(&format!(
                    "{} stats sampler giving up after {} restarts",
                    self.label(),
                    restarts
                ));
                return SamplerExit::GaveUp { restarts };
            }
            restarts += 1;

            let backoff = self.policy.backoff();
            if !backoff.is_zero() {
                tokio::select! {
                    _ = sleep(backoff) => {}
                    _ = shutdown.recv() => {
                        logger.info(&format!("{} stats sampler stop", self.label()));
                        return SamplerExit::Stopped { restarts };
                    }
                }
            }
        }
    }

    /// Tick until shutdown. Only the first start samples immediately; a
    /// restarted loop waits a full interval so a failing source cannot spin.
    async fn sample(&self, shutdown: &mut broadcast::Receiver<()>, first: bool) {
        let start = if first {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut tick = interval_at(start, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.snapshot();
                }
                _ = shutdown.recv() => {
                    return;
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::PoolStats;
    use crate::observability::families::Backend;
    use crate::observability::logging::RecordingLogger;
    use crate::observability::recorder::SimulatedMetrics;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracing::Level;

    /// Panics on its first `panics` calls, then reports a fixed pool.
    struct FlakyPool {
        calls: AtomicU32,
        panics: u32,
    }

    impl FlakyPool {
        fn new(panics: u32) -> Self {
            FlakyPool {
                calls: AtomicU32::new(0),
                panics,
            }
        }
    }

    impl PoolStatsSource for FlakyPool {
        fn pool_stats(&self) -> PoolStats {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.panics {
                panic!("pool stats unavailable");
            }
            PoolStats {
                max_open: 10,
                open: 3,
                in_use: 1,
                idle: 2,
                ..PoolStats::default()
            }
        }
    }

    fn sampler(
        pool: Arc<FlakyPool>,
        policy: RestartPolicy,
    ) -> (StatsSampler, Arc<SimulatedMetrics>, Arc<RecordingLogger>) {
        let metrics = Arc::new(SimulatedMetrics::new());
        let logger = Arc::new(RecordingLogger::new());
        let inst = Arc::new(Instrumentation::new(
            Backend::Relational,
            "shop",
            "era",
            logger.clone(),
            None,
            metrics.clone(),
            true,
        ));
        let sampler = StatsSampler::new(pool, inst, Duration::from_millis(10), policy);
        (sampler, metrics, logger)
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_on_interval_and_stops_within_tick() {
        let (sampler, metrics, _) = sampler(Arc::new(FlakyPool::new(0)), RestartPolicy::default());
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(sampler.run(rx));
        sleep(Duration::from_millis(35)).await;

        let snapshots = metrics.gauge_calls() / 11;
        assert!(snapshots >= 3, "expected at least 3 snapshots, got {}", snapshots);
        assert_eq!(
            metrics.last_gauge("era_relational_db_statistics", &["shop", "open conn"]),
            Some(3.0)
        );

        tx.send(()).unwrap();
        let exit = tokio::time::timeout(Duration::from_millis(10), handle)
            .await
            .expect("sampler stops within one tick")
            .unwrap();
        assert_eq!(exit, SamplerExit::Stopped { restarts: 0 });

        let after = metrics.gauge_calls();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(metrics.gauge_calls(), after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_after_panic() {
        let (sampler, metrics, logger) = sampler(Arc::new(FlakyPool::new(1)), RestartPolicy::unbounded());
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(sampler.run(rx));
        sleep(Duration::from_millis(25)).await;
        tx.send(()).unwrap();

        let exit = handle.await.unwrap();
        assert_eq!(exit, SamplerExit::Stopped { restarts: 1 });
        assert!(metrics.gauge_calls() >= 11);
        assert!(logger
            .lines_at(Level::ERROR)
            .iter()
            .any(|l| l.message.contains("pool stats unavailable")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capped_policy_gives_up() {
        let (sampler, metrics, _) = sampler(
            Arc::new(FlakyPool::new(u32::MAX)),
            RestartPolicy::capped(2, Duration::from_millis(5)),
        );
        let (_tx, rx) = broadcast::channel(1);

        let exit = sampler.run(rx).await;

        assert_eq!(exit, SamplerExit::GaveUp { restarts: 2 });
        assert_eq!(metrics.gauge_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_source_restarts_once_per_interval() {
        let pool = Arc::new(FlakyPool::new(u32::MAX));
        let (sampler, metrics, logger) = sampler(pool.clone(), RestartPolicy::unbounded());
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(sampler.run(rx));
        sleep(Duration::from_millis(55)).await;
        tx.send(()).unwrap();

        let exit = handle.await.unwrap();
        let calls = pool.calls.load(Ordering::SeqCst);
        // one immediate tick, then one per 10ms interval
        assert!((5..=7).contains(&calls), "pool_stats called {} times", calls);
        assert!(matches!(exit, SamplerExit::Stopped { restarts } if restarts + 1 >= calls));
        assert_eq!(metrics.gauge_calls(), 0);
        assert_eq!(logger.lines_at(Level::ERROR).len() as u32, calls);
    }

    #[test]
    fn test_policy_defaults_unbounded() {
        let policy = RestartPolicy::default();
        assert!(policy.allows(u32::MAX - 1));
        assert!(policy.backoff().is_zero());
        assert!(!RestartPolicy::capped(1, Duration::ZERO).allows(1));
    }
}
