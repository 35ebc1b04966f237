use super::CorrelationStore;
use crate::observability::logging::SharedLogger;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Periodically evicts correlation entries whose completion never arrived.
pub struct OrphanSweeper<P> {
    store: Arc<CorrelationStore<P>>,
    interval: Duration,
    ttl: Duration,
    logger: SharedLogger,
    label: String,
}

impl<P: Send + Sync + 'static> OrphanSweeper<P> {
    pub fn new(
        store: Arc<CorrelationStore<P>>,
        interval: Duration,
        logger: SharedLogger,
        label: impl Into<String>,
    ) -> Self {
        let ttl = store.orphan_ttl();
        OrphanSweeper {
            store,
            interval: interval.max(Duration::from_millis(1)),
            ttl,
            logger,
            label: label.into(),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    self.logger.debug(&format!("{} orphan sweeper stop", self.label));
                    break;
                }
            }
        }
    }

    /// One sweep pass; returns how many orphans were evicted.
    pub fn sweep(&self) -> usize {
        let evicted = self.store.evict_expired(self.ttl);
        for (id, entry) in &evicted {
            self.logger.warn(&format!(
                "{} evicted orphaned request {} after {}ms",
                self.label,
                id,
                entry.age().as_millis()
            ));
        }
        evicted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{CorrelationConfig, CorrelationEntry, RequestId};
    use crate::observability::logging::RecordingLogger;
    use tracing::Level;

    #[tokio::test]
    async fn test_sweep_logs_and_evicts_orphans() {
        let store = Arc::new(CorrelationStore::new(
            &CorrelationConfig::default().with_orphan_ttl(Duration::from_millis(5)),
        ));
        store.put(RequestId(11), CorrelationEntry::new(()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.put(RequestId(12), CorrelationEntry::new(()));

        let logger = Arc::new(RecordingLogger::new());
        let sweeper = OrphanSweeper::new(
            store.clone(),
            Duration::from_millis(1),
            logger.clone(),
            "kv",
        );

        assert_eq!(sweeper.sweep(), 1);
        assert!(store.contains(RequestId(12)));

        let warnings = logger.lines_at(Level::WARN);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("orphaned request 11"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(CorrelationStore::<()>::new(&CorrelationConfig::default()));
        let (tx, rx) = broadcast::channel(1);
        let sweeper = OrphanSweeper::new(
            store,
            Duration::from_millis(10),
            Arc::new(RecordingLogger::new()),
            "document",
        );

        let handle = tokio::spawn(sweeper.run(rx));
        tokio::time::sleep(Duration::from_millis(25)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_millis(10), handle)
            .await
            .expect("sweeper exits within one tick")
            .unwrap();
    }
}
