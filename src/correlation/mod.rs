//! Correlation Store
//!
//! Matches a command's start event to its completion event by request id.
//! Drivers report these on separate callbacks, often on different threads,
//! so the store is a sharded concurrent map and every operation is atomic
//! per key.
//!
//! Entries that never see their completion event (dropped event, driver
//! crash mid-command, a `take` that raced ahead of its `put`) are orphans.
//! They are bounded two ways:
//! - a capacity cap enforced on insert (expired entries first, then oldest)
//! - a TTL sweep, see [`sweeper::OrphanSweeper`]

pub mod sweeper;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

pub use sweeper::OrphanSweeper;

/// Opaque per-command identifier, unique among in-flight commands of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId(id)
    }
}

/// Captured start of one command.
#[derive(Debug, Clone)]
pub struct CorrelationEntry<P> {
    /// Monotonic start, used for duration and orphan age. Follows tokio's
    /// clock so paused-time tests see exact durations.
    pub started_at: Instant,
    /// Wall-clock start, used as the span start time.
    pub start_time: SystemTime,
    pub payload: P,
}

impl<P> CorrelationEntry<P> {
    pub fn new(payload: P) -> Self {
        CorrelationEntry {
            started_at: Instant::now(),
            start_time: SystemTime::now(),
            payload,
        }
    }

    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Bounds for the correlation store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Maximum in-flight entries before insert starts evicting
    pub max_entries: usize,
    /// Age after which an unmatched entry is considered orphaned
    pub orphan_ttl_ms: u64,
    /// How often the background sweeper runs
    pub sweep_interval_ms: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        CorrelationConfig {
            max_entries: 10_000,
            orphan_ttl_ms: 60_000,
            sweep_interval_ms: 10_000,
        }
    }
}

impl CorrelationConfig {
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_orphan_ttl(mut self, ttl: Duration) -> Self {
        self.orphan_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn orphan_ttl(&self) -> Duration {
        Duration::from_millis(self.orphan_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// An entry removed without its completion event.
pub type Evicted<P> = (RequestId, CorrelationEntry<P>);

pub struct CorrelationStore<P> {
    entries: DashMap<RequestId, CorrelationEntry<P>>,
    max_entries: usize,
    orphan_ttl: Duration,
}

impl<P> CorrelationStore<P> {
    pub fn new(config: &CorrelationConfig) -> Self {
        CorrelationStore {
            entries: DashMap::new(),
            max_entries: config.max_entries.max(1),
            orphan_ttl: config.orphan_ttl(),
        }
    }

    /// Insert or overwrite. Returns whatever had to be evicted to stay under
    /// the capacity cap.
    pub fn put(&self, id: RequestId, entry: CorrelationEntry<P>) -> Vec<Evicted<P>> {
        let mut evicted = Vec::new();

        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&id) {
            evicted = self.evict_expired(self.orphan_ttl);
            if self.entries.len() >= self.max_entries {
                evicted.extend(self.evict_oldest());
            }
        }

        self.entries.insert(id, entry);
        evicted
    }

    /// Atomically read and remove.
    pub fn take(&self, id: RequestId) -> Option<CorrelationEntry<P>> {
        self.entries.remove(&id).map(|(_, entry)| entry)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn orphan_ttl(&self) -> Duration {
        self.orphan_ttl
    }

    /// Ids currently in flight, in no particular order.
    pub fn ids(&self) -> Vec<RequestId> {
        self.entries.iter().map(|e| *e.key()).collect()
    }

    /// Age of the longest-waiting entry.
    pub fn oldest_age(&self) -> Option<Duration> {
        self.entries.iter().map(|e| e.value().age()).max()
    }

    /// Remove every entry older than `ttl`.
    pub fn evict_expired(&self, ttl: Duration) -> Vec<Evicted<P>> {
        // Collect first: removing while iterating would deadlock on the shard lock.
        let expired: Vec<RequestId> = self
            .entries
            .iter()
            .filter(|e| e.value().age() >= ttl)
            .map(|e| *e.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.entries.remove_if(&id, |_, entry| entry.age() >= ttl))
            .collect()
    }

    /// Remove orphans using the configured TTL.
    pub fn evict_orphans(&self) -> Vec<Evicted<P>> {
        self.evict_expired(self.orphan_ttl)
    }

    fn evict_oldest(&self) -> Option<Evicted<P>> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().started_at)
            .map(|e| *e.key())?;
        self.entries.remove(&oldest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn store(max_entries: usize, ttl_ms: u64) -> CorrelationStore<&'static str> {
        CorrelationStore::new(&CorrelationConfig {
            max_entries,
            orphan_ttl_ms: ttl_ms,
            sweep_interval_ms: 1_000,
        })
    }

    #[test]
    fn test_take_removes_entry() {
        let store = store(16, 60_000);
        store.put(RequestId(1), CorrelationEntry::new("find"));

        let entry = store.take(RequestId(1)).expect("entry present");
        assert_eq!(entry.payload, "find");
        assert!(store.take(RequestId(1)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let store = store(16, 60_000);
        store.put(RequestId(3), CorrelationEntry::new("first"));
        store.put(RequestId(3), CorrelationEntry::new("second"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.take(RequestId(3)).unwrap().payload, "second");
    }

    #[test]
    fn test_take_before_put_observes_absence() {
        let store = store(16, 60_000);
        assert!(store.take(RequestId(42)).is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = store(2, 60_000);
        store.put(RequestId(1), CorrelationEntry::new("a"));
        thread::sleep(Duration::from_millis(2));
        store.put(RequestId(2), CorrelationEntry::new("b"));

        let evicted = store.put(RequestId(3), CorrelationEntry::new("c"));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, RequestId(1));
        assert_eq!(store.len(), 2);
        assert!(store.contains(RequestId(2)));
        assert!(store.contains(RequestId(3)));
    }

    #[test]
    fn test_capacity_prefers_expired() {
        let store = store(2, 5);
        store.put(RequestId(1), CorrelationEntry::new("a"));
        store.put(RequestId(2), CorrelationEntry::new("b"));
        thread::sleep(Duration::from_millis(10));

        let evicted = store.put(RequestId(3), CorrelationEntry::new("c"));

        assert_eq!(evicted.len(), 2);
        assert_eq!(store.ids(), vec![RequestId(3)]);
    }

    #[test]
    fn test_evict_expired_keeps_fresh_entries() {
        let store = store(16, 60_000);
        store.put(RequestId(1), CorrelationEntry::new("old"));
        thread::sleep(Duration::from_millis(15));
        store.put(RequestId(2), CorrelationEntry::new("new"));

        let evicted = store.evict_expired(Duration::from_millis(10));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, RequestId(1));
        assert!(store.contains(RequestId(2)));
        assert!(store.oldest_age().unwrap() < Duration::from_millis(10));
    }

    #[test]
    fn test_concurrent_put_take_no_cross_talk() {
        let store = Arc::new(CorrelationStore::<u64>::new(&CorrelationConfig::default()));
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..500u64 {
                        let id = t * 1_000 + i;
                        store.put(RequestId(id), CorrelationEntry::new(id));
                        let entry = store.take(RequestId(id)).expect("own entry");
                        assert_eq!(entry.payload, id);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(store.is_empty());
    }
}
