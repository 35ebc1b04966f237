//! Driver extension points.
//!
//! The database drivers are external collaborators. Each backend is reached
//! through a trait describing the driver's native instrumentation seam:
//! - document store: started/succeeded/failed events plus pool events,
//!   pushed into a [`document::CommandMonitor`]
//! - relational store: before/after callbacks around each call scope,
//!   see [`relational::ScopeCallbacks`]
//! - key-value store: before/after process hooks, see [`kv::ProcessHook`]

pub mod document;
pub mod kv;
pub mod relational;

use std::time::Duration;
use thiserror::Error;

pub use document::{CommandMonitor, DocumentDriver};
pub use kv::{KvCommand, KvDriver, KvReply, ProcessHook};
pub use relational::{CallScope, ExecResult, OperationKind, ScopeCallbacks, SqlDriver};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("connection: {0}")]
    Connection(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("driver closed")]
    Closed,
}

/// Point-in-time pool statistics. Drivers fill the fields they track and
/// leave the rest at zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    pub max_open: u64,
    pub open: u64,
    pub in_use: u64,
    pub idle: u64,
    pub wait_count: u64,
    pub wait_duration: Duration,
    pub stale: u64,
    pub hits: u64,
    pub misses: u64,
    pub timeouts: u64,
    pub max_lifetime_closed: u64,
}

impl PoolStats {
    /// Gauge samples as `(stats label, value)`.
    pub fn samples(&self) -> [(&'static str, f64); 11] {
        [
            ("max open conn", self.max_open as f64),
            ("open conn", self.open as f64),
            ("in use conn", self.in_use as f64),
            ("idle conn", self.idle as f64),
            ("wait count", self.wait_count as f64),
            ("wait duration", self.wait_duration.as_secs_f64() * 1000.0),
            ("stale conn", self.stale as f64),
            ("hits", self.hits as f64),
            ("misses", self.misses as f64),
            ("timeouts", self.timeouts as f64),
            ("max lifetime closed", self.max_lifetime_closed as f64),
        ]
    }
}

pub trait PoolStatsSource: Send + Sync + 'static {
    fn pool_stats(&self) -> PoolStats;
}
