use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::faults::{driver, events, FaultConfig, FaultInjector};
use crate::config::KvConfig;
use crate::context::RequestContext;
use crate::correlation::RequestId;
use crate::driver::{
    DriverError, KvCommand, KvDriver, KvReply, PoolStats, PoolStatsSource, ProcessHook,
};

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    timeouts: AtomicU64,
    stale: AtomicU64,
}

/// String key-value store kept in memory. Understands `get`, `set`, `del`,
/// `incr`, `echo`, `ping` and `quit`.
pub struct MemoryKvDriver {
    hooks: RwLock<Vec<Arc<dyn ProcessHook>>>,
    data: Mutex<HashMap<String, String>>,
    connected: AtomicBool,
    pool_size: AtomicU64,
    in_use: AtomicU64,
    counters: Counters,
    faults: FaultInjector,
}

impl Default for MemoryKvDriver {
    fn default() -> Self {
        Self::with_faults(FaultConfig::disabled(), 0)
    }
}

impl MemoryKvDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(config: FaultConfig, seed: u64) -> Self {
        MemoryKvDriver {
            hooks: RwLock::new(Vec::new()),
            data: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(false),
            pool_size: AtomicU64::new(0),
            in_use: AtomicU64::new(0),
            counters: Counters::default(),
            faults: FaultInjector::new(config, seed),
        }
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn hooks(&self) -> Vec<Arc<dyn ProcessHook>> {
        self.hooks.read().clone()
    }

    /// Take a connection from the pool, counting a hit when one was idle.
    fn checkout(&self) {
        let in_use = self.in_use.fetch_add(1, Ordering::SeqCst);
        if in_use < self.pool_size.load(Ordering::SeqCst) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn checkin(&self) {
        let _ = self
            .in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }

    fn apply(&self, cmd: &KvCommand) -> Result<KvReply, DriverError> {
        if !self.is_connected() {
            return Err(DriverError::Closed);
        }
        if self.faults.fires(driver::COMMAND_FAIL) {
            self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
            return Err(DriverError::Command("i/o timeout".into()));
        }

        let arg = |i: usize| -> Result<&str, DriverError> {
            cmd.args.get(i).map(String::as_str).ok_or_else(|| {
                DriverError::Command(format!(
                    "ERR wrong number of arguments for '{}' command",
                    cmd.operation()
                ))
            })
        };

        match cmd.operation().as_str() {
            "ping" => Ok(KvReply::Status("PONG".into())),
            "quit" => Ok(KvReply::Status("OK".into())),
            "echo" => Ok(KvReply::Bulk(arg(0)?.to_string())),
            "get" => Ok(self
                .data
                .lock()
                .get(arg(0)?)
                .map(|v| KvReply::Bulk(v.clone()))
                .unwrap_or(KvReply::Nil)),
            "set" => {
                let (key, value) = (arg(0)?, arg(1)?);
                self.data.lock().insert(key.to_string(), value.to_string());
                Ok(KvReply::Status("OK".into()))
            }
            "del" => {
                if cmd.args.is_empty() {
                    arg(0)?;
                }
                let mut data = self.data.lock();
                let removed = cmd.args.iter().filter(|k| data.remove(*k).is_some()).count();
                Ok(KvReply::Int(removed as i64))
            }
            "incr" => {
                let key = arg(0)?;
                let mut data = self.data.lock();
                let current = match data.get(key) {
                    Some(v) => v.parse::<i64>().map_err(|_| {
                        DriverError::Command(
                            "ERR value is not an integer or out of range".into(),
                        )
                    })?,
                    None => 0,
                };
                let next = current + 1;
                data.insert(key.to_string(), next.to_string());
                Ok(KvReply::Int(next))
            }
            other => Err(DriverError::Command(format!(
                "ERR unknown command '{}'",
                other
            ))),
        }
    }
}

impl PoolStatsSource for MemoryKvDriver {
    fn pool_stats(&self) -> PoolStats {
        let total = if self.is_connected() {
            self.pool_size.load(Ordering::SeqCst)
        } else {
            0
        };
        let in_use = self.in_use.load(Ordering::SeqCst);
        PoolStats {
            max_open: self.pool_size.load(Ordering::SeqCst),
            open: total.max(in_use),
            in_use,
            idle: total.saturating_sub(in_use),
            stale: self.counters.stale.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            ..PoolStats::default()
        }
    }
}

impl KvDriver for MemoryKvDriver {
    fn add_hook(&self, hook: Arc<dyn ProcessHook>) {
        self.hooks.write().push(hook);
    }

    fn connect(&self, config: &KvConfig) -> Result<(), DriverError> {
        if self.faults.fires(driver::CONNECT_FAIL) {
            return Err(DriverError::Connection(format!(
                "dial tcp {}: connection refused",
                config.addr
            )));
        }
        self.pool_size
            .store(u64::from(config.pool_size), Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ping(&self) -> Result<(), DriverError> {
        if !self.is_connected() {
            return Err(DriverError::Closed);
        }
        if self.faults.fires(driver::PING_FAIL) {
            return Err(DriverError::Connection("NOAUTH Authentication required".into()));
        }
        Ok(())
    }

    fn process(
        &self,
        ctx: &RequestContext,
        id: RequestId,
        cmd: &KvCommand,
    ) -> Result<KvReply, DriverError> {
        let hooks = self.hooks();
        if !self.faults.fires(events::DROP_START) {
            for hook in &hooks {
                hook.before_process(ctx, id, cmd);
            }
        }

        self.checkout();
        let result = self.apply(cmd);
        self.checkin();

        let repeats = if self.faults.fires(events::DUPLICATE_COMPLETION) { 2 } else { 1 };
        for _ in 0..repeats {
            for hook in &hooks {
                hook.after_process(ctx, id, cmd, result.as_ref());
            }
        }
        result
    }

    fn process_pipeline(
        &self,
        ctx: &RequestContext,
        id: RequestId,
        cmds: &[KvCommand],
    ) -> Vec<Result<KvReply, DriverError>> {
        let hooks = self.hooks();
        if !self.faults.fires(events::DROP_START) {
            for hook in &hooks {
                hook.before_pipeline(ctx, id, cmds);
            }
        }

        self.checkout();
        let results: Vec<_> = cmds.iter().map(|cmd| self.apply(cmd)).collect();
        self.checkin();

        for hook in &hooks {
            hook.after_pipeline(ctx, id, cmds, &results);
        }
        results
    }

    fn close(&self) -> Result<(), DriverError> {
        if self.faults.fires(driver::CLOSE_FAIL) {
            return Err(DriverError::Connection("close: use of closed connection".into()));
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            let idle = self.pool_size.load(Ordering::SeqCst);
            self.counters.stale.fetch_add(idle, Ordering::Relaxed);
        }
        Ok(())
    }
}
