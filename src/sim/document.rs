use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::faults::{driver, events, FaultConfig, FaultInjector};
use crate::config::DocumentConfig;
use crate::context::RequestContext;
use crate::correlation::RequestId;
use crate::driver::{CommandMonitor, DocumentDriver, DriverError, PoolStats, PoolStatsSource};
use crate::event::{CommandEvent, CommandFailed, CommandStarted, CommandSucceeded, PoolEvent};

/// Document store kept in memory, keyed by `database.collection`.
pub struct MemoryDocumentDriver {
    monitor: RwLock<Option<Arc<dyn CommandMonitor>>>,
    collections: Mutex<HashMap<String, Vec<Value>>>,
    connected: AtomicBool,
    next_request: AtomicU64,
    max_pool_size: AtomicU64,
    open: AtomicU64,
    in_use: AtomicU64,
    faults: FaultInjector,
}

impl Default for MemoryDocumentDriver {
    fn default() -> Self {
        Self::with_faults(FaultConfig::disabled(), 0)
    }
}

impl MemoryDocumentDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(config: FaultConfig, seed: u64) -> Self {
        MemoryDocumentDriver {
            monitor: RwLock::new(None),
            collections: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(false),
            next_request: AtomicU64::new(1),
            max_pool_size: AtomicU64::new(0),
            open: AtomicU64::new(0),
            in_use: AtomicU64::new(0),
            faults: FaultInjector::new(config, seed),
        }
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Deliver a raw event to the monitor, bypassing command execution.
    pub fn emit(&self, ctx: &RequestContext, event: CommandEvent) {
        let monitor = self.monitor.read().clone();
        if let Some(monitor) = monitor {
            monitor.handle_event(ctx, event);
        }
    }

    fn pool_event(&self, event: PoolEvent) {
        self.emit(&RequestContext::background(), CommandEvent::Pool(event));
    }

    /// Run `command` under the started/succeeded/failed event protocol.
    fn instrumented(
        &self,
        ctx: &RequestContext,
        database: &str,
        command: Value,
    ) -> Result<Value, DriverError> {
        if !self.is_connected() {
            return Err(DriverError::Closed);
        }
        let command_name = command_name(&command)?;
        let request_id = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));

        self.in_use.fetch_add(1, Ordering::SeqCst);
        self.pool_event(PoolEvent::ConnectionCheckedOut);

        if !self.faults.fires(events::DROP_START) {
            self.emit(
                ctx,
                CommandEvent::Started(CommandStarted {
                    request_id,
                    command_name: command_name.clone(),
                    database: database.to_string(),
                    command: command.clone(),
                }),
            );
        }

        let result = if self.faults.fires(driver::COMMAND_FAIL) {
            Err(DriverError::Command(format!("{} failed: injected fault", command_name)))
        } else {
            self.apply(database, &command_name, &command)
        };

        let completion = match &result {
            Ok(reply) => CommandEvent::Succeeded(CommandSucceeded {
                request_id,
                command_name,
                reply: reply.clone(),
            }),
            Err(e) => CommandEvent::Failed(CommandFailed {
                request_id,
                command_name,
                failure: e.to_string(),
            }),
        };
        if self.faults.fires(events::DUPLICATE_COMPLETION) {
            self.emit(ctx, completion.clone());
        }
        self.emit(ctx, completion);

        let _ = self
            .in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
        self.pool_event(PoolEvent::ConnectionCheckedIn);
        result
    }

    fn apply(&self, database: &str, name: &str, command: &Value) -> Result<Value, DriverError> {
        let collection = |key: &str| -> Result<String, DriverError> {
            command
                .get(key)
                .and_then(Value::as_str)
                .map(|c| format!("{}.{}", database, c))
                .ok_or_else(|| DriverError::Command(format!("{} needs a collection name", key)))
        };

        match name {
            "ping" | "endSessions" => Ok(json!({ "ok": 1 })),
            "insert" => {
                let ns = collection("insert")?;
                let docs = command
                    .get("documents")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let n = docs.len();
                self.collections.lock().entry(ns).or_default().extend(docs);
                Ok(json!({ "ok": 1, "n": n }))
            }
            "find" => {
                let ns = collection("find")?;
                let filter = command.get("filter").cloned().unwrap_or(json!({}));
                let docs: Vec<Value> = self
                    .collections
                    .lock()
                    .get(&ns)
                    .map(|docs| docs.iter().filter(|d| matches(d, &filter)).cloned().collect())
                    .unwrap_or_default();
                Ok(json!({ "ok": 1, "cursor": { "firstBatch": docs } }))
            }
            "count" => {
                let ns = collection("count")?;
                let filter = command.get("query").cloned().unwrap_or(json!({}));
                let n = self
                    .collections
                    .lock()
                    .get(&ns)
                    .map(|docs| docs.iter().filter(|d| matches(d, &filter)).count())
                    .unwrap_or(0);
                Ok(json!({ "ok": 1, "n": n }))
            }
            "delete" => {
                let ns = collection("delete")?;
                let filter = command.get("filter").cloned().unwrap_or(json!({}));
                let mut collections = self.collections.lock();
                let docs = collections.entry(ns).or_default();
                let before = docs.len();
                docs.retain(|d| !matches(d, &filter));
                Ok(json!({ "ok": 1, "n": before - docs.len() }))
            }
            other => Err(DriverError::Command(format!("no such command: '{}'", other))),
        }
    }
}

/// The command name is the first key of the command document.
fn command_name(command: &Value) -> Result<String, DriverError> {
    command
        .as_object()
        .and_then(|doc| doc.keys().next())
        .cloned()
        .ok_or_else(|| DriverError::Command("command must be a non-empty document".into()))
}

/// Top-level equality match.
fn matches(doc: &Value, filter: &Value) -> bool {
    let empty = Map::new();
    let filter = filter.as_object().unwrap_or(&empty);
    filter.iter().all(|(k, v)| doc.get(k) == Some(v))
}

impl PoolStatsSource for MemoryDocumentDriver {
    fn pool_stats(&self) -> PoolStats {
        let open = self.open.load(Ordering::SeqCst);
        let in_use = self.in_use.load(Ordering::SeqCst);
        PoolStats {
            max_open: self.max_pool_size.load(Ordering::SeqCst),
            open,
            in_use,
            idle: open.saturating_sub(in_use),
            ..PoolStats::default()
        }
    }
}

impl DocumentDriver for MemoryDocumentDriver {
    fn set_monitor(&self, monitor: Arc<dyn CommandMonitor>) {
        *self.monitor.write() = Some(monitor);
    }

    fn connect(&self, config: &DocumentConfig) -> Result<(), DriverError> {
        if self.faults.fires(driver::CONNECT_FAIL) {
            return Err(DriverError::Connection(format!(
                "no reachable server in {}",
                config.hosts.join(",")
            )));
        }
        self.max_pool_size
            .store(config.max_pool_size, Ordering::SeqCst);
        let initial = config.min_pool_size.max(1);
        self.open.store(initial, Ordering::SeqCst);
        for _ in 0..initial {
            self.pool_event(PoolEvent::ConnectionCreated);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ping(&self, ctx: &RequestContext) -> Result<(), DriverError> {
        if self.faults.fires(driver::PING_FAIL) {
            return Err(DriverError::Connection("server selection timeout".into()));
        }
        self.instrumented(ctx, "admin", json!({ "ping": 1 }))
            .map(|_| ())
    }

    fn run_command(
        &self,
        ctx: &RequestContext,
        database: &str,
        command: Value,
    ) -> Result<Value, DriverError> {
        self.instrumented(ctx, database, command)
    }

    fn disconnect(&self) -> Result<(), DriverError> {
        if self.faults.fires(driver::CLOSE_FAIL) {
            return Err(DriverError::Connection("end sessions failed".into()));
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            self.instrumented_end_sessions();
        }
        Ok(())
    }
}

impl MemoryDocumentDriver {
    fn instrumented_end_sessions(&self) {
        let request_id = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
        let ctx = RequestContext::background();
        self.emit(
            &ctx,
            CommandEvent::Started(CommandStarted {
                request_id,
                command_name: "endSessions".into(),
                database: "admin".into(),
                command: json!({ "endSessions": [] }),
            }),
        );
        self.emit(
            &ctx,
            CommandEvent::Succeeded(CommandSucceeded {
                request_id,
                command_name: "endSessions".into(),
                reply: json!({ "ok": 1 }),
            }),
        );
        self.open.store(0, Ordering::SeqCst);
        self.pool_event(PoolEvent::PoolCleared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<CommandEvent>>);

    impl CommandMonitor for Collect {
        fn handle_event(&self, _ctx: &RequestContext, event: CommandEvent) {
            self.0.lock().push(event);
        }
    }

    fn connected() -> (MemoryDocumentDriver, Arc<Collect>) {
        let driver = MemoryDocumentDriver::new();
        let events = Arc::new(Collect::default());
        driver.set_monitor(events.clone());
        driver
            .connect(&DocumentConfig::new("orders", vec!["db1:27017".into()]))
            .unwrap();
        (driver, events)
    }

    #[test]
    fn test_insert_then_find() {
        let (driver, _) = connected();
        let ctx = RequestContext::background();

        driver
            .run_command(
                &ctx,
                "shop",
                json!({ "insert": "items", "documents": [{ "sku": "a" }, { "sku": "b" }] }),
            )
            .unwrap();
        let reply = driver
            .run_command(&ctx, "shop", json!({ "find": "items", "filter": { "sku": "b" } }))
            .unwrap();

        assert_eq!(reply["cursor"]["firstBatch"], json!([{ "sku": "b" }]));
    }

    #[test]
    fn test_events_bracket_each_command() {
        let (driver, events) = connected();
        events.0.lock().clear();

        driver
            .run_command(&RequestContext::background(), "shop", json!({ "count": "items" }))
            .unwrap();

        let events = events.0.lock();
        let names: Vec<&str> = events
            .iter()
            .map(|e| match e {
                CommandEvent::Started(_) => "started",
                CommandEvent::Succeeded(_) => "succeeded",
                CommandEvent::Failed(_) => "failed",
                CommandEvent::Pool(_) => "pool",
            })
            .collect();
        assert_eq!(names, vec!["pool", "started", "succeeded", "pool"]);
        assert_eq!(events[1].request_id(), events[2].request_id());
    }

    #[test]
    fn test_unknown_command_fails() {
        let (driver, events) = connected();
        let err = driver
            .run_command(&RequestContext::background(), "shop", json!({ "explode": 1 }))
            .unwrap_err();
        assert!(matches!(err, DriverError::Command(_)));
        assert!(events
            .0
            .lock()
            .iter()
            .any(|e| matches!(e, CommandEvent::Failed(_))));
    }

    #[test]
    fn test_run_after_disconnect_is_closed() {
        let (driver, _) = connected();
        driver.disconnect().unwrap();
        assert_eq!(
            driver.run_command(&RequestContext::background(), "shop", json!({ "find": "x" })),
            Err(DriverError::Closed)
        );
    }
}
