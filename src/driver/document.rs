use super::{DriverError, PoolStatsSource};
use crate::config::DocumentConfig;
use crate::context::RequestContext;
use crate::event::CommandEvent;
use serde_json::Value;
use std::sync::Arc;

/// Receives the document driver's lifecycle events.
///
/// Events for one command arrive on separate calls, possibly on different
/// threads; implementations must be cheap and must never panic.
pub trait CommandMonitor: Send + Sync + 'static {
    fn handle_event(&self, ctx: &RequestContext, event: CommandEvent);
}

pub trait DocumentDriver: PoolStatsSource {
    /// Install the command monitor. Called once, after `connect` and `ping`
    /// succeed.
    fn set_monitor(&self, monitor: Arc<dyn CommandMonitor>);

    fn connect(&self, config: &DocumentConfig) -> Result<(), DriverError>;

    fn ping(&self, ctx: &RequestContext) -> Result<(), DriverError>;

    /// Run one database command, e.g. `{"find": "users", "filter": {...}}`.
    fn run_command(
        &self,
        ctx: &RequestContext,
        database: &str,
        command: Value,
    ) -> Result<Value, DriverError>;

    fn disconnect(&self) -> Result<(), DriverError>;
}
