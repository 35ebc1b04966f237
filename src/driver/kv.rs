use super::{DriverError, PoolStatsSource};
use crate::config::KvConfig;
use crate::context::RequestContext;
use crate::correlation::RequestId;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvCommand {
    pub name: String,
    pub args: Vec<String>,
}

impl KvCommand {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KvCommand {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn get(key: impl Into<String>) -> Self {
        KvCommand::new("get", [key.into()])
    }

    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        KvCommand::new("set", [key.into(), value.into()])
    }

    pub fn del(key: impl Into<String>) -> Self {
        KvCommand::new("del", [key.into()])
    }

    pub fn incr(key: impl Into<String>) -> Self {
        KvCommand::new("incr", [key.into()])
    }

    pub fn ping() -> Self {
        KvCommand::new("ping", Vec::<String>::new())
    }

    /// Lowercased command name, used as the metric operation label.
    pub fn operation(&self) -> String {
        self.name.to_lowercase()
    }
}

impl fmt::Display for KvCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvReply {
    Nil,
    Status(String),
    Int(i64),
    Bulk(String),
    Array(Vec<KvReply>),
}

impl fmt::Display for KvReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvReply::Nil => f.write_str("nil"),
            KvReply::Status(s) => f.write_str(s),
            KvReply::Int(i) => write!(f, "{}", i),
            KvReply::Bulk(s) => write!(f, "{:?}", s),
            KvReply::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Before/after interception around single commands and pipelines.
/// `id` is issued by the client and is unique per call.
pub trait ProcessHook: Send + Sync + 'static {
    fn before_process(&self, ctx: &RequestContext, id: RequestId, cmd: &KvCommand);

    fn after_process(
        &self,
        ctx: &RequestContext,
        id: RequestId,
        cmd: &KvCommand,
        result: Result<&KvReply, &DriverError>,
    );

    fn before_pipeline(&self, ctx: &RequestContext, id: RequestId, cmds: &[KvCommand]);

    fn after_pipeline(
        &self,
        ctx: &RequestContext,
        id: RequestId,
        cmds: &[KvCommand],
        results: &[Result<KvReply, DriverError>],
    );
}

pub trait KvDriver: PoolStatsSource {
    fn add_hook(&self, hook: Arc<dyn ProcessHook>);

    fn connect(&self, config: &KvConfig) -> Result<(), DriverError>;

    fn ping(&self) -> Result<(), DriverError>;

    fn process(
        &self,
        ctx: &RequestContext,
        id: RequestId,
        cmd: &KvCommand,
    ) -> Result<KvReply, DriverError>;

    fn process_pipeline(
        &self,
        ctx: &RequestContext,
        id: RequestId,
        cmds: &[KvCommand],
    ) -> Vec<Result<KvReply, DriverError>>;

    fn close(&self) -> Result<(), DriverError>;
}
