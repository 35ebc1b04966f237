use crate::config::ConfigError;
use crate::driver::DriverError;
use thiserror::Error;

/// Failure to hand telemetry to a collaborator. Logged, never propagated
/// to the command's caller.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("tracer unavailable: {0}")]
    Tracer(String),

    #[error("metric {name} expects {expected} label values, got {got}")]
    LabelMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("metrics exporter: {0}")]
    Exporter(String),

    #[error("invalid metrics listen address: {0}")]
    InvalidAddress(String),

    #[error("tracing setup: {0}")]
    Setup(String),
}

/// Errors surfaced by the client facades.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("connect: {0}")]
    Connect(DriverError),

    #[error("ping: {0}")]
    Ping(DriverError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("request cancelled")]
    Cancelled,

    #[error("client is closed")]
    Closed,

    #[error("close: {0}")]
    Shutdown(DriverError),
}
