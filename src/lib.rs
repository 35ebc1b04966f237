pub mod client;
pub mod config;
pub mod context;
pub mod correlation;
pub mod driver;
pub mod error;
pub mod event;
pub mod hook;
pub mod observability;
pub mod sampler;
pub mod sim;

pub use client::{ClientOptions, CloseHandle, DocumentClient, KvClient, RelationalClient};
pub use config::{
    load_config, ConfigError, DocumentConfig, KvConfig, MonitorConfig, SqlConfig,
    StoreHookConfig,
};
pub use context::{RequestContext, TraceParent};
pub use correlation::{CorrelationConfig, CorrelationStore, RequestId};
pub use driver::{DriverError, KvCommand, KvReply, OperationKind, PoolStats};
pub use error::{ClientError, TelemetryError};
pub use sampler::{RestartPolicy, SamplerExit};
