//! Client configuration.
//!
//! One table per backend plus the shared monitor, correlation and
//! observability settings. Every struct deserializes with defaults for
//! missing fields; `validate` is the semantic check run at construction.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::correlation::CorrelationConfig;
use crate::observability::ObservabilityConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required value: {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Document store connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Application name; also the `target` metric label
    pub app: String,
    pub hosts: Vec<String>,
    pub max_conn_idle_time_ms: u64,
    pub max_pool_size: u64,
    pub min_pool_size: u64,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        DocumentConfig {
            app: String::new(),
            hosts: Vec::new(),
            max_conn_idle_time_ms: 60_000,
            max_pool_size: 100,
            min_pool_size: 0,
        }
    }
}

impl DocumentConfig {
    pub fn new(app: impl Into<String>, hosts: Vec<String>) -> Self {
        DocumentConfig {
            app: app.into(),
            hosts,
            ..Self::default()
        }
    }

    pub fn with_pool_size(mut self, min: u64, max: u64) -> Self {
        self.min_pool_size = min;
        self.max_pool_size = max;
        self
    }

    pub fn with_max_conn_idle_time(mut self, idle: Duration) -> Self {
        self.max_conn_idle_time_ms = idle.as_millis() as u64;
        self
    }

    pub fn max_conn_idle_time(&self) -> Duration {
        Duration::from_millis(self.max_conn_idle_time_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.trim().is_empty() {
            return Err(ConfigError::Missing("document.app"));
        }
        if self.hosts.is_empty() {
            return Err(ConfigError::Missing("document.hosts"));
        }
        if let Some(host) = self.hosts.iter().find(|h| h.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "document.hosts",
                format!("empty host entry {:?}", host),
            ));
        }
        if self.max_pool_size == 0 {
            return Err(ConfigError::invalid("document.max_pool_size", "must be positive"));
        }
        if self.min_pool_size > self.max_pool_size {
            return Err(ConfigError::invalid(
                "document.min_pool_size",
                format!(
                    "{} exceeds max_pool_size {}",
                    self.min_pool_size, self.max_pool_size
                ),
            ));
        }
        Ok(())
    }
}

/// Relational store connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    /// Data source name
    pub conn: String,
    /// Database name; also the `target` metric label
    pub db_name: String,
    pub max_lifetime_ms: u64,
    pub max_idle_conn: u32,
    pub max_open_conn: u32,
}

impl Default for SqlConfig {
    fn default() -> Self {
        SqlConfig {
            conn: String::new(),
            db_name: String::new(),
            max_lifetime_ms: 300_000,
            max_idle_conn: 10,
            max_open_conn: 100,
        }
    }
}

impl SqlConfig {
    pub fn new(conn: impl Into<String>, db_name: impl Into<String>) -> Self {
        SqlConfig {
            conn: conn.into(),
            db_name: db_name.into(),
            ..Self::default()
        }
    }

    pub fn with_conns(mut self, max_idle: u32, max_open: u32) -> Self {
        self.max_idle_conn = max_idle;
        self.max_open_conn = max_open;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime_ms = lifetime.as_millis() as u64;
        self
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_millis(self.max_lifetime_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conn.trim().is_empty() {
            return Err(ConfigError::Missing("relational.conn"));
        }
        if self.db_name.trim().is_empty() {
            return Err(ConfigError::Missing("relational.db_name"));
        }
        if self.max_open_conn == 0 {
            return Err(ConfigError::invalid("relational.max_open_conn", "must be positive"));
        }
        if self.max_idle_conn > self.max_open_conn {
            return Err(ConfigError::invalid(
                "relational.max_idle_conn",
                format!(
                    "{} exceeds max_open_conn {}",
                    self.max_idle_conn, self.max_open_conn
                ),
            ));
        }
        Ok(())
    }
}

/// Key-value store connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    /// `host:port`; also the `target` metric label
    pub addr: String,
    pub password: String,
    pub db: u32,
    pub max_retries: u32,
    pub dial_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub pool_size: u32,
    pub min_idle_conns: u32,
    pub idle_timeout_ms: u64,
}

impl Default for KvConfig {
    fn default() -> Self {
        KvConfig {
            addr: String::new(),
            password: String::new(),
            db: 0,
            max_retries: 3,
            dial_timeout_ms: 5_000,
            read_timeout_ms: 3_000,
            write_timeout_ms: 3_000,
            pool_size: 10,
            min_idle_conns: 0,
            idle_timeout_ms: 300_000,
        }
    }
}

impl KvConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        KvConfig {
            addr: addr.into(),
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    pub fn with_pool(mut self, min_idle: u32, size: u32) -> Self {
        self.min_idle_conns = min_idle;
        self.pool_size = size;
        self
    }

    pub fn with_timeouts(mut self, dial: Duration, read: Duration, write: Duration) -> Self {
        self.dial_timeout_ms = dial.as_millis() as u64;
        self.read_timeout_ms = read.as_millis() as u64;
        self.write_timeout_ms = write.as_millis() as u64;
        self
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addr.trim().is_empty() {
            return Err(ConfigError::Missing("kv.addr"));
        }
        if !self.addr.contains(':') {
            return Err(ConfigError::invalid(
                "kv.addr",
                format!("{:?} is not host:port", self.addr),
            ));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::invalid("kv.pool_size", "must be positive"));
        }
        if self.min_idle_conns > self.pool_size {
            return Err(ConfigError::invalid(
                "kv.min_idle_conns",
                format!("{} exceeds pool_size {}", self.min_idle_conns, self.pool_size),
            ));
        }
        Ok(())
    }
}

/// Pool statistics sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            enabled: false,
            interval_ms: 10_000,
        }
    }
}

impl MonitorConfig {
    pub fn new(enabled: bool, interval: Duration) -> Self {
        MonitorConfig {
            enabled,
            interval_ms: interval.as_millis() as u64,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.interval_ms == 0 {
            return Err(ConfigError::invalid("monitor.interval_ms", "must be positive"));
        }
        Ok(())
    }
}

/// Top-level file layout. Backend tables are optional so a process can
/// configure only the stores it uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreHookConfig {
    pub observability: ObservabilityConfig,
    pub document: Option<DocumentConfig>,
    pub relational: Option<SqlConfig>,
    pub kv: Option<KvConfig>,
    pub monitor: MonitorConfig,
    pub correlation: CorrelationConfig,
}

impl StoreHookConfig {
    pub fn with_document(mut self, config: DocumentConfig) -> Self {
        self.document = Some(config);
        self
    }

    pub fn with_relational(mut self, config: SqlConfig) -> Self {
        self.relational = Some(config);
        self
    }

    pub fn with_kv(mut self, config: KvConfig) -> Self {
        self.kv = Some(config);
        self
    }

    pub fn with_monitor(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(document) = &self.document {
            document.validate()?;
        }
        if let Some(relational) = &self.relational {
            relational.validate()?;
        }
        if let Some(kv) = &self.kv {
            kv.validate()?;
        }
        self.monitor.validate()?;
        if self.correlation.max_entries == 0 {
            return Err(ConfigError::invalid("correlation.max_entries", "must be positive"));
        }
        if self.observability.metric_prefix.trim().is_empty() {
            return Err(ConfigError::Missing("observability.metric_prefix"));
        }
        Ok(())
    }
}

/// Read, parse and validate a TOML config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<StoreHookConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let config: StoreHookConfig = toml::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_requires_app_and_hosts() {
        assert!(matches!(
            DocumentConfig::default().validate(),
            Err(ConfigError::Missing("document.app"))
        ));
        assert!(matches!(
            DocumentConfig::new("orders", vec![]).validate(),
            Err(ConfigError::Missing("document.hosts"))
        ));
        assert!(DocumentConfig::new("orders", vec!["db1:27017".into()])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_pool_bounds_ordered() {
        let config = DocumentConfig::new("orders", vec!["db1:27017".into()]).with_pool_size(20, 10);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "document.min_pool_size",
                ..
            })
        ));

        let sql = SqlConfig::new("user:pw@tcp(db:3306)/shop", "shop").with_conns(5, 0);
        assert!(matches!(
            sql.validate(),
            Err(ConfigError::Invalid {
                field: "relational.max_open_conn",
                ..
            })
        ));
    }

    #[test]
    fn test_kv_addr_needs_port() {
        assert!(matches!(
            KvConfig::new("localhost").validate(),
            Err(ConfigError::Invalid { field: "kv.addr", .. })
        ));
        assert!(KvConfig::new("localhost:6379").validate().is_ok());
    }

    #[test]
    fn test_enabled_monitor_needs_interval() {
        assert!(MonitorConfig::new(true, Duration::ZERO).validate().is_err());
        assert!(MonitorConfig::new(false, Duration::ZERO).validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let raw = r#"
            [kv]
            addr = "cache:6379"
            pool_size = 4

            [monitor]
            enabled = true
            interval_ms = 500
        "#;
        let config: StoreHookConfig = toml::from_str(raw).unwrap();
        config.validate().unwrap();

        let kv = config.kv.unwrap();
        assert_eq!(kv.addr, "cache:6379");
        assert_eq!(kv.pool_size, 4);
        assert_eq!(kv.read_timeout(), Duration::from_secs(3));
        assert!(config.document.is_none());
        assert_eq!(config.monitor.interval(), Duration::from_millis(500));
        assert_eq!(config.correlation.max_entries, 10_000);
    }
}
