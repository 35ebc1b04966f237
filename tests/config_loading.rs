//! Config File Tests
//!
//! `load_config` reads TOML, fills unset fields with defaults and rejects
//! files that fail validation.

use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

use storehook::{load_config, ConfigError};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

#[test]
fn test_full_file() {
    let file = write_config(
        r#"
[observability]
service_name = "checkout"
metric_prefix = "checkout"

[document]
app = "orders"
hosts = ["db1:27017", "db2:27017"]
max_pool_size = 50

[relational]
conn = "app:secret@tcp(db:3306)/shop"
db_name = "shop"
max_open_conn = 20
max_idle_conn = 5

[kv]
addr = "cache:6379"
db = 2
pool_size = 16

[monitor]
enabled = true
interval_ms = 5000

[correlation]
orphan_ttl_ms = 30000
"#,
    );

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.observability.metric_prefix, "checkout");
    let document = config.document.expect("document table");
    assert_eq!(document.hosts.len(), 2);
    assert_eq!(document.max_pool_size, 50);
    assert_eq!(document.min_pool_size, 0);
    assert_eq!(config.relational.expect("relational table").max_open_conn, 20);
    let kv = config.kv.expect("kv table");
    assert_eq!(kv.db, 2);
    assert_eq!(kv.read_timeout_ms, 3000);
    assert!(config.monitor.enabled);
    assert_eq!(config.monitor.interval(), Duration::from_secs(5));
    assert_eq!(config.correlation.orphan_ttl(), Duration::from_secs(30));
    assert_eq!(config.correlation.max_entries, 10_000);
}

#[test]
fn test_missing_tables_stay_unset() {
    let file = write_config("[kv]\naddr = \"cache:6379\"\n");

    let config = load_config(file.path()).unwrap();

    assert!(config.document.is_none());
    assert!(config.relational.is_none());
    assert!(!config.monitor.enabled);
}

#[test]
fn test_validation_failure() {
    let file = write_config("[relational]\nconn = \"dsn\"\n");

    let err = load_config(file.path()).unwrap_err();

    assert!(matches!(err, ConfigError::Missing("relational.db_name")));
}

#[test]
fn test_malformed_toml() {
    let file = write_config("[kv\naddr = ");

    let err = load_config(file.path()).unwrap_err();

    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_missing_file() {
    let err = load_config("/nonexistent/storehook.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
