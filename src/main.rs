use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "prometheus")]
use storehook::observability::all_families;
use storehook::observability::{
    init_tracing, noop_metrics, shutdown, SharedMetrics, TracingLogger, TracingTracer,
};
use storehook::sim::{FaultConfig, MemoryDocumentDriver, MemoryKvDriver, MemorySqlDriver};
use storehook::{
    load_config, ClientOptions, DocumentClient, DocumentConfig, KvClient, KvCommand, KvConfig,
    RelationalClient, RequestContext, SqlConfig, StoreHookConfig, TraceParent,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&path)?,
        None => StoreHookConfig::default().with_monitor(storehook::MonitorConfig::new(
            true,
            Duration::from_millis(250),
        )),
    };
    init_tracing(&config.observability)?;

    let options = ClientOptions::new()
        .with_logger(Arc::new(TracingLogger::new("storehook")))
        .with_tracer(Arc::new(TracingTracer))
        .with_metrics(metrics_recorder(&config)?)
        .with_monitor_config(config.monitor.clone())
        .with_correlation(config.correlation.clone())
        .with_namespace(config.observability.metric_prefix.clone());

    let ctx = RequestContext::background().with_trace_parent(TraceParent::random());
    let faults = FaultConfig::chaos();

    let document_config = config
        .document
        .clone()
        .unwrap_or_else(|| DocumentConfig::new("demo", vec!["localhost:27017".into()]));
    let (documents, close_documents) = DocumentClient::connect(
        document_config,
        Arc::new(MemoryDocumentDriver::with_faults(faults.clone(), 1)),
        options.clone(),
    )?;

    let sql_config = config
        .relational
        .clone()
        .unwrap_or_else(|| SqlConfig::new("demo:demo@tcp(localhost:3306)/shop", "shop"));
    let (sql, close_sql) = RelationalClient::connect(
        sql_config,
        Arc::new(MemorySqlDriver::with_faults(faults.clone(), 2)),
        options.clone(),
    )?;

    let kv_config = config
        .kv
        .clone()
        .unwrap_or_else(|| KvConfig::new("localhost:6379"));
    let (kv, close_kv) = KvClient::connect(
        kv_config,
        Arc::new(MemoryKvDriver::with_faults(faults, 3)),
        options,
    )?;

    let samplers = [
        documents.start_stats_sampler(),
        sql.start_stats_sampler(),
        kv.start_stats_sampler(),
    ];
    let sweepers = [
        documents.start_orphan_sweeper(),
        sql.start_orphan_sweeper(),
        kv.start_orphan_sweeper(),
    ];

    let sql = sql.with_context(ctx.clone());
    for i in 0..50u64 {
        let sku = format!("sku-{}", i % 7);

        let _ = documents.run_command(
            &ctx,
            "shop",
            json!({ "insert": "items", "documents": [{ "sku": sku, "qty": i }] }),
        );
        let _ = documents.run_command(&ctx, "shop", json!({ "find": "items", "filter": { "sku": sku } }));

        let _ = sql.create("INSERT INTO orders (sku, qty) VALUES (?, ?)", &[json!(sku), json!(i)]);
        let _ = sql.query("SELECT sku, qty FROM orders WHERE sku = ?", &[json!(sku)]);

        let _ = kv.incr(&ctx, &format!("hits:{}", sku));
        let _ = kv.pipeline(
            &ctx,
            &[
                KvCommand::set(format!("last:{}", sku), i.to_string()),
                KvCommand::get(format!("last:{}", sku)),
            ],
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    tracing::info!(
        document = documents.in_flight(),
        relational = sql.in_flight(),
        kv = kv.in_flight(),
        "workload done, unmatched starts remaining"
    );

    let mut failures = 0;
    for close in [close_documents, close_sql, close_kv] {
        if let Err(e) = close.close() {
            tracing::error!(error = %e, "close failed");
            failures += 1;
        }
    }
    for handle in samplers.into_iter().flatten() {
        match handle.await {
            Ok(exit) => tracing::info!(?exit, "sampler finished"),
            Err(e) => tracing::warn!(error = %e, "sampler task failed"),
        }
    }
    for handle in sweepers.into_iter().flatten() {
        let _ = handle.await;
    }

    shutdown();
    if failures > 0 {
        return Err(format!("{} client(s) failed to close", failures).into());
    }
    Ok(())
}

#[cfg(feature = "prometheus")]
fn metrics_recorder(config: &StoreHookConfig) -> Result<SharedMetrics, Box<dyn std::error::Error>> {
    if !config.observability.metrics_enabled {
        return Ok(noop_metrics());
    }
    let families = all_families(&config.observability.metric_prefix);
    let metrics = storehook::observability::PrometheusMetrics::install(
        &config.observability.metrics_addr,
        &families,
    )?;
    Ok(Arc::new(metrics))
}

#[cfg(not(feature = "prometheus"))]
fn metrics_recorder(_config: &StoreHookConfig) -> Result<SharedMetrics, Box<dyn std::error::Error>> {
    Ok(noop_metrics())
}
