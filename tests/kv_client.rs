//! Key-Value Client Tests
//!
//! The client issues a request id per command and per pipeline; the hook
//! keys its start times on that id. Covers single commands, pipelines fanned
//! out per command, admin commands and concurrent callers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use storehook::observability::{RecordingLogger, RecordingTracer, SimulatedMetrics, TagValue};
use storehook::sim::MemoryKvDriver;
use storehook::{
    ClientError, ClientOptions, CloseHandle, DriverError, KvClient, KvCommand, KvConfig, KvReply,
    RequestContext,
};

const EXEC_TOTAL: &str = "storehook_kv_query_exec_total";
const EXEC_DURATION: &str = "storehook_kv_query_exec_duration";
const TARGET: &str = "cache:6379";

struct Fixture {
    client: KvClient<MemoryKvDriver>,
    close: CloseHandle,
    tracer: Arc<RecordingTracer>,
    metrics: Arc<SimulatedMetrics>,
    logger: Arc<RecordingLogger>,
}

fn fixture() -> Fixture {
    let tracer = Arc::new(RecordingTracer::new());
    let metrics = Arc::new(SimulatedMetrics::new());
    let logger = Arc::new(RecordingLogger::new());
    let options = ClientOptions::new()
        .with_logger(logger.clone())
        .with_tracer(tracer.clone())
        .with_metrics(metrics.clone())
        .with_monitor(true, Duration::from_secs(10));
    let (client, close) = KvClient::connect(
        KvConfig::new(TARGET),
        Arc::new(MemoryKvDriver::new()),
        options,
    )
    .expect("connect");
    Fixture {
        client,
        close,
        tracer,
        metrics,
        logger,
    }
}

#[test]
fn test_single_commands() {
    let f = fixture();
    let ctx = RequestContext::background();

    assert_eq!(f.client.set(&ctx, "user:1", "ada").unwrap(), KvReply::Status("OK".into()));
    assert_eq!(f.client.get(&ctx, "user:1").unwrap(), KvReply::Bulk("ada".into()));
    assert_eq!(f.client.incr(&ctx, "visits").unwrap(), KvReply::Int(1));
    assert_eq!(f.client.del(&ctx, "user:1").unwrap(), KvReply::Int(1));

    let set = &f.tracer.by_name("kv: set")[0];
    assert_eq!(set.tag("command"), Some(&TagValue::from("set user:1 ada")));
    assert_eq!(
        f.metrics.counter_value(EXEC_TOTAL, &[TARGET, "get", "success"]),
        1.0
    );
    assert_eq!(f.metrics.observations(EXEC_DURATION, &[TARGET, "incr"]).len(), 1);
    assert!(f.logger.contains("kv: del duration_ms="));
    assert_eq!(f.client.in_flight(), 0);

    f.close.close().unwrap();
}

#[test]
fn test_pipeline_reports_each_command() {
    let f = fixture();
    let ctx = RequestContext::background();

    let results = f
        .client
        .pipeline(
            &ctx,
            &[
                KvCommand::set("n", "x"),
                KvCommand::ping(),
                KvCommand::incr("n"),
            ],
        )
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(matches!(results[2], Err(DriverError::Command(_))));

    let names: Vec<String> = f
        .tracer
        .finished()
        .into_iter()
        .map(|s| s.operation_name)
        .collect();
    assert_eq!(names, vec!["kv: pipeline: set", "kv: pipeline: incr"]);
    assert_eq!(
        f.metrics.counter_value(EXEC_TOTAL, &[TARGET, "incr", "error"]),
        1.0
    );
    assert_eq!(f.client.in_flight(), 0);

    f.close.close().unwrap();
}

#[test]
fn test_admin_commands_skipped() {
    let f = fixture();
    let ctx = RequestContext::background();

    f.client.execute(&ctx, &KvCommand::ping()).unwrap();
    f.client
        .execute(&ctx, &KvCommand::new("QUIT", Vec::<String>::new()))
        .unwrap();
    f.client
        .pipeline(&ctx, &[KvCommand::ping(), KvCommand::ping()])
        .unwrap();

    assert!(f.tracer.finished().is_empty());
    assert!(f.metrics.get_by_name(EXEC_TOTAL).is_empty());
    assert_eq!(f.client.in_flight(), 0);

    f.close.close().unwrap();
}

#[test]
fn test_unknown_command_counted_as_error() {
    let f = fixture();

    let err = f
        .client
        .execute(
            &RequestContext::background(),
            &KvCommand::new("FLUSHALL", Vec::<String>::new()),
        )
        .unwrap_err();
    assert!(matches!(err, ClientError::Driver(_)));
    assert_eq!(
        f.metrics.counter_value(EXEC_TOTAL, &[TARGET, "flushall", "error"]),
        1.0
    );
    assert!(f.logger.contains("error=command failed: ERR unknown command 'flushall'"));

    f.close.close().unwrap();
}

#[test]
fn test_concurrent_callers_get_distinct_ids() {
    let f = fixture();

    let workers: Vec<_> = (0..6)
        .map(|worker| {
            let client = f.client.clone();
            std::thread::spawn(move || {
                let ctx = RequestContext::background();
                for _ in 0..50 {
                    client.incr(&ctx, &format!("counter:{}", worker)).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let spans = f.tracer.finished();
    assert_eq!(spans.len(), 300);
    let ids: HashSet<String> = spans
        .iter()
        .filter_map(|s| s.tag("request_id").map(TagValue::to_string))
        .collect();
    assert_eq!(ids.len(), 300);
    for worker in 0..6 {
        assert_eq!(
            f.client
                .get(&RequestContext::background(), &format!("counter:{}", worker))
                .unwrap(),
            KvReply::Bulk("50".into())
        );
    }
    assert_eq!(f.client.in_flight(), 0);

    f.close.close().unwrap();
}
