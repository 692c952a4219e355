//! Scheduler cadence, overrun skipping, and graceful drain.

use serde_json::json;
use statpoll::application::collector::Collector;
use statpoll::application::scheduler::Scheduler;
use statpoll::domain::filter::EntityFilter;
use statpoll::domain::types::{AttributeMap, EngineEndpoint, MetricCategory};
use statpoll::infrastructure::mock::{MockConnector, MockEngine};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

fn collector_for(engine: &Arc<MockEngine>, name: &str, dir: &TempDir) -> Collector {
    let endpoint = EngineEndpoint::remote(name, "host1", 5555, None);
    let filter = Arc::new(EntityFilter::new(true, &HashMap::new()).unwrap());
    let connector = Arc::new(MockConnector::new(engine.clone()));
    Collector::new(
        endpoint,
        vec![MetricCategory::EntityCache],
        filter,
        connector,
        Some(dir.path().to_path_buf()),
    )
}

fn engine_with_cache_entity() -> Arc<MockEngine> {
    let engine = MockEngine::new();
    let mut attrs = AttributeMap::new();
    attrs.insert("ClassName".to_string(), json!("Order"));
    attrs.insert("CacheSize".to_string(), json!(5));
    engine.add_entity(
        MetricCategory::EntityCache,
        "com.tibco.be:service=Cache,name=Order",
        attrs,
    );
    engine
}

fn cache_report(dir: &Path) -> String {
    let entry = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name().to_string_lossy().contains("EntityCache"))
        .expect("cache report should exist");
    fs::read_to_string(entry.path()).unwrap()
}

#[tokio::test]
async fn test_overrunning_cycles_are_skipped() {
    let engine = engine_with_cache_entity();
    // One cycle outlives several polling intervals.
    engine.set_query_delay(Duration::from_millis(400));

    let dir = TempDir::new().unwrap();
    let scheduler = Scheduler::new(
        vec![collector_for(&engine, "BE", &dir)],
        Duration::from_millis(100),
    )
    .with_drain_grace(Duration::from_secs(5));

    scheduler
        .run(sleep(Duration::from_millis(250)))
        .await
        .unwrap();

    // Ticks fired at 0/100/200ms, but only the first started a cycle; the
    // later ones found it still running and skipped.
    assert_eq!(engine.query_count(), 1);
}

#[tokio::test]
async fn test_engines_share_one_tick_timestamp() {
    let engine_a = engine_with_cache_entity();
    let engine_b = engine_with_cache_entity();
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    // A long interval so only the immediate first tick fires.
    let scheduler = Scheduler::new(
        vec![
            collector_for(&engine_a, "BE-a", &dir_a),
            collector_for(&engine_b, "BE-b", &dir_b),
        ],
        Duration::from_secs(60),
    );
    scheduler
        .run(sleep(Duration::from_millis(200)))
        .await
        .unwrap();

    let row_timestamp = |dir: &TempDir| {
        let content = cache_report(dir.path());
        let row = content.lines().nth(1).unwrap().to_string();
        row.split(',').nth(1).unwrap().to_string()
    };
    assert_eq!(row_timestamp(&dir_a), row_timestamp(&dir_b));
}

#[tokio::test]
async fn test_drain_waits_for_in_flight_cycle() {
    let engine = engine_with_cache_entity();
    engine.set_query_delay(Duration::from_millis(200));

    let dir = TempDir::new().unwrap();
    let scheduler = Scheduler::new(
        vec![collector_for(&engine, "BE", &dir)],
        Duration::from_secs(60),
    )
    .with_drain_grace(Duration::from_secs(5));

    // Shutdown arrives while the first cycle is mid-flight; the drain
    // grace lets it finish and the report reaches disk.
    scheduler
        .run(sleep(Duration::from_millis(50)))
        .await
        .unwrap();

    let content = cache_report(dir.path());
    assert!(content.lines().any(|l| l.starts_with("Order,")));
}

#[tokio::test]
async fn test_stuck_cycle_is_cancelled_after_grace() {
    let engine = engine_with_cache_entity();
    engine.set_query_delay(Duration::from_secs(30));

    let dir = TempDir::new().unwrap();
    let scheduler = Scheduler::new(
        vec![collector_for(&engine, "BE", &dir)],
        Duration::from_secs(60),
    )
    .with_drain_grace(Duration::from_millis(100));

    // The cycle never finishes on its own; the second grace period covers
    // the forced cancellation and shutdown still completes cleanly.
    scheduler
        .run(sleep(Duration::from_millis(50)))
        .await
        .unwrap();

    // The cancelled cycle produced no rows.
    assert!(
        fs::read_dir(dir.path()).unwrap().next().is_none(),
        "cancelled cycle should not have written a report"
    );
}
