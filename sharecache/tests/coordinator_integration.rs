//! End-to-end tests: client proxies talking to a running coordinator.
//!
//! These tests exercise the full path a real client takes: request envelope
//! in, response demultiplexed by call id, deferred computations memoized in
//! the shared cache while other connections block on settlement.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use sharecache::{
    CacheError, CacheWrite, Coordinator, CoordinatorConfig, CoordinatorHandle, SharedCache,
};

fn start_coordinator() -> (CoordinatorHandle, CancellationToken) {
    let (coordinator, handle) = Coordinator::new(CoordinatorConfig::default());
    let shutdown = CancellationToken::new();
    tokio::spawn(coordinator.run(shutdown.clone()));
    (handle, shutdown)
}

/// A deferred computation the test controls: settles fulfilled when the
/// returned sender fires.
fn gated_computation() -> (oneshot::Sender<Value>, CacheWrite) {
    let (tx, rx) = oneshot::channel::<Value>();
    let write = CacheWrite::deferred(async move {
        match rx.await {
            Ok(value) => Ok(value),
            Err(_) => Err(json!("computation cancelled")),
        }
    });
    (tx, write)
}

#[tokio::test]
async fn immediate_value_round_trip() {
    let (handle, _shutdown) = start_coordinator();
    let cache = SharedCache::connect(&handle, "reports").await.unwrap();

    cache.set("x", CacheWrite::value(json!(42))).await.unwrap();

    assert!(cache.has("x").await.unwrap());
    assert_eq!(cache.get("x").await.unwrap(), json!(42));
}

#[tokio::test]
async fn absent_key_reads_as_null_immediately() {
    let (handle, _shutdown) = start_coordinator();
    let cache = SharedCache::connect(&handle, "reports").await.unwrap();

    assert!(!cache.has("missing").await.unwrap());
    assert_eq!(cache.get("missing").await.unwrap(), Value::Null);
}

#[tokio::test]
async fn connections_to_the_same_name_share_state() {
    let (handle, _shutdown) = start_coordinator();
    let writer = SharedCache::connect(&handle, "shared").await.unwrap();
    let reader = SharedCache::connect(&handle, "shared").await.unwrap();
    let other = SharedCache::connect(&handle, "other").await.unwrap();

    writer.set("x", CacheWrite::value(json!("v"))).await.unwrap();

    assert_eq!(reader.get("x").await.unwrap(), json!("v"));
    // Cache names are isolated key spaces.
    assert!(!other.has("x").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn blocked_readers_coalesce_on_one_deferred_computation() {
    let (handle, _shutdown) = start_coordinator();
    let producer = SharedCache::connect(&handle, "tiles").await.unwrap();
    let reader_a = SharedCache::connect(&handle, "tiles").await.unwrap();
    let reader_b = SharedCache::connect(&handle, "tiles").await.unwrap();

    let (settle, write) = gated_computation();
    producer.set("slow", write).await.unwrap();

    let read_a = tokio::spawn(async move { reader_a.get("slow").await });
    let read_b = tokio::spawn(async move { reader_b.get("slow").await });

    // Both readers must be suspended on the pending entry before it settles.
    while handle.metrics().waiters_registered < 2 {
        tokio::task::yield_now().await;
    }

    settle.send(json!("computed")).unwrap();

    assert_eq!(read_a.await.unwrap().unwrap(), json!("computed"));
    assert_eq!(read_b.await.unwrap().unwrap(), json!("computed"));

    let snapshot = handle.metrics();
    assert_eq!(snapshot.waiters_settled, 2);
    assert_eq!(snapshot.waiters_expired, 0);
}

#[tokio::test]
async fn memoized_rejection_propagates_its_reason() {
    let (handle, _shutdown) = start_coordinator();
    let cache = SharedCache::connect(&handle, "jobs").await.unwrap();

    cache
        .set("doomed", CacheWrite::deferred(async { Err(json!("boom")) }))
        .await
        .unwrap();

    match cache.get("doomed").await {
        Err(CacheError::Rejected(reason)) => assert_eq!(reason, json!("boom")),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn read_of_a_never_settling_entry_times_out() {
    let (handle, _shutdown) = start_coordinator();
    let cache = SharedCache::connect(&handle, "tiles").await.unwrap();

    let (_settle, write) = gated_computation();
    cache.set("stuck", write).await.unwrap();

    let result = cache
        .get_timeout("stuck", Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(CacheError::Timeout)));
    assert_eq!(handle.metrics().waiters_expired, 1);
}

#[tokio::test(start_paused = true)]
async fn settlement_after_one_reader_timed_out_reaches_the_patient_reader() {
    let (handle, _shutdown) = start_coordinator();
    let producer = SharedCache::connect(&handle, "tiles").await.unwrap();
    let hasty = SharedCache::connect(&handle, "tiles").await.unwrap();
    let patient = SharedCache::connect(&handle, "tiles").await.unwrap();

    let (settle, write) = gated_computation();
    producer.set("slow", write).await.unwrap();

    let hasty_read =
        tokio::spawn(async move { hasty.get_timeout("slow", Duration::from_millis(10)).await });
    let patient_read = tokio::spawn(async move {
        patient.get_timeout("slow", Duration::from_secs(30)).await
    });

    // The hasty reader rejects on its own deadline without disturbing the
    // other waiter on the same path.
    assert!(matches!(
        hasty_read.await.unwrap(),
        Err(CacheError::Timeout)
    ));

    settle.send(json!(7)).unwrap();
    assert_eq!(patient_read.await.unwrap().unwrap(), json!(7));
}

#[tokio::test]
async fn delete_hides_a_pending_entry_from_new_readers() {
    let (handle, _shutdown) = start_coordinator();
    let cache = SharedCache::connect(&handle, "tiles").await.unwrap();

    let (_settle, write) = gated_computation();
    cache.set("gone", write).await.unwrap();
    cache.delete("gone").await.unwrap();

    // No entry anymore, so a fresh read resolves immediately instead of
    // waiting for the in-flight computation.
    assert!(!cache.has("gone").await.unwrap());
    assert_eq!(cache.get("gone").await.unwrap(), Value::Null);
}

#[tokio::test]
async fn clear_empties_only_the_named_cache() {
    let (handle, _shutdown) = start_coordinator();
    let tiles = SharedCache::connect(&handle, "tiles").await.unwrap();
    let jobs = SharedCache::connect(&handle, "jobs").await.unwrap();

    tiles.set("a", CacheWrite::value(json!(1))).await.unwrap();
    tiles.set("b", CacheWrite::value(json!(2))).await.unwrap();
    jobs.set("a", CacheWrite::value(json!(3))).await.unwrap();

    tiles.clear().await.unwrap();

    assert!(!tiles.has("a").await.unwrap());
    assert!(!tiles.has("b").await.unwrap());
    assert_eq!(jobs.get("a").await.unwrap(), json!(3));
}

#[tokio::test]
async fn disconnect_releases_references_but_keeps_shared_stores() {
    let (handle, _shutdown) = start_coordinator();
    let leaver = SharedCache::connect(&handle, "shared").await.unwrap();
    let stayer = SharedCache::connect(&handle, "shared").await.unwrap();

    leaver.set("kept", CacheWrite::value(json!(1))).await.unwrap();
    leaver.disconnect();

    // The stayer still references "shared", so the entry survives.
    assert_eq!(stayer.get("kept").await.unwrap(), json!(1));
}

#[tokio::test]
async fn dropping_the_last_client_destroys_its_store() {
    let (handle, _shutdown) = start_coordinator();

    {
        let only = SharedCache::connect(&handle, "solo").await.unwrap();
        only.set("x", CacheWrite::value(json!(1))).await.unwrap();
        // Dropped here; Drop sends the disconnect.
    }

    let probe = SharedCache::connect(&handle, "solo").await.unwrap();
    assert!(!probe.has("x").await.unwrap());
}

#[tokio::test]
async fn operations_fail_cleanly_after_coordinator_shutdown() {
    let (handle, shutdown) = start_coordinator();
    let cache = SharedCache::connect(&handle, "tiles").await.unwrap();

    cache.set("x", CacheWrite::value(json!(1))).await.unwrap();

    shutdown.cancel();
    // Give the coordinator a moment to wind down and close its channel.
    tokio::task::yield_now().await;

    let result = cache.get("x").await;
    assert!(matches!(result, Err(CacheError::ConnectionClosed)));
}
