mod support;

use std::collections::HashMap;
use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use productguard::cache::{CacheGuard, InMemoryKeyValueStore, KeyValueStore, Operation};
use support::{CountingRecords, guard_config, product, widget};

#[tokio::test(start_paused = true)]
async fn guard_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let store = InMemoryKeyValueStore::new();
    let records = CountingRecords::new();
    records.insert(widget());
    let config = guard_config();

    // miss + record read + fill, then hit
    let guard = CacheGuard::new(42, &store, &records, &config);
    guard.get().await.expect("fill");
    guard.get().await.expect("hit");

    // tombstone write, then tombstone hit
    let absent = CacheGuard::new(99, &store, &records, &config);
    assert!(absent.get().await.expect_err("absent").is_not_found());
    assert!(absent.get().await.expect_err("absent").is_not_found());

    // lock store failure forces the unprotected path
    records.insert(product(1));
    store.fail_next(Operation::CreateIfAbsent, 1);
    CacheGuard::new(1, &store, &records, &config)
        .get()
        .await
        .expect("fallback fill");

    // cache write failure after a successful record read
    records.insert(product(2));
    store.fail_next(Operation::Set, 1);
    CacheGuard::new(2, &store, &records, &config)
        .get()
        .await
        .expect("blob returned without caching");

    // contended lock: another holder's lock expires after 20ms
    records.insert(product(3));
    let contended = CacheGuard::new(3, &store, &records, &config);
    store
        .set(
            contended.lock_key().as_str(),
            "other-holder",
            Duration::from_millis(20),
        )
        .await
        .expect("hold lock");
    contended.get().await.expect("fill after waiting");

    // every unlock attempt fails
    records.insert(product(4));
    store.fail_next(Operation::Delete, config.unlock_attempts as usize);
    CacheGuard::new(4, &store, &records, &config)
        .get()
        .await
        .expect("fill with abandoned lock");

    let mut counters: HashMap<String, u64> = HashMap::new();
    let mut names = Vec::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let name = composite_key.key().name().to_string();
        if let DebugValue::Counter(count) = value {
            *counters.entry(name.clone()).or_default() += count;
        }
        names.push(name);
    }

    let expected = [
        "productguard_cache_hit_total",
        "productguard_cache_miss_total",
        "productguard_tombstone_hit_total",
        "productguard_record_read_total",
        "productguard_lock_fallback_total",
        "productguard_cache_write_failed_total",
        "productguard_lock_wait_total",
        "productguard_lock_abandoned_total",
        "productguard_fill_ms",
    ];
    for metric in expected {
        assert!(
            names.iter().any(|name| name == metric),
            "missing metric: {metric}"
        );
    }

    assert_eq!(counters["productguard_cache_hit_total"], 1);
    assert_eq!(counters["productguard_tombstone_hit_total"], 1);
    assert_eq!(counters["productguard_record_read_total"], 6);
    assert_eq!(counters["productguard_lock_fallback_total"], 1);
    assert_eq!(counters["productguard_lock_abandoned_total"], 1);
}
