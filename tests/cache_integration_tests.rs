//! Integration tests for the public cache API
//!
//! Exercises the cache end to end against real SQLite databases, both on disk
//! and in shared memory.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use sqlite_cache::{Cache, CacheConfig, CacheError, CacheMapping, JsonCodec, ManualClock};
use tempfile::TempDir;

static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

/// Installs a test-writer subscriber once; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, NEXT_DB.fetch_add(1, Ordering::SeqCst))
}

/// Creates an in-memory cache on the wall clock.
fn memory_cache() -> Cache {
    init_tracing();
    Cache::open(CacheConfig::in_memory(unique_name("it_mem"))).unwrap()
}

/// Creates an in-memory cache on a clock frozen at 2022-01-01.
fn frozen_cache() -> (Cache, ManualClock) {
    init_tracing();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap());
    let cache = Cache::open_with(
        CacheConfig::in_memory(unique_name("it_frozen")),
        JsonCodec,
        Arc::new(clock.clone()),
    )
    .unwrap();
    (cache, clock)
}

fn disk_config(dir: &TempDir) -> CacheConfig {
    CacheConfig {
        path: Some(dir.path().to_path_buf()),
        ..CacheConfig::on_disk(".cache")
    }
}

// == Construction ==

#[test]
fn test_cache_creation_connection_string() {
    init_tracing();
    let cache = Cache::open(CacheConfig::in_memory(".cache")).unwrap();
    assert_eq!(cache.connection_string(), ".cache:?mode=memory&cache=shared");
}

#[test]
fn test_on_disk_connection_string_is_file_path() {
    let dir = TempDir::new().unwrap();
    let config = disk_config(&dir);
    let cache = Cache::open(config.clone()).unwrap();

    assert_eq!(cache.connection_string(), config.filepath());
    assert!(dir.path().join(".cache").exists());
}

// == Scoped Lifetime ==

#[test]
fn test_scoped_reopen_on_disk() {
    let dir = TempDir::new().unwrap();

    let cache = Cache::open(disk_config(&dir)).unwrap();
    cache.set_item("foo", "bar").unwrap();
    cache.close().unwrap();

    let value: String = Cache::scoped(disk_config(&dir), |cache| cache.get_item("foo")).unwrap();
    assert_eq!(value, "bar");
}

#[test]
fn test_scoped_returns_error_and_releases() {
    let dir = TempDir::new().unwrap();

    let result: sqlite_cache::Result<String> =
        Cache::scoped(disk_config(&dir), |cache| cache.get_item("missing"));
    assert!(matches!(result, Err(CacheError::KeyNotFound)));

    // The file is free again for a new owner
    let cache = Cache::open(disk_config(&dir)).unwrap();
    cache.set("foo", "bar", 10).unwrap();
    assert_eq!(cache.get::<String>("foo").unwrap().as_deref(), Some("bar"));
}

#[test]
fn test_shared_memory_visible_across_handles() {
    init_tracing();
    let config = CacheConfig::in_memory(unique_name("it_shared"));
    let first = Cache::open(config.clone()).unwrap();
    let second = Cache::open(config).unwrap();

    first.set("foo", "bar", 10).unwrap();
    assert_eq!(second.get::<String>("foo").unwrap().as_deref(), Some("bar"));
}

// == Expiration on the wall clock ==

#[test]
fn test_add_same_twice_and_get_has_expired() {
    let cache = memory_cache();

    cache.add("foo", "bar", 1).unwrap();
    cache.add("foo", "baz", 1).unwrap();
    assert_eq!(cache.get::<String>("foo").unwrap().as_deref(), Some("bar"));

    sleep(Duration::from_millis(1100));

    cache.add("foo", "baz", 1).unwrap();
    assert_eq!(cache.get::<String>("foo").unwrap().as_deref(), Some("baz"));
}

#[test]
fn test_touch_extends_life() {
    let cache = memory_cache();

    cache.set("foo", "bar", 1).unwrap();
    cache.touch("foo", 3).unwrap();
    sleep(Duration::from_millis(1100));
    assert_eq!(cache.get::<String>("foo").unwrap().as_deref(), Some("bar"));
}

#[test]
fn test_ttl_within_bounds_on_wall_clock() {
    let cache = memory_cache();

    cache.set("foo", "bar", 10).unwrap();
    let ttl = cache.ttl("foo").unwrap();
    assert!(ttl > 0 && ttl <= 10, "ttl {} out of range", ttl);
}

// == Frozen-clock scenarios ==

#[test]
fn test_set_get_then_expire() {
    let (cache, clock) = frozen_cache();

    cache.set("foo", "bar", 1).unwrap();
    clock.advance(TimeDelta::milliseconds(900));
    assert_eq!(cache.get::<String>("foo").unwrap().as_deref(), Some("bar"));

    clock.advance(TimeDelta::milliseconds(100));
    assert_eq!(cache.get::<String>("foo").unwrap(), None);
    assert!(matches!(
        cache.get_item::<String>("foo"),
        Err(CacheError::KeyNotFound)
    ));
}

#[test]
fn test_value_does_not_expire() {
    let (cache, clock) = frozen_cache();

    cache.set("foo", "bar", -1).unwrap();
    clock.set(Utc.with_ymd_and_hms(9999, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(cache.get::<String>("foo").unwrap().as_deref(), Some("bar"));
    assert_eq!(cache.ttl("foo").unwrap(), -1);
}

#[test]
fn test_batch_roundtrip_with_expiry() {
    let (cache, clock) = frozen_cache();

    let mut items = HashMap::new();
    items.insert("foo".to_string(), "bar".to_string());
    items.insert("one".to_string(), "two".to_string());
    cache.set_many(&items, 2).unwrap();

    clock.advance(TimeDelta::seconds(1));
    let found: HashMap<String, String> = cache.get_many(&["foo", "one"]).unwrap();
    assert_eq!(found, items);

    let ttls = cache.ttl_many(&["foo", "one", "missing"]).unwrap();
    assert_eq!(ttls["foo"], 1);
    assert_eq!(ttls["one"], 1);
    assert_eq!(ttls["missing"], -2);

    clock.advance(TimeDelta::seconds(1));
    let found: HashMap<String, String> = cache.get_many(&["foo", "one"]).unwrap();
    assert!(found.is_empty());
}

#[test]
fn test_get_many_omits_unset_keys() {
    let (cache, _) = frozen_cache();

    cache.set("a", &42, 10).unwrap();
    let found: HashMap<String, i32> = cache.get_many(&["a", "b"]).unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found.get("a"), Some(&42));
    assert!(!found.contains_key("b"));
}

#[test]
fn test_incr_decr_scenario() {
    let (cache, _) = frozen_cache();

    cache.set("foo", &1, 10).unwrap();
    assert_eq!(cache.incr("foo", 1).unwrap(), 2);
    assert_eq!(cache.decr("foo", 1).unwrap(), 1);
    assert_eq!(cache.decr("foo", 1).unwrap(), 0);
    assert_eq!(cache.ttl("foo").unwrap(), 10);
}

#[test]
fn test_memoize_counts_calls() {
    let (cache, _) = frozen_cache();
    let calls = Cell::new(0);
    let add = cache.memoize("add", |(a, b): (i64, i64)| {
        calls.set(calls.get() + 1);
        a + b
    });

    assert_eq!(add.call((1, 2)).unwrap(), 3);
    assert_eq!(add.call((1, 3)).unwrap(), 4);
    assert_eq!(add.call((1, 2)).unwrap(), 3);
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_memoize_recomputes_after_expiry() {
    let (cache, clock) = frozen_cache();
    let calls = Cell::new(0);
    let double = cache
        .memoize("double", |x: i64| {
            calls.set(calls.get() + 1);
            x * 2
        })
        .with_timeout(5);

    double.call(21).unwrap();
    double.call(21).unwrap();
    assert_eq!(calls.get(), 1);

    clock.advance(TimeDelta::seconds(5));
    assert_eq!(double.call(21).unwrap(), 42);
    assert_eq!(calls.get(), 2);
}

// == Concurrency ==

#[test]
fn test_concurrent_incr_is_atomic() {
    let cache = memory_cache();
    cache.set("counter", &0, -1).unwrap();

    let threads = 8;
    let per_thread = 50;
    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                for _ in 0..per_thread {
                    cache.incr("counter", 1).unwrap();
                }
            });
        }
    });

    assert_eq!(cache.get::<i64>("counter").unwrap(), Some(threads * per_thread));
}

#[test]
fn test_concurrent_incr_across_shared_memory_handles() {
    init_tracing();
    let config = CacheConfig::in_memory(unique_name("it_shared_incr"));
    let first = Cache::open(config.clone()).unwrap();
    let second = Cache::open(config).unwrap();
    first.set("counter", &0, -1).unwrap();

    let per_handle = 200;
    std::thread::scope(|scope| {
        for cache in [&first, &second] {
            scope.spawn(move || {
                for _ in 0..per_handle {
                    cache.incr("counter", 1).unwrap();
                }
            });
        }
    });

    assert_eq!(first.get::<i64>("counter").unwrap(), Some(2 * per_handle));
    assert_eq!(second.get::<i64>("counter").unwrap(), Some(2 * per_handle));
}

#[test]
fn test_concurrent_add_has_single_winner() {
    let cache = memory_cache();

    let winners: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = &cache;
                scope.spawn(move || cache.add("slot", &i, 60).unwrap())
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum()
    });

    assert_eq!(winners, 1);
    assert!(cache.get::<i32>("slot").unwrap().is_some());
}
