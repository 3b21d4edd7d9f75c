mod common;

use common::MockSource;
use futures::future::join_all;
use meshstream::cache::{CacheConfig, EvictionMode, TimestepCache};
use meshstream::errors::StreamError;
use meshstream::source::{RawMeshDecoder, TimestepSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn config(capacity: usize, radius: usize) -> CacheConfig {
    CacheConfig { capacity, prefetch_radius: radius, ..CacheConfig::default() }
}

fn cache_with(
    cfg: CacheConfig,
    total: usize,
    source: &Arc<MockSource>,
) -> TimestepCache<RawMeshDecoder> {
    let dyn_source: Arc<dyn TimestepSource> = source.clone();
    TimestepCache::new(cfg, total, dyn_source, RawMeshDecoder).unwrap()
}

#[tokio::test]
async fn test_hit_returns_same_payload_without_refetch() {
    let source = Arc::new(MockSource::new());
    let cache = cache_with(config(4, 0), 10, &source);

    let first = cache.get(1).await.unwrap();
    let second = cache.get(1).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.bytes, common::payload(1));
    assert_eq!(source.fetch_count(1), 1);
    let m = cache.metrics_snapshot();
    assert_eq!((m.hits, m.misses, m.fetches), (1, 1, 1));
}

#[tokio::test]
async fn test_fifo_evicts_earliest_inserted() {
    let source = Arc::new(MockSource::new());
    let cache = cache_with(config(3, 0), 10, &source);

    for i in 0..3 {
        cache.get(i).await.unwrap();
    }
    // A read does not protect timestep 0 under FIFO.
    cache.get(0).await.unwrap();
    cache.get(3).await.unwrap();

    assert!(!cache.contains(0));
    assert_eq!(cache.cached_indices(), vec![1, 2, 3]);
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.metrics_snapshot().evictions, 1);

    cache.get(0).await.unwrap();
    assert_eq!(source.fetch_count(0), 2);
}

#[tokio::test]
async fn test_lru_mode_keeps_recently_read() {
    let source = Arc::new(MockSource::new());
    let cfg = CacheConfig { eviction_mode: EvictionMode::Lru, ..config(3, 0) };
    let cache = cache_with(cfg, 10, &source);

    for i in 0..3 {
        cache.get(i).await.unwrap();
    }
    cache.get(0).await.unwrap();
    cache.get(3).await.unwrap();

    assert!(cache.contains(0));
    assert!(!cache.contains(1));
}

#[tokio::test]
async fn test_prefetch_fills_radius() {
    let source = Arc::new(MockSource::new());
    let cache = cache_with(config(10, 3), 20, &source);

    cache.get(0).await.unwrap();
    cache.wait_for_prefetch().await;

    for i in 1..=3 {
        assert!(cache.contains(i), "timestep {i} should be prefetched");
    }
    assert!(!cache.contains(4));
    assert_eq!(cache.metrics_snapshot().prefetch_scheduled, 3);

    cache.get(1).await.unwrap();
    assert_eq!(source.fetch_count(1), 1);
}

#[tokio::test]
async fn test_prefetch_stops_at_dataset_end() {
    let source = Arc::new(MockSource::new());
    let cache = cache_with(config(10, 5), 7, &source);

    cache.get(5).await.unwrap();
    cache.wait_for_prefetch().await;

    assert!(cache.contains(6));
    assert_eq!(source.total_fetches(), 2);
    assert_eq!(source.fetch_count(7), 0);
}

#[tokio::test]
async fn test_prefetch_skips_cached_indices() {
    let source = Arc::new(MockSource::new());
    let cache = cache_with(config(10, 2), 10, &source);

    cache.get(0).await.unwrap();
    cache.wait_for_prefetch().await;
    cache.get(1).await.unwrap();
    cache.wait_for_prefetch().await;

    assert_eq!(cache.prefetch(1, 2), 0);
    assert_eq!(source.fetch_count(2), 1);
    assert_eq!(source.fetch_count(3), 1);
}

#[tokio::test]
async fn test_size_stays_bounded_under_prefetch() {
    let source = Arc::new(MockSource::new());
    let cache = cache_with(config(3, 5), 50, &source);

    for i in [0, 10, 20] {
        cache.get(i).await.unwrap();
        cache.wait_for_prefetch().await;
        assert!(cache.len() <= 3);
    }
}

#[tokio::test]
async fn test_failed_fetch_is_not_cached_and_is_retried() {
    let source = Arc::new(MockSource::new());
    source.fail_once(2);
    let cache = cache_with(config(4, 0), 10, &source);

    let err = cache.get(2).await.unwrap_err();
    assert!(matches!(err, StreamError::Transport(_)));
    assert!(err.is_transient());
    assert!(!cache.contains(2));

    let mesh = cache.get(2).await.unwrap();
    assert_eq!(mesh.index, 2);
    assert_eq!(source.fetch_count(2), 2);
    assert_eq!(cache.metrics_snapshot().fetch_failures, 1);
}

#[tokio::test]
async fn test_concurrent_gets_share_one_fetch() {
    let source = Arc::new(MockSource::with_delay(50));
    let cache = cache_with(config(4, 0), 10, &source);

    let results = join_all((0..8).map(|_| cache.get(3))).await;
    let meshes: Vec<_> = results.into_iter().map(Result::unwrap).collect();

    assert_eq!(source.fetch_count(3), 1);
    assert!(meshes.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(cache.metrics_snapshot().deduplicated, 7);
}

#[tokio::test]
async fn test_get_racing_prefetch_fetches_once() {
    let source = Arc::new(MockSource::with_delay(30));
    let cache = cache_with(config(10, 2), 10, &source);

    cache.get(0).await.unwrap();
    // Timestep 1 is being prefetched right now.
    let mesh = cache.get(1).await.unwrap();
    cache.wait_for_prefetch().await;

    assert_eq!(mesh.index, 1);
    assert_eq!(source.fetch_count(1), 1);
}

#[tokio::test]
async fn test_prefetch_failure_does_not_stop_siblings() {
    let source = Arc::new(MockSource::new());
    source.fail_always(2);
    let cache = cache_with(config(10, 3), 10, &source);

    cache.get(0).await.unwrap();
    cache.wait_for_prefetch().await;

    assert!(cache.contains(1));
    assert!(!cache.contains(2));
    assert!(cache.contains(3));
    assert_eq!(cache.metrics_snapshot().prefetch_failures, 1);
    assert!(cache.get(2).await.is_err());
}

#[tokio::test]
async fn test_out_of_bounds_is_never_fetched() {
    let source = Arc::new(MockSource::new());
    let cache = cache_with(config(4, 2), 5, &source);

    let err = cache.get(5).await.unwrap_err();
    assert!(matches!(err, StreamError::OutOfBounds { index: 5, total: 5 }));
    assert_eq!(source.total_fetches(), 0);
}

#[tokio::test]
async fn test_shutdown_drops_entries_and_stops_prefetch() {
    let source = Arc::new(MockSource::new());
    let cache = cache_with(config(4, 2), 10, &source);

    cache.get(0).await.unwrap();
    cache.wait_for_prefetch().await;
    assert!(!cache.is_empty());

    cache.shutdown();
    assert!(cache.is_empty());
    assert_eq!(cache.prefetch(5, 2), 0);
}

#[tokio::test]
async fn test_clear_keeps_cache_usable() {
    let source = Arc::new(MockSource::new());
    let cache = cache_with(config(4, 0), 10, &source);

    cache.get(4).await.unwrap();
    cache.clear();
    assert!(!cache.contains(4));
    cache.get(4).await.unwrap();
    assert_eq!(source.fetch_count(4), 2);
}

#[test]
fn test_rejects_zero_capacity() {
    let source: Arc<dyn TimestepSource> = Arc::new(MockSource::new());
    let err = TimestepCache::new(config(0, 0), 10, source, RawMeshDecoder).unwrap_err();
    assert!(matches!(err, StreamError::Config(_)));
}

#[tokio::test]
async fn test_abandoned_get_still_populates_cache() {
    let source = Arc::new(MockSource::with_delay(100));
    let cache = cache_with(config(10, 2), 10, &source);

    assert!(timeout(Duration::from_millis(10), cache.get(5)).await.is_err());
    cache.wait_for_prefetch().await;
    assert!(cache.contains(5));
    assert_eq!(source.fetch_count(5), 1);

    // The index is no longer marked in flight, so it can be prefetched again.
    cache.clear();
    assert_eq!(cache.prefetch(4, 2), 2);
    cache.wait_for_prefetch().await;
    assert!(cache.contains(5));
    assert!(cache.contains(6));
    assert_eq!(source.fetch_count(5), 2);
}

#[tokio::test]
async fn test_abandoned_get_is_shared_by_next_caller() {
    let source = Arc::new(MockSource::with_delay(100));
    let cache = cache_with(config(10, 0), 10, &source);

    assert!(timeout(Duration::from_millis(10), cache.get(3)).await.is_err());
    let mesh = cache.get(3).await.unwrap();
    assert_eq!(mesh.index, 3);
    assert_eq!(source.fetch_count(3), 1);
}

#[tokio::test]
async fn test_shutdown_aborts_pending_get() {
    let source = Arc::new(MockSource::with_delay(2_000));
    let cache = cache_with(config(4, 0), 10, &source);

    let getter = cache.clone();
    let pending = tokio::spawn(async move { getter.get(1).await });
    sleep(Duration::from_millis(20)).await;
    cache.shutdown();

    let result = timeout(Duration::from_secs(1), pending).await.unwrap().unwrap();
    assert!(matches!(result, Err(StreamError::Shutdown(_))));
    assert!(!cache.contains(1));
}

#[tokio::test]
async fn test_shutdown_interrupts_wait_for_prefetch() {
    let source = Arc::new(MockSource::with_delay(5_000));
    let cache = cache_with(config(10, 3), 10, &source);
    assert_eq!(cache.prefetch(0, 3), 3);

    let waiter = cache.clone();
    let waiting = tokio::spawn(async move { waiter.wait_for_prefetch().await });
    sleep(Duration::from_millis(20)).await;
    cache.shutdown();

    timeout(Duration::from_secs(1), waiting).await.unwrap().unwrap();
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_dropped_wait_leaves_prefetch_running() {
    let source = Arc::new(MockSource::with_delay(50));
    let cache = cache_with(config(10, 2), 10, &source);
    assert_eq!(cache.prefetch(0, 2), 2);

    assert!(timeout(Duration::from_millis(5), cache.wait_for_prefetch()).await.is_err());
    cache.wait_for_prefetch().await;
    assert!(cache.contains(1));
    assert!(cache.contains(2));
}
