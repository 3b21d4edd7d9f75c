use crate::cache::config::CacheConfig;
use crate::cache::metrics::{CacheMetrics, CacheMetricsSnapshot};
use crate::cache::policy::{self, Store};
use crate::errors::{Result, StreamError};
use crate::source::{MeshDecoder, TimestepSource};
use crate::types::TimestepIndex;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::poll_fn;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, Semaphore, oneshot};
use tokio::task::JoinSet;

/// Per-index gate; whoever holds it is the only one fetching that index.
type Gate = Arc<AsyncMutex<()>>;

/// A claim on the in-flight gate of one index. The entry leaves the in-flight
/// map when the last lease on it is dropped, wherever that happens.
struct Lease<D: MeshDecoder> {
    inner: Arc<Inner<D>>,
    index: TimestepIndex,
    gate: Option<Gate>,
    turn: Option<OwnedMutexGuard<()>>,
}

impl<D: MeshDecoder> Lease<D> {
    fn join(inner: &Arc<Inner<D>>, index: TimestepIndex) -> Self {
        let gate = Arc::clone(inner.inflight.lock().entry(index).or_insert_with(|| Arc::new(AsyncMutex::new(()))));
        Self { inner: Arc::clone(inner), index, gate: Some(gate), turn: None }
    }

    async fn acquire(&mut self) {
        if let Some(gate) = &self.gate {
            self.turn = Some(Arc::clone(gate).lock_owned().await);
        }
    }
}

impl<D: MeshDecoder> Drop for Lease<D> {
    fn drop(&mut self) {
        self.turn.take();
        let mut inflight = self.inner.inflight.lock();
        let Some(gate) = self.gate.take() else { return };
        drop(gate);
        // Every lease gives up its gate under this lock, so a count of one
        // means only the map is left.
        if inflight.get(&self.index).is_some_and(|g| Arc::strong_count(g) == 1) {
            inflight.remove(&self.index);
        }
    }
}

/// A bounded, prefetching cache of decoded timesteps.
///
/// `get` serves hits without I/O and turns misses into a single fetch per
/// index no matter how many callers ask concurrently. Every successful `get`
/// schedules background loads of the next `prefetch_radius` timesteps.
/// Clones share the same entries.
pub struct TimestepCache<D: MeshDecoder> {
    inner: Arc<Inner<D>>,
}

impl<D: MeshDecoder> Clone for TimestepCache<D> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<D: MeshDecoder> std::fmt::Debug for TimestepCache<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestepCache").finish_non_exhaustive()
    }
}

struct Inner<D: MeshDecoder> {
    store: Mutex<Store<D::Mesh>>,
    config: CacheConfig,
    total_timesteps: usize,
    source: Arc<dyn TimestepSource>,
    decoder: Arc<D>,
    inflight: Mutex<HashMap<TimestepIndex, Gate>>,
    prefetch_permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    metrics: CacheMetrics,
}

impl<D: MeshDecoder> TimestepCache<D> {
    /// Creates a cache for a dataset of `total_timesteps` snapshots.
    pub fn new(
        config: CacheConfig,
        total_timesteps: usize,
        source: Arc<dyn TimestepSource>,
        decoder: D,
    ) -> Result<Self> {
        config.validate()?;
        let inner = Inner {
            store: Mutex::new(policy::new_store(config.capacity)),
            prefetch_permits: Arc::new(Semaphore::new(config.max_concurrent_prefetch.max(1))),
            config,
            total_timesteps,
            source,
            decoder: Arc::new(decoder),
            inflight: Mutex::new(HashMap::new()),
            tasks: Mutex::new(JoinSet::new()),
            metrics: CacheMetrics::default(),
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Returns the payload for `index`, fetching it on a miss.
    ///
    /// Failed fetches are returned to the caller and never cached; the next
    /// `get` for the same index tries again.
    pub async fn get(&self, index: TimestepIndex) -> Result<Arc<D::Mesh>> {
        self.check_bounds(index)?;
        let cached = self.inner.lookup(index);
        let payload = match cached {
            Some(hit) => {
                CacheMetrics::bump(&self.inner.metrics.hits);
                debug!("timestep {index}: hit");
                hit
            }
            None => {
                CacheMetrics::bump(&self.inner.metrics.misses);
                debug!("timestep {index}: miss");
                Inner::load(&self.inner, Lease::join(&self.inner, index)).await?
            }
        };
        self.prefetch(index, self.inner.config.prefetch_radius);
        Ok(payload)
    }

    /// Schedules background loads of `index+1 ..= index+radius`, skipping
    /// indices past the dataset, already cached or already being fetched.
    /// Returns how many loads were scheduled. Failures are only logged.
    pub fn prefetch(&self, index: TimestepIndex, radius: usize) -> usize {
        let total = self.inner.total_timesteps;
        if radius == 0 || total == 0 || self.inner.prefetch_permits.is_closed() {
            return 0;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("prefetch after timestep {index} skipped: no async runtime");
            return 0;
        };
        let last = index.saturating_add(radius).min(total - 1);
        let mut tasks = self.inner.tasks.lock();
        while tasks.try_join_next().is_some() {}

        let mut scheduled = 0;
        for next in index.saturating_add(1)..=last {
            let Some(lease) = Inner::claim_for_prefetch(&self.inner, next) else {
                continue;
            };
            let inner = Arc::clone(&self.inner);
            tasks.spawn_on(
                async move {
                    let Ok(_permit) = Arc::clone(&inner.prefetch_permits).acquire_owned().await else {
                        return;
                    };
                    if let Err(e) = Inner::load(&inner, lease).await {
                        CacheMetrics::bump(&inner.metrics.prefetch_failures);
                        warn!("prefetch of timestep {next} failed: {e}");
                    }
                },
                &runtime,
            );
            CacheMetrics::bump(&self.inner.metrics.prefetch_scheduled);
            scheduled += 1;
        }
        if scheduled > 0 {
            debug!("scheduled {scheduled} prefetches after timestep {index}");
        }
        scheduled
    }

    /// Waits until every background load, prefetched or detached from an
    /// abandoned `get`, has finished. The task set stays in place while
    /// waiting, so `shutdown` can still abort it.
    pub async fn wait_for_prefetch(&self) {
        while let Some(res) = poll_fn(|cx| self.inner.tasks.lock().poll_join_next(cx)).await {
            if let Err(e) = res {
                if !e.is_cancelled() {
                    warn!("background load ended abnormally: {e}");
                }
            }
        }
    }

    /// Stops background work and drops every entry. A `get` whose fetch is
    /// aborted here returns `StreamError::Shutdown`.
    pub fn shutdown(&self) {
        self.inner.prefetch_permits.close();
        self.inner.tasks.lock().abort_all();
        self.inner.inflight.lock().clear();
        self.clear();
    }

    pub fn contains(&self, index: TimestepIndex) -> bool {
        self.inner.store.lock().contains(&index)
    }

    pub fn len(&self) -> usize {
        self.inner.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    pub fn total_timesteps(&self) -> usize {
        self.inner.total_timesteps
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Cached indices in eviction order, next victim first.
    pub fn cached_indices(&self) -> Vec<TimestepIndex> {
        policy::ordered_keys(&self.inner.store.lock())
    }

    pub fn clear(&self) {
        self.inner.store.lock().clear();
    }

    pub fn metrics_snapshot(&self) -> CacheMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Writes the current counters to the metrics log.
    pub fn log_metrics(&self) {
        let m = self.metrics_snapshot();
        info!(
            target: crate::logger::METRICS_TARGET,
            "cache entries={} capacity={} hits={} misses={} hit_rate={:.3} fetches={} failures={} dedup={} prefetch={} prefetch_failures={} evictions={} bytes={} mean_fetch_ms={:.2}",
            self.len(),
            self.capacity(),
            m.hits,
            m.misses,
            m.hit_rate(),
            m.fetches,
            m.fetch_failures,
            m.deduplicated,
            m.prefetch_scheduled,
            m.prefetch_failures,
            m.evictions,
            m.bytes_fetched,
            m.mean_fetch_ms()
        );
    }

    fn check_bounds(&self, index: TimestepIndex) -> Result<()> {
        let total = self.inner.total_timesteps;
        if index >= total {
            return Err(StreamError::OutOfBounds { index, total });
        }
        Ok(())
    }
}

impl<D: MeshDecoder> Inner<D> {
    fn lookup(&self, index: TimestepIndex) -> Option<Arc<D::Mesh>> {
        policy::lookup(&mut self.store.lock(), index, self.config.eviction_mode)
    }

    /// Registers `index` as in flight unless it is cached or already claimed.
    fn claim_for_prefetch(inner: &Arc<Self>, index: TimestepIndex) -> Option<Lease<D>> {
        if inner.store.lock().contains(&index) {
            return None;
        }
        let gate: Gate = Arc::new(AsyncMutex::new(()));
        {
            let mut inflight = inner.inflight.lock();
            if inflight.contains_key(&index) {
                return None;
            }
            inflight.insert(index, Arc::clone(&gate));
        }
        Some(Lease { inner: Arc::clone(inner), index, gate: Some(gate), turn: None })
    }

    /// Single-flight load: concurrent callers for one index queue on its gate
    /// and all but the first find the entry already stored.
    ///
    /// The fetch itself runs on a task in the background set and owns the
    /// lease, so a caller that stops waiting neither cancels it nor leaves the
    /// index marked in flight.
    async fn load(inner: &Arc<Self>, mut lease: Lease<D>) -> Result<Arc<D::Mesh>> {
        let index = lease.index;
        lease.acquire().await;
        let stored = inner.store.lock().peek(&index).cloned();
        if let Some(hit) = stored {
            CacheMetrics::bump(&inner.metrics.deduplicated);
            return Ok(hit);
        }

        let (done, outcome) = oneshot::channel();
        let task_inner = Arc::clone(inner);
        inner.tasks.lock().spawn(async move {
            let result = task_inner.fetch_and_insert(index).await;
            drop(lease);
            let _ = done.send(result);
        });
        outcome
            .await
            .map_err(|_| StreamError::Shutdown(format!("fetch of timestep {index} was aborted")))?
    }

    async fn fetch_and_insert(&self, index: TimestepIndex) -> Result<Arc<D::Mesh>> {
        CacheMetrics::bump(&self.metrics.fetches);
        let started = Instant::now();
        let mesh = match self.fetch_decoded(index).await {
            Ok(mesh) => mesh,
            Err(e) => {
                CacheMetrics::bump(&self.metrics.fetch_failures);
                debug!("timestep {index}: fetch failed: {e}");
                return Err(e);
            }
        };
        let payload = Arc::new(mesh);
        let evicted = policy::insert_bounded(&mut self.store.lock(), index, Arc::clone(&payload));
        if let Some(victim) = evicted {
            CacheMetrics::bump(&self.metrics.evictions);
            debug!("evicted timestep {victim} to make room for {index}");
        }
        let elapsed = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.metrics.total_fetch_ns.fetch_add(elapsed, Ordering::Relaxed);
        Ok(payload)
    }

    async fn fetch_decoded(&self, index: TimestepIndex) -> Result<D::Mesh> {
        let bytes = self.source.fetch(index).await?;
        self.metrics.bytes_fetched.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        let decoder = Arc::clone(&self.decoder);
        tokio::task::spawn_blocking(move || decoder.decode(index, bytes)).await?
    }
}
