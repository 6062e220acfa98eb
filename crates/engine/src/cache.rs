//! Process-wide cache of the workflow graph.
//!
//! The cache holds at most one entry: an `Arc<WorkflowGraph>` built from one
//! status read and one transition read, plus its load time and the
//! generation it was loaded under. Statuses and transitions therefore always
//! expire, invalidate and reload together.
//!
//! An entry is served while all of the following hold:
//!
//! - its generation equals the current one (`invalidate` bumps it),
//! - it is younger than the absolute TTL,
//! - it has been read within the sliding TTL.
//!
//! Otherwise the next `snapshot` reloads. Reloads are serialized by a mutex;
//! a caller that waited on it re-checks the entry before reading the store,
//! so a burst of misses costs one reload. When a reload fails transiently,
//! or a caller's deadline passes while it waits for another reload, the
//! previous entry is still served for up to `grace` past the instant it
//! expired: the earliest of its absolute limit, its sliding limit and its
//! invalidation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use txflow_storage::WorkflowStore;

use crate::config::CacheConfig;
use crate::deadline::bounded;
use crate::error::EngineError;
use crate::graph::WorkflowGraph;

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub reloads: u64,
    /// Reload failures answered with the previous snapshot.
    pub fallbacks: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    reloads: AtomicU64,
    fallbacks: AtomicU64,
    invalidations: AtomicU64,
}

impl Counters {
    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

struct Entry {
    graph: Arc<WorkflowGraph>,
    generation: u64,
    loaded_at: Instant,
    /// Offset of the latest read from `loaded_at`, in milliseconds.
    last_read_ms: AtomicU64,
    /// Offset of the first invalidation that retired this entry, or
    /// `u64::MAX` while it is current.
    invalidated_ms: AtomicU64,
}

impl Entry {
    fn new(graph: Arc<WorkflowGraph>, generation: u64) -> Self {
        Self {
            graph,
            generation,
            loaded_at: Instant::now(),
            last_read_ms: AtomicU64::new(0),
            invalidated_ms: AtomicU64::new(u64::MAX),
        }
    }

    fn offset_ms(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.loaded_at).as_millis())
            .unwrap_or(u64::MAX)
    }

    /// The instant this entry stopped being servable.
    fn expires_at(&self, config: &CacheConfig) -> Instant {
        let last_read = later(
            self.loaded_at,
            Duration::from_millis(self.last_read_ms.load(Ordering::Relaxed)),
        );
        let expiry =
            later(self.loaded_at, config.absolute_ttl()).min(later(last_read, config.sliding_ttl()));
        match self.invalidated_ms.load(Ordering::Relaxed) {
            u64::MAX => expiry,
            offset => expiry.min(later(self.loaded_at, Duration::from_millis(offset))),
        }
    }

    fn is_fresh(&self, now: Instant, config: &CacheConfig, generation: u64) -> bool {
        self.generation == generation && now < self.expires_at(config)
    }

    fn touch(&self, now: Instant) {
        self.last_read_ms
            .fetch_max(self.offset_ms(now), Ordering::Relaxed);
    }

    fn mark_invalidated(&self, now: Instant) {
        self.invalidated_ms
            .fetch_min(self.offset_ms(now), Ordering::Relaxed);
    }

    fn within_grace(&self, now: Instant, config: &CacheConfig) -> bool {
        now <= later(self.expires_at(config), config.grace())
    }
}

/// `base + by`, saturating at roughly thirty years out.
fn later(base: Instant, by: Duration) -> Instant {
    base.checked_add(by)
        .unwrap_or_else(|| base + Duration::from_secs(86_400 * 365 * 30))
}

pub struct GraphCache<S> {
    store: Arc<S>,
    config: CacheConfig,
    entry: RwLock<Option<Arc<Entry>>>,
    reload_lock: Mutex<()>,
    generation: AtomicU64,
    counters: Counters,
}

impl<S: WorkflowStore> GraphCache<S> {
    pub fn new(store: Arc<S>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            entry: RwLock::new(None),
            reload_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// The current graph, reloading from the store if the cached one is
    /// absent, expired or invalidated.
    ///
    /// Store reads are bounded by `deadline`.
    pub async fn snapshot(&self, deadline: Instant) -> Result<Arc<WorkflowGraph>, EngineError> {
        if let Some(graph) = self.cached().await {
            return Ok(graph);
        }

        let _reload = match tokio::time::timeout_at(deadline, self.reload_lock.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                let err = EngineError::Timeout {
                    operation: "graph_reload",
                };
                return self.fall_back(err, true).await;
            }
        };
        // Another caller may have finished a reload while we waited.
        if let Some(graph) = self.cached().await {
            return Ok(graph);
        }
        Counters::record(&self.counters.misses);
        self.reload(deadline, true).await
    }

    /// Mark the cached graph stale. The next `snapshot` reloads.
    ///
    /// Takes effect immediately, including for a reload already in flight:
    /// its result is stored under the old generation and is not served.
    pub fn invalidate(&self) {
        let generation = self.retire();
        Counters::record(&self.counters.invalidations);
        tracing::info!(generation, "workflow graph cache invalidated");
    }

    /// Invalidate and reload now. A failed reload is returned as an error;
    /// the stale snapshot is not substituted.
    pub async fn refresh(&self, deadline: Instant) -> Result<Arc<WorkflowGraph>, EngineError> {
        self.invalidate();
        self.reload_now(deadline).await
    }

    /// Reload without counting or logging an invalidation. Used when the
    /// cached graph is found to lack a record the store already has.
    pub async fn force_reload(
        &self,
        deadline: Instant,
    ) -> Result<Arc<WorkflowGraph>, EngineError> {
        let generation = self.retire();
        tracing::debug!(generation, "workflow graph reload forced");
        self.reload_now(deadline).await
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Bump the generation and stamp the current entry's expiry.
    fn retire(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        // A failed `try_read` means a reload is installing its entry; it
        // re-checks the generation after the write.
        if let Ok(slot) = self.entry.try_read() {
            if let Some(entry) = slot.as_ref() {
                entry.mark_invalidated(Instant::now());
            }
        }
        generation
    }

    async fn reload_now(&self, deadline: Instant) -> Result<Arc<WorkflowGraph>, EngineError> {
        let _reload = tokio::time::timeout_at(deadline, self.reload_lock.lock())
            .await
            .map_err(|_| EngineError::Timeout {
                operation: "graph_reload",
            })?;
        Counters::record(&self.counters.misses);
        self.reload(deadline, false).await
    }

    async fn cached(&self) -> Option<Arc<WorkflowGraph>> {
        let now = Instant::now();
        let slot = self.entry.read().await;
        let entry = slot.as_ref()?;
        if !entry.is_fresh(now, &self.config, self.generation.load(Ordering::SeqCst)) {
            return None;
        }
        entry.touch(now);
        Counters::record(&self.counters.hits);
        Some(entry.graph.clone())
    }

    /// Read both halves of the graph and install them as one entry. Caller
    /// holds `reload_lock`.
    async fn reload(
        &self,
        deadline: Instant,
        allow_stale: bool,
    ) -> Result<Arc<WorkflowGraph>, EngineError> {
        let generation = self.generation.load(Ordering::SeqCst);

        let loaded = async {
            let statuses = bounded(deadline, "list_statuses", self.store.list_statuses()).await?;
            let transitions =
                bounded(deadline, "list_transitions", self.store.list_transitions()).await?;
            Ok::<_, EngineError>(WorkflowGraph::new(statuses, transitions))
        }
        .await;

        let graph = match loaded {
            Ok(graph) => Arc::new(graph),
            Err(err) => return self.fall_back(err, allow_stale).await,
        };

        for issue in graph.issues() {
            tracing::warn!(%issue, "workflow graph inconsistency");
        }
        tracing::debug!(
            statuses = graph.statuses().len(),
            transitions = graph.transitions().len(),
            generation,
            "workflow graph reloaded"
        );

        let entry = Arc::new(Entry::new(graph.clone(), generation));
        *self.entry.write().await = Some(entry.clone());
        if self.generation.load(Ordering::SeqCst) != generation {
            entry.mark_invalidated(Instant::now());
        }
        Counters::record(&self.counters.reloads);
        Ok(graph)
    }

    async fn fall_back(
        &self,
        err: EngineError,
        allow_stale: bool,
    ) -> Result<Arc<WorkflowGraph>, EngineError> {
        if !allow_stale || !err.is_transient() {
            return Err(err);
        }
        let now = Instant::now();
        let slot = self.entry.read().await;
        match slot.as_ref() {
            Some(entry) if entry.within_grace(now, &self.config) => {
                Counters::record(&self.counters.fallbacks);
                tracing::warn!(
                    error = %err,
                    age_secs = now.saturating_duration_since(entry.loaded_at).as_secs(),
                    "workflow graph reload failed; serving previous snapshot"
                );
                Ok(entry.graph.clone())
            }
            _ => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use txflow_storage::{seed, MemoryStore, NewStatus};

    use super::*;

    fn cache(store: &Arc<MemoryStore>) -> GraphCache<MemoryStore> {
        GraphCache::new(store.clone(), CacheConfig::default())
    }

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[tokio::test(start_paused = true)]
    async fn second_snapshot_is_a_hit() {
        let store = Arc::new(MemoryStore::seeded());
        let cache = cache(&store);

        let first = cache.snapshot(far()).await.unwrap();
        let second = cache.snapshot(far()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                reloads: 1,
                ..CacheStats::default()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_reload() {
        let store = Arc::new(MemoryStore::seeded());
        let cache = cache(&store);
        let before = cache.snapshot(far()).await.unwrap();

        store
            .insert_status(NewStatus {
                name: "On Hold".to_string(),
                description: None,
                is_initial: false,
                is_final: false,
                display_order: 6,
            })
            .await
            .unwrap();
        // Not visible until invalidated.
        assert_eq!(cache.snapshot(far()).await.unwrap().statuses().len(), 5);

        cache.invalidate();
        let after = cache.snapshot(far()).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.statuses().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn sliding_window_extends_on_read() {
        let store = Arc::new(MemoryStore::seeded());
        let cache = cache(&store);
        let first = cache.snapshot(far()).await.unwrap();

        // Reads every 9 minutes keep the entry alive past 10 minutes.
        for _ in 0..2 {
            tokio::time::advance(Duration::from_secs(9 * 60)).await;
            assert!(Arc::ptr_eq(&first, &cache.snapshot(far()).await.unwrap()));
        }

        // Idle for longer than the sliding window, still inside the hard limit.
        tokio::time::advance(Duration::from_secs(11 * 60)).await;
        assert!(!Arc::ptr_eq(&first, &cache.snapshot(far()).await.unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn absolute_ttl_wins_over_sliding() {
        let store = Arc::new(MemoryStore::seeded());
        let cache = cache(&store);
        let first = cache.snapshot(far()).await.unwrap();

        let mut reloaded = false;
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(8 * 60)).await;
            if !Arc::ptr_eq(&first, &cache.snapshot(far()).await.unwrap()) {
                reloaded = true;
                break;
            }
        }
        // 32 minutes of steady reads crosses the 30 minute hard limit.
        assert!(reloaded);
        assert_eq!(cache.stats().reloads, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reload_serves_previous_within_grace() {
        let store = Arc::new(MemoryStore::seeded());
        let cache = cache(&store);
        let first = cache.snapshot(far()).await.unwrap();

        store.set_available(false);
        cache.invalidate();
        let stale = cache.snapshot(far()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &stale));
        assert_eq!(cache.stats().fallbacks, 1);

        // Once the grace after invalidation has run out the error surfaces.
        tokio::time::advance(Duration::from_secs(36 * 60)).await;
        let err = cache.snapshot(far()).await.unwrap_err();
        assert!(matches!(err, EngineError::StoreUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn grace_runs_from_sliding_expiry() {
        let store = Arc::new(MemoryStore::seeded());
        let cache = cache(&store);
        let first = cache.snapshot(far()).await.unwrap();
        store.set_available(false);

        // Idle entry expired at 10 minutes; 14 minutes is inside the grace.
        tokio::time::advance(Duration::from_secs(14 * 60)).await;
        assert!(Arc::ptr_eq(&first, &cache.snapshot(far()).await.unwrap()));

        // 16 minutes is past it, even though the hard limit is 30.
        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        let err = cache.snapshot(far()).await.unwrap_err();
        assert!(matches!(err, EngineError::StoreUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn grace_runs_from_invalidation() {
        let store = Arc::new(MemoryStore::seeded());
        let cache = cache(&store);
        let first = cache.snapshot(far()).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        store.set_available(false);
        cache.invalidate();

        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert!(Arc::ptr_eq(&first, &cache.snapshot(far()).await.unwrap()));

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert!(cache.snapshot(far()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn callers_queued_behind_a_slow_reload_share_the_fallback() {
        let store = Arc::new(MemoryStore::seeded());
        let cache = cache(&store);
        let first = cache.snapshot(far()).await.unwrap();

        cache.invalidate();
        store.set_latency(Duration::from_secs(10));
        let deadline = Instant::now() + Duration::from_secs(1);
        let (a, b, c) = tokio::join!(
            cache.snapshot(deadline),
            cache.snapshot(deadline),
            cache.snapshot(deadline),
        );
        for graph in [a, b, c] {
            assert!(Arc::ptr_eq(&first, &graph.unwrap()));
        }
        assert_eq!(cache.stats().fallbacks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_during_reload_discards_its_result() {
        let store = Arc::new(MemoryStore::seeded());
        let cache = cache(&store);
        store.set_latency(Duration::from_secs(2));

        // The reload reads statuses at 2s and transitions at 4s; the graph
        // changes and is invalidated in between.
        let (loaded, ()) = tokio::join!(cache.snapshot(far()), async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            store.set_latency(Duration::ZERO);
            store
                .insert_status(NewStatus {
                    name: "On Hold".to_string(),
                    description: None,
                    is_initial: false,
                    is_final: false,
                    display_order: 6,
                })
                .await
                .unwrap();
            cache.invalidate();
        });
        assert_eq!(loaded.unwrap().statuses().len(), 5);

        let next = cache.snapshot(far()).await.unwrap();
        assert_eq!(next.statuses().len(), 6);
        assert_eq!(cache.stats().reloads, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn force_reload_is_not_an_invalidation() {
        let store = Arc::new(MemoryStore::seeded());
        let cache = cache(&store);
        let first = cache.snapshot(far()).await.unwrap();

        let second = cache.force_reload(far()).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &cache.snapshot(far()).await.unwrap()));
        let stats = cache.stats();
        assert_eq!(stats.reloads, 2);
        assert_eq!(stats.invalidations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cold_cache_with_store_down_is_an_error() {
        let store = Arc::new(MemoryStore::seeded());
        store.set_available(false);
        let cache = cache(&store);
        let err = cache.snapshot(far()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_does_not_fall_back() {
        let store = Arc::new(MemoryStore::seeded());
        let cache = cache(&store);
        cache.snapshot(far()).await.unwrap();

        store.set_available(false);
        assert!(cache.refresh(far()).await.is_err());

        store.set_available(true);
        let graph = cache.refresh(far()).await.unwrap();
        assert_eq!(graph.initial_status().unwrap().id, seed::CREATED);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_hits_deadline() {
        let store = Arc::new(MemoryStore::seeded());
        store.set_latency(Duration::from_secs(2));
        let cache = cache(&store);
        let err = cache
            .snapshot(Instant::now() + Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Timeout {
                operation: "list_statuses"
            }
        ));
    }
}
