//! In-memory single-flight cache with a TTL per resource class.
//!
//! Each key moves through `Empty -> InFlight -> Ready <-> Expired`:
//!
//! - a miss *claims* the key by registering one shared computation; every
//!   caller that misses before it resolves joins that computation instead of
//!   starting another
//! - a success is *published* as a fresh entry, replacing whatever was there
//! - a failure *releases* the key, so the next caller retries upstream
//!
//! The map is split into shards with one mutex each, and no lock is held
//! across an await. In-flight computations are registered through weak
//! handles: when every caller waiting on a computation goes away, the
//! computation is dropped with them and the next caller claims the key anew.
//! Callers that are still waiting keep it running.

use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use serde::Serialize;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::CacheConfig;

const SHARDS: usize = 16;

/// Kinds of cached resources, each with its own freshness window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceClass {
    PaperById,
    CitationNetwork,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::PaperById => "paper-by-id",
            ResourceClass::CitationNetwork => "citation-network",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key: a resource class plus the requested id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    class: ResourceClass,
    id: String,
}

impl CacheKey {
    pub fn new(class: ResourceClass, id: impl Into<String>) -> Self {
        Self {
            class,
            id: id.into(),
        }
    }

    pub fn paper(id: impl Into<String>) -> Self {
        Self::new(ResourceClass::PaperById, id)
    }

    pub fn network(id: impl Into<String>) -> Self {
        Self::new(ResourceClass::CitationNetwork, id)
    }

    pub fn class(&self) -> ResourceClass {
        self.class
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.id)
    }
}

/// Time-to-live for each resource class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub paper_by_id: Duration,
    pub citation_network: Duration,
}

impl TtlPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            paper_by_id: Duration::from_secs(config.paper_ttl_seconds),
            citation_network: Duration::from_secs(config.network_ttl_seconds),
        }
    }

    pub fn ttl_for(&self, class: ResourceClass) -> Duration {
        match class {
            ResourceClass::PaperById => self.paper_by_id,
            ResourceClass::CitationNetwork => self.citation_network,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Counters exposed for status reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads served from a fresh entry
    pub hits: u64,
    /// Reads that started an upstream computation
    pub misses: u64,
    /// Reads that joined a computation already in flight
    pub coalesced: u64,
    /// Computations that failed and were not cached
    pub failures: u64,
    /// Entries found past their TTL and replaced
    pub expirations: u64,
    /// Slots currently held, ready or in flight
    pub entries: usize,
}

type Flight<V, E> = BoxFuture<'static, Result<Arc<V>, E>>;

struct CacheEntry<V> {
    value: Arc<V>,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < self.ttl
    }
}

enum Slot<V, E> {
    InFlight {
        generation: u64,
        flight: WeakShared<Flight<V, E>>,
    },
    Ready(CacheEntry<V>),
}

type Shard<V, E> = Mutex<HashMap<CacheKey, Slot<V, E>>>;

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
    expirations: AtomicU64,
}

struct Inner<V, E> {
    shards: Box<[Shard<V, E>]>,
    hasher: RandomState,
    ttl: TtlPolicy,
    generation: AtomicU64,
    counters: Counters,
}

impl<V, E> Inner<V, E> {
    fn shard(&self, key: &CacheKey) -> MutexGuard<'_, HashMap<CacheKey, Slot<V, E>>> {
        let index = (self.hasher.hash_one(key) as usize) % self.shards.len();
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish or release the claim made by `generation`, if it still owns the key.
    fn settle(&self, key: &CacheKey, generation: u64, outcome: &Result<Arc<V>, E>) {
        let mut shard = self.shard(key);
        let owns_key = matches!(
            shard.get(key),
            Some(Slot::InFlight { generation: g, .. }) if *g == generation
        );
        if !owns_key {
            tracing::debug!(%key, "Cache claim superseded, result not stored");
            return;
        }

        match outcome {
            Ok(value) => {
                shard.insert(
                    key.clone(),
                    Slot::Ready(CacheEntry {
                        value: Arc::clone(value),
                        created_at: Instant::now(),
                        ttl: self.ttl.ttl_for(key.class),
                    }),
                );
                tracing::debug!(%key, "Cache STORE");
            }
            Err(_) => {
                shard.remove(key);
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%key, "Cache RELEASE after failed computation");
            }
        }
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let before = shard.len();
            shard.retain(|_, slot| match slot {
                Slot::Ready(entry) => entry.is_fresh(now),
                Slot::InFlight { flight, .. } => flight.upgrade().is_some(),
            });
            removed += before - shard.len();
        }
        removed
    }
}

/// Keyed single-flight cache.
///
/// Cloning is cheap and clones share the same store.
pub struct ResourceCache<V, E> {
    inner: Arc<Inner<V, E>>,
}

impl<V, E> Clone for ResourceCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, E> fmt::Debug for ResourceCache<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("ttl", &self.inner.ttl)
            .field("shards", &self.inner.shards.len())
            .finish()
    }
}

impl<V, E> ResourceCache<V, E>
where
    V: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: TtlPolicy) -> Self {
        let shards = (0..SHARDS)
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            inner: Arc::new(Inner {
                shards,
                hasher: RandomState::new(),
                ttl,
                generation: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    pub fn ttl(&self) -> TtlPolicy {
        self.inner.ttl
    }

    /// Return the cached value for `key`, computing it at most once.
    ///
    /// `compute` is only called when this caller claims the key; it should
    /// just build the future, which runs after the shard lock is released.
    /// Every caller that joins the same computation receives the same
    /// `Arc`, or the same error.
    pub async fn get<F, Fut>(&self, key: CacheKey, compute: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let flight = {
            let mut shard = self.inner.shard(&key);
            let now = Instant::now();

            let joined = match shard.get(&key) {
                Some(Slot::Ready(entry)) if entry.is_fresh(now) => {
                    self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%key, "Cache HIT");
                    return Ok(Arc::clone(&entry.value));
                }
                Some(Slot::Ready(_)) => {
                    self.inner.counters.expirations.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%key, "Cache EXPIRED");
                    None
                }
                Some(Slot::InFlight { flight, .. }) => flight.upgrade(),
                None => None,
            };

            match joined {
                Some(flight) => {
                    self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%key, "Cache JOIN in-flight computation");
                    flight
                }
                None => self.claim(&mut shard, key, compute),
            }
        };

        flight.await
    }

    /// Register a new computation for `key`. Caller holds the shard lock.
    fn claim<F, Fut>(
        &self,
        shard: &mut HashMap<CacheKey, Slot<V, E>>,
        key: CacheKey,
        compute: F,
    ) -> Shared<Flight<V, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%key, "Cache MISS");

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let settle_key = key.clone();
        let work = compute();

        let flight = async move {
            let outcome = work.await.map(Arc::new);
            inner.settle(&settle_key, generation, &outcome);
            outcome
        }
        .boxed()
        .shared();

        // Never-polled futures always downgrade
        if let Some(weak) = flight.downgrade() {
            shard.insert(
                key,
                Slot::InFlight {
                    generation,
                    flight: weak,
                },
            );
        }
        flight
    }

    /// Drop whatever is held for `key`.
    ///
    /// A computation in flight keeps running for its callers but its result
    /// is not stored.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.inner.shard(key).remove(key).is_some()
    }

    /// Remove expired entries and abandoned computations.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    /// Periodically purge expired entries until the cache is dropped.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner<V, E>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let removed = inner.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, "Cache sweep");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.inner
            .shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            expirations: c.expirations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::atomic::AtomicUsize;

    type TestCache = ResourceCache<String, String>;

    fn cache() -> TestCache {
        ResourceCache::new(TtlPolicy {
            paper_by_id: Duration::from_secs(600),
            citation_network: Duration::from_secs(900),
        })
    }

    fn counting(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
        result: Result<&str, &str>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<String, String>> {
        let calls = Arc::clone(calls);
        let result = result.map(String::from).map_err(String::from);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                result
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_gets_compute_once() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let results = join_all((0..25).map(|_| {
            cache.get(
                CacheKey::paper("P1"),
                counting(&calls, Duration::from_millis(200), Ok("paper")),
            )
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.coalesced, 24);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_never_served_past_ttl() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::paper("P1");

        cache
            .get(key.clone(), counting(&calls, Duration::ZERO, Ok("v1")))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(599)).await;
        cache
            .get(key.clone(), counting(&calls, Duration::ZERO, Ok("v2")))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        let value = cache
            .get(key.clone(), counting(&calls, Duration::ZERO, Ok("v2")))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(value.as_str(), "v2");
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_depends_on_class() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get(CacheKey::paper("P1"), counting(&calls, Duration::ZERO, Ok("p")))
            .await
            .unwrap();
        cache
            .get(CacheKey::network("P1"), counting(&calls, Duration::ZERO, Ok("n")))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(700)).await;

        cache
            .get(CacheKey::network("P1"), counting(&calls, Duration::ZERO, Ok("n")))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache
            .get(CacheKey::paper("P1"), counting(&calls, Duration::ZERO, Ok("p")))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_not_cached() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::paper("P1");

        let first = cache
            .get(key.clone(), counting(&calls, Duration::ZERO, Err("rate limited")))
            .await;
        assert_eq!(first.unwrap_err(), "rate limited");
        assert!(cache.is_empty());

        let second = cache
            .get(key.clone(), counting(&calls, Duration::ZERO, Ok("paper")))
            .await;
        assert_eq!(second.unwrap().as_str(), "paper");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_share_failure() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let results = join_all((0..5).map(|_| {
            cache.get(
                CacheKey::paper("P1"),
                counting(&calls, Duration::from_millis(50), Err("down")),
            )
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.as_ref().unwrap_err() == "down"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_leader_does_not_affect_waiter() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::paper("P1");

        let mut leader = Box::pin(cache.get(
            key.clone(),
            counting(&calls, Duration::from_millis(100), Ok("leader")),
        ));
        assert!(futures_util::poll!(&mut leader).is_pending());

        let mut waiter = Box::pin(cache.get(
            key.clone(),
            counting(&calls, Duration::from_millis(100), Ok("waiter")),
        ));
        assert!(futures_util::poll!(&mut waiter).is_pending());
        drop(leader);

        assert_eq!(waiter.await.unwrap().as_str(), "leader");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_computation_is_reclaimed() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::paper("P1");

        let mut abandoned = Box::pin(cache.get(
            key.clone(),
            counting(&calls, Duration::from_millis(100), Ok("first")),
        ));
        assert!(futures_util::poll!(&mut abandoned).is_pending());
        drop(abandoned);

        let value = cache
            .get(key, counting(&calls, Duration::from_millis(100), Ok("second")))
            .await
            .unwrap();
        assert_eq!(value.as_str(), "second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_during_flight_skips_store() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::paper("P1");

        let mut pending = Box::pin(cache.get(
            key.clone(),
            counting(&calls, Duration::from_millis(100), Ok("stale")),
        ));
        assert!(futures_util::poll!(&mut pending).is_pending());
        assert!(cache.invalidate(&key));

        assert_eq!(pending.await.unwrap().as_str(), "stale");
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        for id in ["a", "b"] {
            cache
                .get(CacheKey::paper(id), counting(&calls, Duration::ZERO, Ok("p")))
                .await
                .unwrap();
        }
        cache
            .get(CacheKey::network("a"), counting(&calls, Duration::ZERO, Ok("n")))
            .await
            .unwrap();
        assert_eq!(cache.len(), 3);

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_in_background() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .get(CacheKey::paper("a"), counting(&calls, Duration::ZERO, Ok("p")))
            .await
            .unwrap();

        let sweeper = cache.spawn_sweeper(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(660)).await;
        assert!(cache.is_empty());
        sweeper.abort();
    }

    #[test]
    fn test_key_display() {
        assert_eq!(CacheKey::paper("P1").to_string(), "paper-by-id:P1");
        assert_eq!(CacheKey::network("P1").to_string(), "citation-network:P1");
    }
}
