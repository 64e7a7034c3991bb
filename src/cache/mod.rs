//! Route cache — per-route staleness policy and the shared entry table.
//!
//! Each logical route carries a [`CachePolicy`] fixed at configuration
//! time; only entry data and freshness change at runtime. The entry table
//! is the single piece of state shared across concurrent requests:
//!
//! - Reads are snapshot reads of an `Arc`'d entry — a reader observes
//!   either the old or the new entry, never a mix.
//! - Writes are exclusive per route key; no lock spans multiple keys.
//! - A stale-while-revalidate refresh is single-flighted per key via a
//!   compare-and-set guard, and replaces the entry only on success —
//!   a failed refresh leaves the stale entry serving.
//!
//! Cached values are fully serialized envelope bodies, so repeated cache
//! hits are byte-identical to the response that populated them.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::aggregate::GatewayError;
use crate::router::Pattern;

/// Per-route staleness policy.
///
/// In route configuration this deserializes from the shapes `"always-fresh"`,
/// `"static"`, or `{"swr": <seconds>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Every request recomputes; nothing is cached.
    AlwaysFresh,
    /// Computed once, served from cache until explicit invalidation.
    Static,
    /// Serve any cached value immediately; once older than the TTL,
    /// refresh in the background without blocking the current response.
    StaleWhileRevalidate(Duration),
}

impl<'de> Deserialize<'de> for CachePolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Named(String),
            Swr { swr: u64 },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Named(name) => match name.as_str() {
                "always-fresh" => Ok(Self::AlwaysFresh),
                "static" => Ok(Self::Static),
                other => Err(serde::de::Error::unknown_variant(
                    other,
                    &["always-fresh", "static"],
                )),
            },
            Repr::Swr { swr } => Ok(Self::StaleWhileRevalidate(Duration::from_secs(swr))),
        }
    }
}

/// Boxed future produced by a [`ComputeFn`].
pub type ComputeFuture = Pin<Box<dyn Future<Output = Result<Bytes, GatewayError>> + Send>>;

/// Recomputes a route's payload; invoked on cache misses and background
/// refreshes, so it must be callable repeatedly.
pub type ComputeFn = Arc<dyn Fn() -> ComputeFuture + Send + Sync>;

// Lock poisoning only happens if a holder panicked mid-update; entries are
// replaced whole, so the inner value is still coherent — keep serving.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// One cached payload and the instant it was computed.
#[derive(Debug)]
struct CacheEntry {
    payload: Bytes,
    computed_at: Instant,
}

/// Per-key cell: the current entry plus the single-flight refresh guard.
#[derive(Default)]
struct Slot {
    entry: RwLock<Option<Arc<CacheEntry>>>,
    refreshing: AtomicBool,
}

impl Slot {
    fn snapshot(&self) -> Option<Arc<CacheEntry>> {
        read_lock(&self.entry).clone()
    }

    // Atomic replace: readers see the old entry or the new one, never a mix.
    fn replace(&self, payload: Bytes) {
        *write_lock(&self.entry) = Some(Arc::new(CacheEntry {
            payload,
            computed_at: Instant::now(),
        }));
    }

    fn clear(&self) -> bool {
        write_lock(&self.entry).take().is_some()
    }

    // Returns true if this caller won the right to refresh.
    fn begin_refresh(&self) -> bool {
        self.refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn end_refresh(&self) {
        self.refreshing.store(false, Ordering::SeqCst);
    }
}

/// Process-wide cache entry table, keyed by route key (path + query).
#[derive(Default)]
pub struct RouteCache {
    slots: RwLock<HashMap<String, Arc<Slot>>>,
}

impl RouteCache {
    /// Creates an empty cache table.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<Slot> {
        if let Some(slot) = read_lock(&self.slots).get(key) {
            return Arc::clone(slot);
        }
        let mut slots = write_lock(&self.slots);
        Arc::clone(slots.entry(key.to_owned()).or_default())
    }

    /// Serves the route keyed by `key` under `policy`, invoking `compute`
    /// when a fresh payload is needed.
    ///
    /// Only successful payloads are cached; errors propagate to the caller
    /// and leave any existing entry untouched.
    pub async fn respond(
        &self,
        key: &str,
        policy: CachePolicy,
        compute: ComputeFn,
    ) -> Result<Bytes, GatewayError> {
        match policy {
            CachePolicy::AlwaysFresh => compute().await,

            CachePolicy::Static => {
                let slot = self.slot(key);
                if let Some(entry) = slot.snapshot() {
                    debug!(key, "static cache hit");
                    return Ok(entry.payload.clone());
                }
                let payload = compute().await?;
                slot.replace(payload.clone());
                Ok(payload)
            }

            CachePolicy::StaleWhileRevalidate(ttl) => {
                let slot = self.slot(key);
                if let Some(entry) = slot.snapshot() {
                    if entry.computed_at.elapsed() > ttl && slot.begin_refresh() {
                        debug!(key, "cache entry stale, starting background refresh");
                        let slot = Arc::clone(&slot);
                        let key = key.to_owned();
                        tokio::spawn(async move {
                            match compute().await {
                                Ok(payload) => {
                                    slot.replace(payload);
                                    debug!(key, "background refresh complete");
                                }
                                Err(e) => {
                                    warn!(key, error = %e, "background refresh failed, keeping stale entry");
                                }
                            }
                            slot.end_refresh();
                        });
                    }
                    return Ok(entry.payload.clone());
                }
                // Cold miss: compute inline, blocking this caller only.
                let payload = compute().await?;
                slot.replace(payload.clone());
                Ok(payload)
            }
        }
    }

    /// Drops the entry for one route key. Returns `true` if one existed.
    pub fn invalidate(&self, key: &str) -> bool {
        match read_lock(&self.slots).get(key) {
            Some(slot) => slot.clear(),
            None => false,
        }
    }

    /// Drops every cached entry, returning how many were cleared.
    pub fn invalidate_all(&self) -> usize {
        read_lock(&self.slots)
            .values()
            .filter(|slot| slot.clear())
            .count()
    }
}

/// Ordered per-route policy rules, resolved with the same pattern matching
/// the router uses.
///
/// Routes without a rule default to [`CachePolicy::AlwaysFresh`] — serving
/// uncached is always correct, just slower.
#[derive(Default)]
pub struct PolicyTable {
    rules: Vec<(Pattern, CachePolicy)>,
}

impl PolicyTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule; earlier rules win on overlap.
    pub fn insert(&mut self, pattern: &str, policy: CachePolicy) {
        self.rules.push((Pattern::parse(pattern), policy));
    }

    /// Resolves the policy for a request path.
    pub fn resolve(&self, path: &str) -> CachePolicy {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.matches(path).is_some())
            .map(|(_, policy)| *policy)
            .unwrap_or(CachePolicy::AlwaysFresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_compute(counter: Arc<AtomicUsize>, latency: Duration) -> ComputeFn {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                if latency > Duration::ZERO {
                    tokio::time::sleep(latency).await;
                }
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(Bytes::from(format!("payload-{n}")))
            })
        })
    }

    // ── CachePolicy deserialization ───────────────────────────────────────────

    #[test]
    fn policy_from_config_shapes() {
        let p: CachePolicy = serde_json::from_str(r#""static""#).unwrap();
        assert_eq!(p, CachePolicy::Static);
        let p: CachePolicy = serde_json::from_str(r#""always-fresh""#).unwrap();
        assert_eq!(p, CachePolicy::AlwaysFresh);
        let p: CachePolicy = serde_json::from_str(r#"{"swr": 60}"#).unwrap();
        assert_eq!(p, CachePolicy::StaleWhileRevalidate(Duration::from_secs(60)));
    }

    #[test]
    fn unknown_policy_name_is_rejected() {
        assert!(serde_json::from_str::<CachePolicy>(r#""nonsense""#).is_err());
    }

    // ── PolicyTable ───────────────────────────────────────────────────────────

    #[test]
    fn policy_table_resolution() {
        let mut table = PolicyTable::new();
        table.insert("/", CachePolicy::Static);
        table.insert("/api/users", CachePolicy::StaleWhileRevalidate(Duration::from_secs(60)));
        table.insert("/api/users/:id", CachePolicy::AlwaysFresh);

        assert_eq!(table.resolve("/"), CachePolicy::Static);
        assert_eq!(
            table.resolve("/api/users"),
            CachePolicy::StaleWhileRevalidate(Duration::from_secs(60))
        );
        assert_eq!(table.resolve("/api/users/7"), CachePolicy::AlwaysFresh);
        // unconfigured routes are served uncached
        assert_eq!(table.resolve("/api/dashboard"), CachePolicy::AlwaysFresh);
    }

    // ── RouteCache ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn always_fresh_recomputes_every_time() {
        let cache = RouteCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let compute = counting_compute(Arc::clone(&counter), Duration::ZERO);

        for _ in 0..3 {
            cache
                .respond("/api/dashboard", CachePolicy::AlwaysFresh, Arc::clone(&compute))
                .await
                .unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn static_computes_once_until_invalidated() {
        let cache = RouteCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let compute = counting_compute(Arc::clone(&counter), Duration::ZERO);

        let first = cache
            .respond("/", CachePolicy::Static, Arc::clone(&compute))
            .await
            .unwrap();
        let second = cache
            .respond("/", CachePolicy::Static, Arc::clone(&compute))
            .await
            .unwrap();
        assert_eq!(first, second); // byte-identical
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert!(cache.invalidate("/"));
        let third = cache
            .respond("/", CachePolicy::Static, Arc::clone(&compute))
            .await
            .unwrap();
        assert_ne!(first, third);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_unknown_key_is_a_noop() {
        let cache = RouteCache::new();
        assert!(!cache.invalidate("/nothing"));
        assert_eq!(cache.invalidate_all(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn swr_serves_identical_bytes_within_ttl() {
        let cache = RouteCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let compute = counting_compute(Arc::clone(&counter), Duration::ZERO);
        let policy = CachePolicy::StaleWhileRevalidate(Duration::from_secs(60));

        let at_t0 = cache
            .respond("/api/users", policy, Arc::clone(&compute))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        let at_t30 = cache
            .respond("/api/users", policy, Arc::clone(&compute))
            .await
            .unwrap();

        assert_eq!(at_t0, at_t30);
        assert_eq!(counter.load(Ordering::SeqCst), 1); // no second upstream fetch
    }

    #[tokio::test(start_paused = true)]
    async fn swr_refreshes_in_background_after_ttl() {
        let cache = RouteCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let compute = counting_compute(Arc::clone(&counter), Duration::from_millis(10));
        let policy = CachePolicy::StaleWhileRevalidate(Duration::from_secs(60));

        let fresh = cache
            .respond("/api/users", policy, Arc::clone(&compute))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        // Stale hit: served immediately from cache, refresh starts behind it.
        let stale = cache
            .respond("/api/users", policy, Arc::clone(&compute))
            .await
            .unwrap();
        assert_eq!(fresh, stale);

        // Let the background refresh finish.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let refreshed = cache
            .respond("/api/users", policy, Arc::clone(&compute))
            .await
            .unwrap();
        assert_ne!(fresh, refreshed);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn swr_refresh_is_single_flighted() {
        let cache = RouteCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let compute = counting_compute(Arc::clone(&counter), Duration::from_millis(50));
        let policy = CachePolicy::StaleWhileRevalidate(Duration::from_secs(60));

        let fresh = cache
            .respond("/api/users", policy, Arc::clone(&compute))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        // Ten concurrent stale hits: all served from cache, one refresh.
        for _ in 0..10 {
            let stale = cache
                .respond("/api/users", policy, Arc::clone(&compute))
                .await
                .unwrap();
            assert_eq!(fresh, stale);
        }

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2); // initial + exactly one refresh
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_stale_entry_and_releases_the_flight() {
        let cache = RouteCache::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let compute: ComputeFn = {
            let attempts = Arc::clone(&attempts);
            Arc::new(move || {
                let attempts = Arc::clone(&attempts);
                Box::pin(async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 2 {
                        // second attempt (the first background refresh) fails
                        Err(GatewayError::Internal("refresh blew up".into()))
                    } else {
                        Ok(Bytes::from(format!("payload-{n}")))
                    }
                })
            })
        };
        let policy = CachePolicy::StaleWhileRevalidate(Duration::from_secs(60));

        let original = cache.respond("/k", policy, Arc::clone(&compute)).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        let served = cache.respond("/k", policy, Arc::clone(&compute)).await.unwrap();
        assert_eq!(original, served);
        tokio::time::sleep(Duration::from_millis(1)).await; // let the failing refresh run

        // Entry survived the failed refresh and a new flight can start.
        let served = cache.respond("/k", policy, Arc::clone(&compute)).await.unwrap();
        assert_eq!(original, served);
        tokio::time::sleep(Duration::from_millis(1)).await;

        let refreshed = cache.respond("/k", policy, Arc::clone(&compute)).await.unwrap();
        assert_ne!(original, refreshed);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn entries_are_isolated_per_key() {
        let cache = RouteCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let compute = counting_compute(Arc::clone(&counter), Duration::ZERO);

        let a = cache
            .respond("/a", CachePolicy::Static, Arc::clone(&compute))
            .await
            .unwrap();
        let b = cache
            .respond("/b", CachePolicy::Static, Arc::clone(&compute))
            .await
            .unwrap();
        assert_ne!(a, b);

        cache.invalidate("/a");
        // /b untouched by /a's invalidation
        let b_again = cache
            .respond("/b", CachePolicy::Static, Arc::clone(&compute))
            .await
            .unwrap();
        assert_eq!(b, b_again);
    }
}
