//! TTL cache with single-flight loading.
//!
//! Concurrent callers for one key share a single upstream call. The load
//! runs on its own task, so a caller that gives up does not cancel it and a
//! late result is still stored under its key.

use analysis_core::{FetchError, Provider};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// TTL for entries that never expire (the ticker reference dataset).
pub const UNBOUNDED_TTL: Duration = Duration::MAX;

/// Identifies one upstream resource: which source, which entity, which
/// resource of that entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: Provider,
    pub identifier: String,
    pub resource: String,
}

impl CacheKey {
    pub fn new(source: Provider, identifier: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            source,
            identifier: identifier.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.identifier, self.resource)
    }
}

type SharedLoad<V> = Shared<BoxFuture<'static, Result<Arc<V>, FetchError>>>;

struct CacheEntry<V> {
    value: Arc<V>,
    fetched_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

enum Slot<V> {
    Ready(CacheEntry<V>),
    Loading(SharedLoad<V>),
}

/// Must not be called while holding a guard into `slots`.
fn purge_expired<K: Eq + Hash, V>(slots: &DashMap<K, Slot<V>>) {
    slots.retain(|_, slot| match slot {
        Slot::Ready(entry) => entry.is_fresh(),
        Slot::Loading(_) => true,
    });
}

pub struct FetchCache<K, V> {
    slots: Arc<DashMap<K, Slot<V>>>,
    load_timeout: Duration,
}

impl<K, V> Clone for FetchCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            load_timeout: self.load_timeout,
        }
    }
}

impl<K, V> FetchCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// `load_timeout` bounds every loader; expiry surfaces as
    /// [`FetchError::Timeout`].
    pub fn new(load_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            load_timeout,
        }
    }

    /// Returns the stored value if it is younger than `ttl`, otherwise joins
    /// the in-flight load for `key` or starts one with `loader`. Only
    /// successful loads are stored.
    pub async fn fetch<F, Fut>(&self, key: K, ttl: Duration, loader: F) -> Result<Arc<V>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let load = match self.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let in_flight = match occupied.get() {
                    Slot::Ready(entry) if entry.is_fresh() => {
                        tracing::debug!("Cache hit for {}", key);
                        return Ok(Arc::clone(&entry.value));
                    }
                    Slot::Ready(_) => None,
                    Slot::Loading(load) => Some(load.clone()),
                };
                match in_flight {
                    Some(load) => {
                        tracing::debug!("Joining in-flight load for {}", key);
                        load
                    }
                    None => {
                        tracing::debug!("Cache entry for {} expired, reloading", key);
                        let load = self.start_load(key, ttl, loader());
                        occupied.insert(Slot::Loading(load.clone()));
                        load
                    }
                }
            }
            Entry::Vacant(vacant) => {
                tracing::debug!("Cache miss for {}", key);
                let load = self.start_load(key, ttl, loader());
                vacant.insert(Slot::Loading(load.clone()));
                load
            }
        };

        load.await
    }

    /// Number of stored or loading keys.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drops stored values older than their TTL. In-flight loads are kept.
    pub fn purge_expired(&self) {
        purge_expired(&self.slots);
    }

    fn start_load<Fut>(&self, key: K, ttl: Duration, load: Fut) -> SharedLoad<V>
    where
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let slots = Arc::clone(&self.slots);
        let timeout = self.load_timeout;
        let task_key = key.clone();

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, load).await {
                Ok(Ok(value)) => Ok(Arc::new(value)),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(FetchError::Timeout(timeout)),
            };

            match &outcome {
                Ok(value) => {
                    slots.insert(
                        task_key,
                        Slot::Ready(CacheEntry {
                            value: Arc::clone(value),
                            fetched_at: Instant::now(),
                            ttl,
                        }),
                    );
                    purge_expired(&slots);
                }
                Err(e) => {
                    tracing::warn!("Load for {} failed: {}", task_key, e);
                    slots.remove_if(&task_key, |_, slot| matches!(slot, Slot::Loading(_)));
                }
            }

            // Every waiter may have gone away; the stored entry still stands.
            let _ = tx.send(outcome);
        });

        let slots = Arc::clone(&self.slots);
        rx.map(move |received| {
            received.unwrap_or_else(|_| {
                // Loader task panicked or was cancelled by runtime shutdown.
                slots.remove_if(&key, |_, slot| matches!(slot, Slot::Loading(_)));
                Err(FetchError::Abandoned(format!("load for {} ended without a result", key)))
            })
        })
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(id: &str) -> CacheKey {
        CacheKey::new(Provider::Sec, id, "companyfacts")
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_hit_within_ttl_skips_loader() {
        let cache: FetchCache<CacheKey, u32> = FetchCache::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value = cache
                .fetch(key("0000320193"), TTL, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await
                .unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_reloaded() {
        let cache: FetchCache<CacheKey, usize> = FetchCache::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let load = |calls: Arc<AtomicUsize>| {
            move || async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
        };

        assert_eq!(*cache.fetch(key("a"), TTL, load(calls.clone())).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(*cache.fetch(key("a"), TTL, load(calls.clone())).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(*cache.fetch(key("a"), TTL, load(calls.clone())).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_ttl_never_expires() {
        let cache: FetchCache<CacheKey, u8> = FetchCache::new(Duration::from_secs(5));
        cache.fetch(key("map"), UNBOUNDED_TTL, || async { Ok(1) }).await.unwrap();
        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        let value = cache
            .fetch(key("map"), UNBOUNDED_TTL, || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(*value, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_load() {
        let cache: FetchCache<CacheKey, String> = FetchCache::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .fetch(key("0000789019"), TTL, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok("bundle".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().as_str(), "bundle");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_shared_but_not_stored() {
        let cache: FetchCache<CacheKey, u32> = FetchCache::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::status(503, "https://data.sec.gov/x"))
            }
        };
        let err = cache.fetch(key("b"), TTL, failing).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert!(cache.is_empty());

        let retry = {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            }
        };
        assert_eq!(*cache.fetch(key("b"), TTL, retry).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_loader_times_out() {
        let cache: FetchCache<CacheKey, u32> = FetchCache::new(Duration::from_secs(1));
        let err = cache
            .fetch(key("slow"), TTL, || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1)
            })
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout(Duration::from_secs(1)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_request_still_populates_cache() {
        let cache: FetchCache<CacheKey, u32> = FetchCache::new(Duration::from_secs(5));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let caller = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .fetch(key("late"), TTL, move || async move {
                        let _ = release_rx.await;
                        Ok(99)
                    })
                    .await
            })
        };
        // Let the caller register its load, then walk away from it.
        while cache.is_empty() {
            tokio::task::yield_now().await;
        }
        caller.abort();
        release_tx.send(()).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            }
        };
        assert_eq!(*cache.fetch(key("late"), TTL, counted).await.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_evicted_on_next_load() {
        let cache: FetchCache<CacheKey, usize> = FetchCache::new(Duration::from_secs(5));
        for i in 0..100 {
            let id = format!("{:010}", i);
            cache
                .fetch(key(&id), Duration::from_secs(1), move || async move { Ok(i) })
                .await
                .unwrap();
        }
        cache
            .fetch(key("map"), UNBOUNDED_TTL, || async { Ok(0) })
            .await
            .unwrap();
        assert_eq!(cache.len(), 101);

        tokio::time::advance(Duration::from_secs(3600)).await;
        cache
            .fetch(key("fresh"), TTL, || async { Ok(1) })
            .await
            .unwrap();
        // Only the unbounded entry and the new one remain.
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_keeps_fresh_entries() {
        let cache: FetchCache<CacheKey, u8> = FetchCache::new(Duration::from_secs(5));
        cache.fetch(key("short"), Duration::from_secs(10), || async { Ok(1) }).await.unwrap();
        cache.fetch(key("long"), TTL, || async { Ok(2) }).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        let value = cache.fetch(key("long"), TTL, || async { Ok(9) }).await.unwrap();
        assert_eq!(*value, 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_load_independently() {
        let cache: FetchCache<CacheKey, &'static str> = FetchCache::new(Duration::from_secs(5));
        let facts = cache.fetch(key("x"), TTL, || async { Ok("facts") }).await.unwrap();
        let prices = cache
            .fetch(CacheKey::new(Provider::Polygon, "x", "prices"), TTL, || async { Ok("prices") })
            .await
            .unwrap();
        assert_eq!((*facts, *prices), ("facts", "prices"));
        assert_eq!(cache.len(), 2);
    }
}
