use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::time_util::mytime::TimeProvider;

/// Whether a value fetched at `fetched_at` is too old to be served at `now`.
/// A timestamp in the future (the clock went backwards) counts as expired.
pub fn is_expired(fetched_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    match now.signed_duration_since(fetched_at).to_std() {
        Ok(age) => age >= ttl,
        Err(_) => true,
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    fetched_at: DateTime<Utc>,
}

struct CacheState<T> {
    entry: Option<CacheEntry<T>>,
    // Bumped on every invalidation so that fetches started before it don't store stale results.
    generation: u64,
}

/// A single memoised value with a time to live, that can be reset at any point.
pub struct ResettableCache<T> {
    ttl: Duration,
    state: Mutex<CacheState<T>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl<T: Clone> ResettableCache<T> {
    pub fn new(ttl: Duration, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState {
                entry: None,
                generation: 0,
            }),
            time_provider,
        }
    }

    /// Serve the cached value if it is still fresh, otherwise run `fetch` and remember its result.
    /// Errors from `fetch` are returned as they are and leave the cache untouched.
    pub async fn get<F, Fut, E>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = {
            let state = self.lock();
            if let Some(entry) = &state.entry {
                if !is_expired(entry.fetched_at, self.time_provider.get_utc_time(), self.ttl) {
                    return Ok(entry.value.clone());
                }
            }
            state.generation
        };

        let value = fetch().await?;

        let mut state = self.lock();
        if state.generation == generation {
            state.entry = Some(CacheEntry {
                value: value.clone(),
                fetched_at: self.time_provider.get_utc_time(),
            });
        }
        Ok(value)
    }

    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.entry = None;
        state.generation = state.generation.wrapping_add(1);
    }

    /// Invalidates the cache once the returned guard goes out of scope, however that happens.
    pub fn invalidate_on_drop(&self) -> InvalidateOnDrop<'_, T> {
        InvalidateOnDrop { cache: self }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct InvalidateOnDrop<'a, T: Clone> {
    cache: &'a ResettableCache<T>,
}

impl<T: Clone> Drop for InvalidateOnDrop<'_, T> {
    fn drop(&mut self) {
        self.cache.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_util::mytime::DummyTimeProvider;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    fn cache_with_clock(ttl: Duration) -> (ResettableCache<bool>, Arc<DummyTimeProvider>) {
        let clock = Arc::new(DummyTimeProvider::new(start_time()));
        (ResettableCache::new(ttl, clock.clone()), clock)
    }

    async fn counted_fetch(calls: &AtomicUsize, value: bool) -> Result<bool, String> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    #[test]
    fn expiry_boundaries() {
        let ttl = Duration::from_secs(1);
        let t = start_time();
        assert!(!is_expired(t, t, ttl));
        assert!(!is_expired(t, t + chrono::Duration::milliseconds(999), ttl));
        assert!(is_expired(t, t + chrono::Duration::seconds(1), ttl));
        assert!(is_expired(t, t - chrono::Duration::seconds(1), ttl), "Future timestamps should never be served");
        assert!(is_expired(t, t, Duration::ZERO), "A zero ttl disables caching");
    }

    #[tokio::test]
    async fn fresh_value_is_served_without_fetching() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(5));
        let calls = AtomicUsize::new(0);

        assert_eq!(cache.get(|| counted_fetch(&calls, true)).await, Ok(true));
        clock.advance(chrono::Duration::seconds(4));
        assert_eq!(cache.get(|| counted_fetch(&calls, false)).await, Ok(true), "Should have served the cached value");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_value_is_fetched_again() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(5));
        let calls = AtomicUsize::new(0);

        cache.get(|| counted_fetch(&calls, true)).await.unwrap();
        clock.advance(chrono::Duration::seconds(5));
        assert_eq!(cache.get(|| counted_fetch(&calls, false)).await, Ok(false));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The timestamp was reset by the second fetch.
        clock.advance(chrono::Duration::seconds(2));
        assert_eq!(cache.get(|| counted_fetch(&calls, true)).await, Ok(false));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_a_fetch() {
        let (cache, _clock) = cache_with_clock(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        cache.get(|| counted_fetch(&calls, true)).await.unwrap();
        cache.invalidate();
        assert_eq!(cache.get(|| counted_fetch(&calls, false)).await, Ok(false));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached_and_stale_values_not_served() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(1));
        let calls = AtomicUsize::new(0);

        cache.get(|| counted_fetch(&calls, true)).await.unwrap();
        clock.advance(chrono::Duration::seconds(2));

        let result: Result<bool, String> = cache.get(|| async { Err("offline".to_owned()) }).await;
        assert_eq!(result, Err("offline".to_owned()));

        assert_eq!(cache.get(|| counted_fetch(&calls, false)).await, Ok(false));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_overtaken_by_invalidation_is_not_stored() {
        let (cache, _clock) = cache_with_clock(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let (cache_ref, calls_ref) = (&cache, &calls);
        let result = cache
            .get(move || async move {
                // A write lands while this read is in flight.
                cache_ref.invalidate();
                counted_fetch(calls_ref, true).await
            })
            .await;
        assert_eq!(result, Ok(true), "The caller still gets what it fetched");

        assert_eq!(cache.get(|| counted_fetch(&calls, false)).await, Ok(false));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn guard_invalidates_when_dropped() {
        let (cache, _clock) = cache_with_clock(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        cache.get(|| counted_fetch(&calls, true)).await.unwrap();
        {
            let _guard = cache.invalidate_on_drop();
            assert_eq!(cache.get(|| counted_fetch(&calls, false)).await, Ok(true), "Still cached while the guard lives");
        }
        assert_eq!(cache.get(|| counted_fetch(&calls, false)).await, Ok(false));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
