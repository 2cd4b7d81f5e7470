//! TTL cache with per-key single-flight refresh.
//!
//! The service-account token and the realm-role catalog are both expensive to
//! fetch and change rarely. Each lives in one [`TtlCache`] slot; concurrent
//! callers hitting an expired slot collapse into a single in-flight fetch.

use crate::error::KeycloakError;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Cached<T> {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// A single cached value with a bounded time-to-live.
#[derive(Debug, Default)]
pub struct TtlCache<T> {
    slot: RwLock<Option<Cached<T>>>,
    /// Serializes refreshes so an expired entry is fetched once per process.
    refresh: Mutex<()>,
}

impl<T: Clone> TtlCache<T> {
    /// Create an empty cache slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Return the cached value if fresh, otherwise run `fetch` (single-flight)
    /// and cache its result for the returned TTL.
    ///
    /// # Errors
    ///
    /// Propagates the error from `fetch`; the slot is left unchanged on failure.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<T, KeycloakError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, Duration), KeycloakError>>,
    {
        {
            let slot = self.slot.read().await;
            if let Some(cached) = slot.as_ref() {
                if cached.is_fresh() {
                    return Ok(cached.value.clone());
                }
            }
        }

        let _flight = self.refresh.lock().await;

        // Another caller may have refreshed while we waited for the guard.
        {
            let slot = self.slot.read().await;
            if let Some(cached) = slot.as_ref() {
                if cached.is_fresh() {
                    return Ok(cached.value.clone());
                }
            }
        }

        let (value, ttl) = fetch().await?;

        let mut slot = self.slot.write().await;
        *slot = Some(Cached {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
        });

        Ok(value)
    }

    /// Drop the cached value (e.g. after a 401 response).
    pub async fn invalidate(&self) {
        let mut slot = self.slot.write().await;
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fetches_once_within_ttl() {
        let cache = TtlCache::new();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = cache
                .get_or_fetch(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok((42u32, Duration::from_secs(60)))
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refetches_after_invalidate() {
        let cache = TtlCache::new();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            cache
                .get_or_fetch(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(("token".to_string(), Duration::from_secs(60)))
                })
                .await
                .unwrap();
            cache.invalidate().await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_collapses_to_one_fetch() {
        let cache = Arc::new(TtlCache::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Hold the flight long enough for the others to queue
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok((7u32, Duration::from_secs(60)))
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_slot_empty() {
        let cache: TtlCache<u32> = TtlCache::new();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let result = cache
                .get_or_fetch(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(KeycloakError::AuthFailed("nope".to_string()))
                })
                .await;
            assert!(result.is_err());
        }

        // No poisoned value was cached; each call re-attempted the fetch
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
