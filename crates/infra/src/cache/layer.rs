use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{Cache, CacheError};

/// Typed, fail-open wrapper over a [`Cache`] backend.
///
/// Values are stored as JSON. Every backend call runs under `timeout`; any
/// error (including a timeout or an undecodable value) is logged at `warn` and
/// treated as a miss or a no-op. Nothing here returns an error.
///
/// With a settle delay, every eviction runs a second time after the delay.
/// A reader that loaded the store before a write and stores its result after
/// the write's eviction is then evicted too, so stale entries live at most
/// for the delay rather than for their TTL.
#[derive(Clone)]
pub struct CacheLayer {
    backend: Option<Arc<dyn Cache>>,
    timeout: Duration,
    settle_delay: Option<Duration>,
}

enum Eviction {
    Keys(Vec<String>),
    Prefix(String),
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("enabled", &self.backend.is_some())
            .field("timeout", &self.timeout)
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn Cache>, timeout: Duration) -> Self {
        Self {
            backend: Some(backend),
            timeout,
            settle_delay: None,
        }
    }

    /// Repeat every eviction once `delay` after the first pass. The delay
    /// should cover a store read plus a cache write.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }

    /// Every lookup misses, every write is dropped.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            timeout: Duration::ZERO,
            settle_delay: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    async fn call<T, F>(&self, op: &'static str, key: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.timeout)),
        };
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(op, key, error = %err, "cache call failed; continuing without cache");
                None
            }
        }
    }

    /// `None` on miss, on backend failure, and on a value that no longer decodes.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;
        let raw = self.call("get", key, backend.get(key)).await.flatten();
        let Some(raw) = raw else {
            debug!(key, "cache miss");
            return None;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(err) => {
                warn!(key, error = %err, "undecodable cache entry; evicting");
                let keys = [key.to_string()];
                self.call("delete", key, backend.delete(&keys)).await;
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %CacheError::Serialization(err.to_string()), "cache value not stored");
                return;
            }
        };
        self.call("set", key, backend.set(key, raw, ttl)).await;
    }

    pub async fn delete(&self, keys: &[String]) {
        if self.backend.is_none() || keys.is_empty() {
            return;
        }
        let eviction = Eviction::Keys(keys.to_vec());
        self.evict(&eviction).await;
        self.evict_again_later(eviction);
    }

    pub async fn invalidate_prefix(&self, prefix: &str) {
        if self.backend.is_none() {
            return;
        }
        let eviction = Eviction::Prefix(prefix.to_string());
        self.evict(&eviction).await;
        self.evict_again_later(eviction);
    }

    async fn evict(&self, eviction: &Eviction) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        match eviction {
            Eviction::Keys(keys) => {
                let label = keys.join(",");
                self.call("delete", &label, backend.delete(keys)).await;
            }
            Eviction::Prefix(prefix) => {
                if let Some(removed) = self.call("invalidate_prefix", prefix, backend.invalidate_prefix(prefix)).await {
                    debug!(prefix = %prefix, removed, "cache prefix invalidated");
                }
            }
        }
    }

    /// Outside a tokio runtime the second pass is skipped.
    fn evict_again_later(&self, eviction: Eviction) {
        let Some(delay) = self.settle_delay else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let layer = self.clone();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            layer.evict(&eviction).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use async_trait::async_trait;

    fn layer() -> (Arc<InMemoryCache>, CacheLayer) {
        let backend = Arc::new(InMemoryCache::new());
        let layer = CacheLayer::new(backend.clone(), Duration::from_millis(100));
        (backend, layer)
    }

    #[tokio::test]
    async fn typed_values_round_trip_through_json() {
        let (_, cache) = layer();
        cache.set("k", &vec![1u32, 2, 3], Duration::from_secs(60)).await;
        assert_eq!(cache.get::<Vec<u32>>("k").await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn backend_failure_reads_as_miss_and_writes_are_dropped() {
        let (backend, cache) = layer();
        cache.set("k", &1u32, Duration::from_secs(60)).await;
        backend.set_unavailable(true);
        assert_eq!(cache.get::<u32>("k").await, None);
        cache.set("k", &2u32, Duration::from_secs(60)).await;
        cache.invalidate_prefix("k").await;
        backend.set_unavailable(false);
        assert_eq!(cache.get::<u32>("k").await, Some(1));
    }

    #[tokio::test]
    async fn undecodable_entries_are_evicted() {
        let (backend, cache) = layer();
        backend.set("k", "not json".into(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get::<u32>("k").await, None);
        assert!(backend.is_empty());
    }

    struct Stalled;

    #[async_trait]
    impl Cache for Stalled {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            std::future::pending().await
        }
        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            std::future::pending().await
        }
        async fn delete(&self, _keys: &[String]) -> Result<(), CacheError> {
            std::future::pending().await
        }
        async fn invalidate_prefix(&self, _prefix: &str) -> Result<u64, CacheError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_backend_is_cut_off_by_the_timeout() {
        let cache = CacheLayer::new(Arc::new(Stalled), Duration::from_millis(20));
        assert_eq!(cache.get::<u32>("k").await, None);
        cache.set("k", &1u32, Duration::from_secs(60)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn late_repopulation_is_evicted_after_the_settle_delay() {
        let backend = Arc::new(InMemoryCache::new());
        let cache = CacheLayer::new(backend.clone(), Duration::from_millis(100)).with_settle_delay(Duration::from_secs(1));
        let ttl = Duration::from_secs(300);

        cache.delete(&["item:a".to_string()]).await;
        cache.invalidate_prefix("list:").await;
        // A reader that loaded the pre-write state stores it after the write evicted.
        cache.set("item:a", &1u32, ttl).await;
        cache.set("list:p1", &1u32, ttl).await;
        cache.set("other", &2u32, ttl).await;
        assert_eq!(cache.get::<u32>("item:a").await, Some(1));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.get::<u32>("item:a").await, None);
        assert_eq!(cache.get::<u32>("list:p1").await, None);
        assert_eq!(cache.get::<u32>("other").await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn without_settle_delay_evictions_run_once() {
        let (_, cache) = layer();
        cache.delete(&["k".to_string()]).await;
        cache.set("k", &1u32, Duration::from_secs(300)).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(cache.get::<u32>("k").await, Some(1));
    }

    #[tokio::test]
    async fn disabled_layer_always_misses() {
        let cache = CacheLayer::disabled();
        cache.set("k", &1u32, Duration::from_secs(60)).await;
        assert_eq!(cache.get::<u32>("k").await, None);
    }
}
