use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{Cache, CacheError};

#[derive(Debug)]
struct Entry {
    value: String,
    /// `None` when `now + ttl` is not representable; such entries never expire.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process TTL cache for tests/dev and single-node deployments.
///
/// Expired entries are dropped lazily on read and on prefix scans.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, to exercise fallthrough paths.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Live (unexpired) entry count.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|map| map.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("in-memory cache marked unavailable".to_string()));
        }
        Ok(())
    }
}

fn poisoned() -> CacheError {
    CacheError::Command("lock poisoned".to_string())
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        let now = Instant::now();
        {
            let map = self.entries.read().map_err(|_| poisoned())?;
            match map.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        let mut map = self.entries.write().map_err(|_| poisoned())?;
        if map.get(key).is_some_and(|e| !e.is_live(now)) {
            map.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        let mut map = self.entries.write().map_err(|_| poisoned())?;
        map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        self.check()?;
        let mut map = self.entries.write().map_err(|_| poisoned())?;
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        self.check()?;
        let now = Instant::now();
        let mut map = self.entries.write().map_err(|_| poisoned())?;
        let before = map.len();
        map.retain(|key, entry| !key.starts_with(prefix) && entry.is_live(now));
        Ok((before - map.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache.set("k", "v".into(), Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn prefix_invalidation_leaves_other_keys() {
        let cache = InMemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("inventory:t1:list:p1:s20", "a".into(), ttl).await.unwrap();
        cache.set("inventory:t1:list:p2:s20", "b".into(), ttl).await.unwrap();
        cache.set("inventory:t2:list:p1:s20", "c".into(), ttl).await.unwrap();

        let removed = cache.invalidate_prefix("inventory:t1:list:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(cache.get("inventory:t2:list:p1:s20").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unrepresentable_ttl_keeps_the_entry() {
        let cache = InMemoryCache::new();
        cache.set("k", "v".into(), Duration::MAX).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.invalidate_prefix("k").await.unwrap(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn unavailable_cache_errors() {
        let cache = InMemoryCache::new();
        cache.set_unavailable(true);
        assert!(matches!(cache.get("k").await, Err(CacheError::Connection(_))));
    }
}
