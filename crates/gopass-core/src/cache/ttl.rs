//! In-memory cache with a sliding TTL and an absolute ceiling.
//!
//! Every hit pushes the entry's expiry out by `ttl`, but no entry outlives
//! `max_ttl` from the moment it was set. Expired entries are purged lazily
//! on `set`, so no background task is needed.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expire: Instant,
    max_expire: Instant,
}

impl<V> Entry<V> {
    fn expired(&self, now: Instant) -> bool {
        now > self.max_expire || now > self.expire
    }
}

/// Thread-safe TTL cache guarded by a single mutex.
pub struct InMemTtl<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
    max_ttl: Duration,
}

impl<K, V> InMemTtl<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration, max_ttl: Duration) -> Self {
        InMemTtl {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace `key`, purging expired entries first.
    pub fn set(&self, key: K, value: V) {
        let now = Instant::now();
        let mut map = self.lock();
        map.retain(|_, e| !e.expired(now));
        map.insert(
            key,
            Entry {
                value,
                expire: now + self.ttl,
                max_expire: now + self.max_ttl,
            },
        );
    }

    /// Returns the value if present and not expired, extending its TTL.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut map = self.lock();
        let expired = match map.get_mut(key) {
            None => return None,
            Some(entry) if entry.expired(now) => true,
            Some(entry) => {
                entry.expire = now + self.ttl;
                return Some(entry.value.clone());
            }
        };
        if expired {
            map.remove(key);
        }
        None
    }

    pub fn remove(&self, key: &K) {
        self.lock().remove(key);
    }

    /// Drop every entry.
    pub fn purge(&self) {
        self.lock().clear();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| !e.expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn set_and_get() {
        let cache = InMemTtl::new(Duration::from_secs(30), Duration::from_secs(60));
        assert!(cache.get(&"foo").is_none());
        cache.set("foo", 42);
        assert_eq!(cache.get(&"foo"), Some(42));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn ttl_expiry() {
        let cache = InMemTtl::new(Duration::from_millis(50), Duration::from_secs(10));
        cache.set("k", "v".to_string());
        thread::sleep(Duration::from_millis(80));
        assert!(cache.get(&"k").is_none());
    }

    #[test]
    fn sliding_ttl() {
        let cache = InMemTtl::new(Duration::from_millis(100), Duration::from_secs(10));
        cache.set("k", 1);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get(&"k"), Some(1));
        thread::sleep(Duration::from_millis(60));
        // 120ms after set, but the first hit slid the expiry
        assert_eq!(cache.get(&"k"), Some(1));
    }

    #[test]
    fn max_ttl_caps_sliding() {
        let cache = InMemTtl::new(Duration::from_millis(100), Duration::from_millis(200));
        cache.set("k", 1);
        for _ in 0..3 {
            thread::sleep(Duration::from_millis(50));
            assert_eq!(cache.get(&"k"), Some(1));
        }
        thread::sleep(Duration::from_millis(100));
        assert!(cache.get(&"k").is_none(), "entry must not outlive max_ttl");
    }

    #[test]
    fn remove_and_purge() {
        let cache = InMemTtl::new(Duration::from_secs(30), Duration::from_secs(60));
        cache.set("a", 1);
        cache.set("b", 2);
        cache.remove(&"a");
        assert!(cache.get(&"a").is_none());
        assert_eq!(cache.get(&"b"), Some(2));
        cache.purge();
        assert!(cache.is_empty());
    }

    #[test]
    fn set_purges_expired() {
        let cache = InMemTtl::new(Duration::from_millis(20), Duration::from_secs(10));
        cache.set("old", 1);
        thread::sleep(Duration::from_millis(40));
        cache.set("new", 2);
        assert_eq!(cache.lock().len(), 1);
    }
}
