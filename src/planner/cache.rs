//! TTL cache for repeated plan lookups.
//!
//! Entries expire lazily: a get past the expiry instant is a miss. There is
//! no background sweeper; callers wanting reclamation use
//! [`TtlCache::purge_expired`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

/// String-keyed cache with a uniform time-to-live.
pub struct TtlCache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a key. An expired entry behaves exactly like a miss.
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.value.clone()),
            _ => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: T) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let now = Instant::now();
        let initial = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        initial - entries.len()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
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
    fn test_hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("key", 42);
        assert_eq!(cache.get("key"), Some(42));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = TtlCache::new(Duration::from_millis(30));
        cache.set("key", "value".to_string());
        assert!(cache.get("key").is_some());

        thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("key"), None);
        // Lazy expiry: the entry is still stored until purged.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let cache = TtlCache::new(Duration::from_millis(30));
        cache.set("stale", 1);
        thread::sleep(Duration::from_millis(60));
        cache.set("fresh", 2);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh"), Some(2));
    }

    #[test]
    fn test_set_refreshes_expiry() {
        let cache = TtlCache::new(Duration::from_millis(80));
        cache.set("key", 1);
        thread::sleep(Duration::from_millis(50));
        cache.set("key", 2);
        thread::sleep(Duration::from_millis(50));
        // Second set renewed the deadline, so the value is still live.
        assert_eq!(cache.get("key"), Some(2));
    }
}
